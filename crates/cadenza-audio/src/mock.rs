//! In-memory engine and effects used by the unit tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadenza_core::{AudioSessionId, Error, Result};
use parking_lot::Mutex;

use crate::effects::{BassBoost, EffectsFactory, Equalizer, PresetReverb, Virtualizer};
use crate::engine::{EngineFactory, EngineNotice, EngineSession, NoticeKind, NoticeSender};

pub const MOCK_BANDS: u16 = 5;
pub const MOCK_LEVEL_RANGE: (i16, i16) = (-1500, 1500);
pub const MOCK_REVERB_PRESETS: u16 = 7;
pub const MOCK_DURATION_MS: u64 = 180_000;
pub const MOCK_EQ_PRESETS: u16 = 3;
pub const MOCK_PRESETS: [[i16; 5]; 3] = [
    [0, 0, 0, 0, 0],
    [300, 0, 0, 0, 300],
    [500, 300, -200, 400, 400],
];

#[derive(Debug, Clone)]
pub struct MockEngineState {
    pub path: PathBuf,
    pub position_ms: u64,
    pub playing: bool,
    pub stopped: bool,
    pub released: bool,
    pub speed: f32,
}

#[derive(Debug, Clone)]
pub struct MockEqState {
    pub enabled: bool,
    pub preset: Option<u16>,
    pub levels: Vec<i16>,
    pub released: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCounts {
    pub engine_opens: usize,
    pub engine_releases: usize,
    pub effects_created: usize,
    pub effects_released: usize,
}

#[derive(Default)]
struct Registry {
    next_id: u32,
    fail_open: Option<String>,
    fail_equalizer: bool,
    speed_unsupported: bool,
    engines: BTreeMap<AudioSessionId, MockEngineState>,
    notices: BTreeMap<AudioSessionId, NoticeSender>,
    equalizers: BTreeMap<AudioSessionId, MockEqState>,
    bass_boost: BTreeMap<AudioSessionId, u16>,
    virtualizer: BTreeMap<AudioSessionId, u16>,
    reverb: BTreeMap<AudioSessionId, u16>,
    counts: MockCounts,
    releases: Vec<&'static str>,
}

impl Registry {
    fn register(&mut self, path: &Path) -> AudioSessionId {
        self.next_id += 1;
        let id = AudioSessionId(self.next_id);
        self.engines.insert(
            id,
            MockEngineState {
                path: path.to_path_buf(),
                position_ms: 0,
                playing: false,
                stopped: false,
                released: false,
                speed: 1.0,
            },
        );
        id
    }

    fn engine_mut(&mut self, id: AudioSessionId) -> &mut MockEngineState {
        self.engines.entry(id).or_insert_with(|| MockEngineState {
            path: PathBuf::new(),
            position_ms: 0,
            playing: false,
            stopped: false,
            released: false,
            speed: 1.0,
        })
    }

    fn effect_created(&mut self, id: AudioSessionId) -> Result<()> {
        match self.engines.get(&id) {
            Some(engine) if !engine.released => {
                self.counts.effects_created += 1;
                Ok(())
            }
            _ => Err(Error::EngineInit(format!("no live audio session {id}"))),
        }
    }

    fn effect_released(&mut self) {
        self.counts.effects_released += 1;
        self.releases.push("effect");
    }
}

/// Shared handle onto the mock registry; factories and test views are cheap
/// clones of it.
#[derive(Clone, Default)]
pub struct MockBackend {
    registry: Arc<Mutex<Registry>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine_factory(&self) -> MockEngineFactory {
        MockEngineFactory {
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn effects_factory(&self) -> MockEffectsFactory {
        MockEffectsFactory {
            registry: Arc::clone(&self.registry),
        }
    }

    /// Register a session directly, bypassing the engine factory.
    pub fn open_session(&self, path: &Path) -> AudioSessionId {
        self.registry.lock().register(path)
    }

    pub fn fail_next_open(&self, message: &str) {
        self.registry.lock().fail_open = Some(message.to_string());
    }

    pub fn fail_equalizer(&self) {
        self.registry.lock().fail_equalizer = true;
    }

    pub fn disable_speed(&self) {
        self.registry.lock().speed_unsupported = true;
    }

    pub fn latest_session(&self) -> Option<AudioSessionId> {
        self.registry.lock().engines.keys().next_back().copied()
    }

    pub fn engine(&self, id: AudioSessionId) -> Option<MockEngineState> {
        self.registry.lock().engines.get(&id).cloned()
    }

    pub fn set_position(&self, id: AudioSessionId, position_ms: u64) {
        self.registry.lock().engine_mut(id).position_ms = position_ms;
    }

    pub fn equalizer(&self, id: AudioSessionId) -> Option<MockEqState> {
        self.registry.lock().equalizers.get(&id).cloned()
    }

    pub fn bass_boost(&self, id: AudioSessionId) -> Option<u16> {
        self.registry.lock().bass_boost.get(&id).copied()
    }

    pub fn virtualizer(&self, id: AudioSessionId) -> Option<u16> {
        self.registry.lock().virtualizer.get(&id).copied()
    }

    pub fn reverb(&self, id: AudioSessionId) -> Option<u16> {
        self.registry.lock().reverb.get(&id).copied()
    }

    pub fn counts(&self) -> MockCounts {
        self.registry.lock().counts
    }

    /// Order in which engines and effect processors were released.
    pub fn releases(&self) -> Vec<&'static str> {
        self.registry.lock().releases.clone()
    }

    /// Deliver a notice as if the engine thread had sent it.
    pub fn notify(&self, id: AudioSessionId, kind: NoticeKind) {
        let sender = self.registry.lock().notices.get(&id).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(EngineNotice { session: id, kind });
        }
    }
}

pub struct MockEngineFactory {
    registry: Arc<Mutex<Registry>>,
}

impl EngineFactory for MockEngineFactory {
    fn open(&mut self, path: &Path, notices: NoticeSender) -> Result<Box<dyn EngineSession>> {
        let mut registry = self.registry.lock();
        if let Some(message) = registry.fail_open.take() {
            return Err(Error::EngineInit(message));
        }
        let id = registry.register(path);
        registry.notices.insert(id, notices);
        registry.counts.engine_opens += 1;
        Ok(Box::new(MockEngine {
            id,
            registry: Arc::clone(&self.registry),
        }))
    }
}

struct MockEngine {
    id: AudioSessionId,
    registry: Arc<Mutex<Registry>>,
}

impl MockEngine {
    fn with<R>(&self, f: impl FnOnce(&mut MockEngineState) -> R) -> R {
        f(self.registry.lock().engine_mut(self.id))
    }
}

impl EngineSession for MockEngine {
    fn audio_session_id(&self) -> AudioSessionId {
        self.id
    }

    fn start(&mut self) -> Result<()> {
        self.with(|e| {
            if e.stopped {
                return Err(Error::UnsupportedCapability("engine stopped".into()));
            }
            e.playing = true;
            Ok(())
        })
    }

    fn pause(&mut self) -> Result<()> {
        self.with(|e| e.playing = false);
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        self.with(|e| e.position_ms = position_ms.min(MOCK_DURATION_MS));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.with(|e| {
            e.playing = false;
            e.stopped = true;
        });
        Ok(())
    }

    fn set_speed(&mut self, rate: f32) -> Result<()> {
        if self.registry.lock().speed_unsupported {
            return Err(Error::UnsupportedCapability("rate change".into()));
        }
        self.with(|e| e.speed = rate);
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.with(|e| e.position_ms)
    }

    fn duration_ms(&self) -> u64 {
        MOCK_DURATION_MS
    }

    fn is_playing(&self) -> bool {
        self.with(|e| e.playing)
    }

    fn release(&mut self) {
        let mut registry = self.registry.lock();
        let engine = registry.engine_mut(self.id);
        if engine.released {
            return;
        }
        engine.released = true;
        engine.playing = false;
        registry.counts.engine_releases += 1;
        registry.releases.push("engine");
    }
}

pub struct MockEffectsFactory {
    registry: Arc<Mutex<Registry>>,
}

impl EffectsFactory for MockEffectsFactory {
    fn equalizer(&mut self, session: AudioSessionId) -> Result<Box<dyn Equalizer>> {
        let mut registry = self.registry.lock();
        if registry.fail_equalizer {
            return Err(Error::UnsupportedCapability("equalizer".into()));
        }
        registry.effect_created(session)?;
        registry.equalizers.insert(
            session,
            MockEqState {
                enabled: false,
                preset: None,
                levels: vec![0; usize::from(MOCK_BANDS)],
                released: false,
            },
        );
        Ok(Box::new(MockEqualizer {
            session,
            registry: Arc::clone(&self.registry),
        }))
    }

    fn bass_boost(&mut self, session: AudioSessionId) -> Result<Box<dyn BassBoost>> {
        let mut registry = self.registry.lock();
        registry.effect_created(session)?;
        registry.bass_boost.insert(session, 0);
        Ok(Box::new(MockStrength {
            session,
            registry: Arc::clone(&self.registry),
            pick: bass_boost_slot,
            released: false,
        }))
    }

    fn virtualizer(&mut self, session: AudioSessionId) -> Result<Box<dyn Virtualizer>> {
        let mut registry = self.registry.lock();
        registry.effect_created(session)?;
        registry.virtualizer.insert(session, 0);
        Ok(Box::new(MockStrength {
            session,
            registry: Arc::clone(&self.registry),
            pick: virtualizer_slot,
            released: false,
        }))
    }

    fn reverb(&mut self, session: AudioSessionId) -> Result<Box<dyn PresetReverb>> {
        let mut registry = self.registry.lock();
        registry.effect_created(session)?;
        registry.reverb.insert(session, 0);
        Ok(Box::new(MockReverb {
            session,
            registry: Arc::clone(&self.registry),
            released: false,
        }))
    }
}

struct MockEqualizer {
    session: AudioSessionId,
    registry: Arc<Mutex<Registry>>,
}

impl MockEqualizer {
    fn with<R>(&self, f: impl FnOnce(&mut MockEqState) -> R) -> Result<R> {
        let mut registry = self.registry.lock();
        let eq = registry
            .equalizers
            .get_mut(&self.session)
            .ok_or_else(|| Error::EngineInit("equalizer gone".into()))?;
        if eq.released {
            return Err(Error::UnsupportedCapability("equalizer released".into()));
        }
        Ok(f(eq))
    }
}

impl Equalizer for MockEqualizer {
    fn number_of_bands(&self) -> u16 {
        MOCK_BANDS
    }

    fn band_level_range(&self) -> (i16, i16) {
        MOCK_LEVEL_RANGE
    }

    fn band_level(&self, band: u16) -> Result<i16> {
        self.with(|eq| eq.levels.get(usize::from(band)).copied())?
            .ok_or_else(|| Error::OutOfRange(format!("band {band}")))
    }

    fn set_band_level(&mut self, band: u16, level: i16) -> Result<()> {
        self.with(|eq| {
            if let Some(slot) = eq.levels.get_mut(usize::from(band)) {
                *slot = level;
            }
        })
    }

    fn number_of_presets(&self) -> u16 {
        MOCK_EQ_PRESETS
    }

    fn preset_name(&self, preset: u16) -> Option<String> {
        (preset < self.number_of_presets()).then(|| format!("Preset {preset}"))
    }

    fn use_preset(&mut self, preset: u16) -> Result<()> {
        let levels = MOCK_PRESETS
            .get(usize::from(preset))
            .ok_or_else(|| Error::OutOfRange(format!("preset {preset}")))?;
        self.with(|eq| {
            eq.preset = Some(preset);
            eq.levels = levels.to_vec();
        })
    }

    fn current_preset(&self) -> Option<u16> {
        self.with(|eq| eq.preset).ok().flatten()
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.with(|eq| eq.enabled = enabled)
    }

    fn is_enabled(&self) -> bool {
        self.with(|eq| eq.enabled).unwrap_or(false)
    }

    fn release(&mut self) {
        let mut registry = self.registry.lock();
        let Some(eq) = registry.equalizers.get_mut(&self.session) else {
            return;
        };
        if eq.released {
            return;
        }
        eq.released = true;
        registry.effect_released();
    }
}

type StrengthSlot = fn(&mut Registry) -> &mut BTreeMap<AudioSessionId, u16>;

fn bass_boost_slot(registry: &mut Registry) -> &mut BTreeMap<AudioSessionId, u16> {
    &mut registry.bass_boost
}

fn virtualizer_slot(registry: &mut Registry) -> &mut BTreeMap<AudioSessionId, u16> {
    &mut registry.virtualizer
}

struct MockStrength {
    session: AudioSessionId,
    registry: Arc<Mutex<Registry>>,
    pick: StrengthSlot,
    released: bool,
}

impl MockStrength {
    fn store(&self, strength: u16) -> Result<()> {
        if self.released {
            return Err(Error::UnsupportedCapability("effect released".into()));
        }
        let mut registry = self.registry.lock();
        (self.pick)(&mut registry).insert(self.session, strength);
        Ok(())
    }

    fn load(&self) -> u16 {
        let mut registry = self.registry.lock();
        (self.pick)(&mut registry)
            .get(&self.session)
            .copied()
            .unwrap_or_default()
    }

    fn drop_effect(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.lock().effect_released();
        }
    }
}

impl BassBoost for MockStrength {
    fn set_strength(&mut self, strength: u16) -> Result<()> {
        self.store(strength)
    }

    fn strength(&self) -> u16 {
        self.load()
    }

    fn release(&mut self) {
        self.drop_effect();
    }
}

impl Virtualizer for MockStrength {
    fn set_strength(&mut self, strength: u16) -> Result<()> {
        self.store(strength)
    }

    fn strength(&self) -> u16 {
        self.load()
    }

    fn release(&mut self) {
        self.drop_effect();
    }
}

struct MockReverb {
    session: AudioSessionId,
    registry: Arc<Mutex<Registry>>,
    released: bool,
}

impl PresetReverb for MockReverb {
    fn number_of_presets(&self) -> u16 {
        MOCK_REVERB_PRESETS
    }

    fn set_preset(&mut self, preset: u16) -> Result<()> {
        if self.released {
            return Err(Error::UnsupportedCapability("reverb released".into()));
        }
        self.registry.lock().reverb.insert(self.session, preset);
        Ok(())
    }

    fn preset(&self) -> u16 {
        self.registry
            .lock()
            .reverb
            .get(&self.session)
            .copied()
            .unwrap_or_default()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.lock().effect_released();
        }
    }
}
