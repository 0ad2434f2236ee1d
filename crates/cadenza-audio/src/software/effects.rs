//! Software effect processors.
//!
//! Each engine session owns an [`EffectRack`] that its worker runs over
//! decoded audio. The rack is published in a [`RackRegistry`] under the
//! session id so [`SoftwareEffectsFactory`] can hand out processors bound
//! to it. A processor attaches its stage on creation and detaches it on
//! release; detached stages are bypassed.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::HashMap;
use std::sync::Arc;

use cadenza_core::{AudioSessionId, Error, Result};
use parking_lot::Mutex;
use tracing::debug;

use super::dsp::{
    BassShelf, GraphicEq, Processor, Reverb, Widener, BAND_CENTRES, EQ_PRESETS, LEVEL_RANGE,
    MAX_STRENGTH, REVERB_PRESETS,
};
use crate::effects::{BassBoost, EffectsFactory, Equalizer, PresetReverb, Virtualizer};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Attached {
    equalizer: bool,
    bass_boost: bool,
    virtualizer: bool,
    reverb: bool,
}

/// The processing chain for one engine session.
pub struct EffectRack {
    equalizer: GraphicEq,
    bass_boost: BassShelf,
    virtualizer: Widener,
    reverb: Reverb,
    attached: Attached,
}

impl EffectRack {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            equalizer: GraphicEq::new(sample_rate),
            bass_boost: BassShelf::new(sample_rate),
            virtualizer: Widener::default(),
            reverb: Reverb::new(sample_rate),
            attached: Attached::default(),
        }
    }

    /// Run attached stages in order: equalizer, bass boost, virtualizer,
    /// reverb.
    pub fn process(&mut self, samples: &mut [f32]) {
        if self.attached.equalizer {
            self.equalizer.process(samples);
        }
        if self.attached.bass_boost {
            self.bass_boost.process(samples);
        }
        if self.attached.virtualizer {
            self.virtualizer.process(samples);
        }
        if self.attached.reverb {
            self.reverb.process(samples);
        }
    }

    pub fn reset(&mut self) {
        self.equalizer.reset();
        self.bass_boost.reset();
        self.virtualizer.reset();
        self.reverb.reset();
    }

    pub const fn has_attached(&self) -> bool {
        self.attached.equalizer
            || self.attached.bass_boost
            || self.attached.virtualizer
            || self.attached.reverb
    }
}

pub type SharedRack = Arc<Mutex<EffectRack>>;

/// Live racks by engine session.
#[derive(Clone, Default)]
pub struct RackRegistry {
    racks: Arc<Mutex<HashMap<AudioSessionId, SharedRack>>>,
}

impl RackRegistry {
    pub fn insert(&self, session: AudioSessionId, rack: SharedRack) {
        self.racks.lock().insert(session, rack);
    }

    pub fn remove(&self, session: AudioSessionId) -> Option<SharedRack> {
        self.racks.lock().remove(&session)
    }

    pub fn get(&self, session: AudioSessionId) -> Option<SharedRack> {
        self.racks.lock().get(&session).cloned()
    }

    pub fn len(&self) -> usize {
        self.racks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.racks.lock().is_empty()
    }
}

/// Hands out processors for racks in a [`RackRegistry`].
pub struct SoftwareEffectsFactory {
    racks: RackRegistry,
}

impl SoftwareEffectsFactory {
    pub const fn new(racks: RackRegistry) -> Self {
        Self { racks }
    }

    fn bind(&self, session: AudioSessionId, kind: &'static str) -> Result<RackHandle> {
        let rack = self
            .racks
            .get(session)
            .ok_or_else(|| Error::EngineInit(format!("no engine session {session} for {kind}")))?;
        debug!("Attached {kind} to session {session}");
        Ok(RackHandle {
            session,
            kind,
            rack,
            released: false,
        })
    }
}

impl EffectsFactory for SoftwareEffectsFactory {
    fn equalizer(&mut self, session: AudioSessionId) -> Result<Box<dyn Equalizer>> {
        let handle = self.bind(session, "equalizer")?;
        handle.rack.lock().attached.equalizer = true;
        Ok(Box::new(SoftwareEqualizer(handle)))
    }

    fn bass_boost(&mut self, session: AudioSessionId) -> Result<Box<dyn BassBoost>> {
        let handle = self.bind(session, "bass boost")?;
        handle.rack.lock().attached.bass_boost = true;
        Ok(Box::new(SoftwareBassBoost(handle)))
    }

    fn virtualizer(&mut self, session: AudioSessionId) -> Result<Box<dyn Virtualizer>> {
        let handle = self.bind(session, "virtualizer")?;
        handle.rack.lock().attached.virtualizer = true;
        Ok(Box::new(SoftwareVirtualizer(handle)))
    }

    fn reverb(&mut self, session: AudioSessionId) -> Result<Box<dyn PresetReverb>> {
        let handle = self.bind(session, "reverb")?;
        handle.rack.lock().attached.reverb = true;
        Ok(Box::new(SoftwareReverb(handle)))
    }
}

struct RackHandle {
    session: AudioSessionId,
    kind: &'static str,
    rack: SharedRack,
    released: bool,
}

impl RackHandle {
    fn with<R>(&self, f: impl FnOnce(&mut EffectRack) -> R) -> Result<R> {
        if self.released {
            return Err(Error::UnsupportedCapability(format!(
                "{} released for session {}",
                self.kind, self.session
            )));
        }
        Ok(f(&mut self.rack.lock()))
    }

    fn release(&mut self, detach: impl FnOnce(&mut Attached)) {
        if self.released {
            return;
        }
        self.released = true;
        detach(&mut self.rack.lock().attached);
        debug!("Released {} for session {}", self.kind, self.session);
    }
}

struct SoftwareEqualizer(RackHandle);

impl Equalizer for SoftwareEqualizer {
    fn number_of_bands(&self) -> u16 {
        BAND_CENTRES.len() as u16
    }

    fn band_level_range(&self) -> (i16, i16) {
        LEVEL_RANGE
    }

    fn band_level(&self, band: u16) -> Result<i16> {
        self.0
            .with(|rack| rack.equalizer.level(usize::from(band)))?
            .ok_or_else(|| Error::OutOfRange(format!("band {band}")))
    }

    fn set_band_level(&mut self, band: u16, level: i16) -> Result<()> {
        if !(LEVEL_RANGE.0..=LEVEL_RANGE.1).contains(&level) {
            return Err(Error::OutOfRange(format!("band level {level}")));
        }
        if self
            .0
            .with(|rack| rack.equalizer.set_level(usize::from(band), level))?
        {
            Ok(())
        } else {
            Err(Error::OutOfRange(format!("band {band}")))
        }
    }

    fn number_of_presets(&self) -> u16 {
        EQ_PRESETS.len() as u16
    }

    fn preset_name(&self, preset: u16) -> Option<String> {
        EQ_PRESETS
            .get(usize::from(preset))
            .map(|(name, _)| (*name).to_string())
    }

    fn use_preset(&mut self, preset: u16) -> Result<()> {
        if self
            .0
            .with(|rack| rack.equalizer.load_preset(usize::from(preset)))?
        {
            Ok(())
        } else {
            Err(Error::OutOfRange(format!("equalizer preset {preset}")))
        }
    }

    fn current_preset(&self) -> Option<u16> {
        self.0
            .with(|rack| rack.equalizer.preset())
            .ok()
            .flatten()
            .and_then(|preset| u16::try_from(preset).ok())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.0.with(|rack| rack.equalizer.set_enabled(enabled))
    }

    fn is_enabled(&self) -> bool {
        self.0
            .with(|rack| rack.equalizer.is_enabled())
            .unwrap_or(false)
    }

    fn release(&mut self) {
        self.0.release(|attached| attached.equalizer = false);
    }
}

impl Drop for SoftwareEqualizer {
    fn drop(&mut self) {
        Equalizer::release(self);
    }
}

fn checked_strength(strength: u16) -> Result<u16> {
    if strength > MAX_STRENGTH {
        return Err(Error::OutOfRange(format!("strength {strength}")));
    }
    Ok(strength)
}

struct SoftwareBassBoost(RackHandle);

impl BassBoost for SoftwareBassBoost {
    fn set_strength(&mut self, strength: u16) -> Result<()> {
        let strength = checked_strength(strength)?;
        self.0.with(|rack| rack.bass_boost.set_strength(strength))
    }

    fn strength(&self) -> u16 {
        self.0
            .with(|rack| rack.bass_boost.strength())
            .unwrap_or_default()
    }

    fn release(&mut self) {
        self.0.release(|attached| attached.bass_boost = false);
    }
}

impl Drop for SoftwareBassBoost {
    fn drop(&mut self) {
        BassBoost::release(self);
    }
}

struct SoftwareVirtualizer(RackHandle);

impl Virtualizer for SoftwareVirtualizer {
    fn set_strength(&mut self, strength: u16) -> Result<()> {
        let strength = checked_strength(strength)?;
        self.0.with(|rack| rack.virtualizer.set_strength(strength))
    }

    fn strength(&self) -> u16 {
        self.0
            .with(|rack| rack.virtualizer.strength())
            .unwrap_or_default()
    }

    fn release(&mut self) {
        self.0.release(|attached| attached.virtualizer = false);
    }
}

impl Drop for SoftwareVirtualizer {
    fn drop(&mut self) {
        Virtualizer::release(self);
    }
}

struct SoftwareReverb(RackHandle);

impl PresetReverb for SoftwareReverb {
    fn number_of_presets(&self) -> u16 {
        REVERB_PRESETS.len() as u16
    }

    fn set_preset(&mut self, preset: u16) -> Result<()> {
        if self
            .0
            .with(|rack| rack.reverb.set_preset(usize::from(preset)))?
        {
            Ok(())
        } else {
            Err(Error::OutOfRange(format!("reverb preset {preset}")))
        }
    }

    fn preset(&self) -> u16 {
        self.0
            .with(|rack| rack.reverb.preset() as u16)
            .unwrap_or_default()
    }

    fn release(&mut self) {
        self.0.release(|attached| attached.reverb = false);
    }
}

impl Drop for SoftwareReverb {
    fn drop(&mut self) {
        PresetReverb::release(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{EffectProcessorSet, EffectsChain};

    const SESSION: AudioSessionId = AudioSessionId(7);

    fn setup() -> (RackRegistry, SharedRack, SoftwareEffectsFactory) {
        let racks = RackRegistry::default();
        let rack = Arc::new(Mutex::new(EffectRack::new(44_100)));
        racks.insert(SESSION, Arc::clone(&rack));
        let factory = SoftwareEffectsFactory::new(racks.clone());
        (racks, rack, factory)
    }

    #[test]
    fn test_missing_session_fails() {
        let (_, _, mut factory) = setup();
        let err = factory.equalizer(AudioSessionId(99)).err().unwrap();
        assert!(matches!(err, Error::EngineInit(_)));
    }

    #[test]
    fn test_equalizer_bounds() {
        let (_, rack, mut factory) = setup();
        let mut eq = factory.equalizer(SESSION).unwrap();
        assert_eq!(eq.number_of_bands(), 5);
        assert_eq!(eq.band_level_range(), (-1500, 1500));

        eq.set_band_level(2, 600).unwrap();
        assert_eq!(eq.band_level(2).unwrap(), 600);
        assert!(matches!(eq.set_band_level(5, 0), Err(Error::OutOfRange(_))));
        assert!(matches!(eq.set_band_level(0, 2000), Err(Error::OutOfRange(_))));
        assert!(matches!(eq.band_level(9), Err(Error::OutOfRange(_))));

        assert_eq!(eq.current_preset(), None);
        eq.use_preset(9).unwrap();
        assert_eq!(eq.current_preset(), Some(9));
        assert_eq!(eq.band_level(0).unwrap(), 500);
        assert_eq!(eq.preset_name(9).as_deref(), Some("Rock"));
        assert!(eq.preset_name(10).is_none());
        assert!(rack.lock().attached.equalizer);
    }

    #[test]
    fn test_release_detaches_stage() {
        let (_, rack, mut factory) = setup();
        let mut bass = factory.bass_boost(SESSION).unwrap();
        bass.set_strength(800).unwrap();
        assert!(rack.lock().has_attached());

        bass.release();
        bass.release();
        assert!(!rack.lock().has_attached());
        assert!(matches!(
            bass.set_strength(100),
            Err(Error::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn test_drop_detaches_stage() {
        let (_, rack, mut factory) = setup();
        drop(factory.reverb(SESSION).unwrap());
        assert!(!rack.lock().has_attached());
    }

    #[test]
    fn test_strength_and_preset_limits() {
        let (_, _, mut factory) = setup();
        let mut virt = factory.virtualizer(SESSION).unwrap();
        assert!(matches!(virt.set_strength(1001), Err(Error::OutOfRange(_))));
        virt.set_strength(1000).unwrap();
        assert_eq!(virt.strength(), 1000);

        let mut reverb = factory.reverb(SESSION).unwrap();
        assert_eq!(reverb.number_of_presets(), 7);
        assert!(matches!(reverb.set_preset(7), Err(Error::OutOfRange(_))));
        reverb.set_preset(4).unwrap();
        assert_eq!(reverb.preset(), 4);
    }

    #[test]
    fn test_detached_rack_is_transparent() {
        let mut rack = EffectRack::new(48_000);
        rack.bass_boost.set_strength(1000);
        let mut samples: Vec<f32> = (0..512).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let original = samples.clone();
        rack.process(&mut samples);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_processor_set_binds_every_stage() {
        let (racks, rack, mut factory) = setup();
        let mut set = EffectProcessorSet::create(&mut factory, SESSION);
        assert!(set.equalizer.is_some() && set.reverb.is_some());
        assert_eq!(
            rack.lock().attached,
            Attached {
                equalizer: true,
                bass_boost: true,
                virtualizer: true,
                reverb: true,
            }
        );

        set.release();
        assert!(!rack.lock().has_attached());
        assert_eq!(racks.len(), 1);
        assert!(racks.remove(SESSION).is_some());
        assert!(racks.is_empty());
    }

    #[test]
    fn test_chain_applies_settings_to_rack() {
        let (_, rack, factory) = setup();
        let mut chain = EffectsChain::new(Box::new(factory));
        chain.set_bass_boost_strength(600);
        chain.set_equalizer_enabled(true);
        chain.rebuild(SESSION);

        assert_eq!(chain.bass_boost_strength(), 600);
        assert_eq!(chain.band_count(), 5);
        {
            let rack = rack.lock();
            assert_eq!(rack.bass_boost.strength(), 600);
            assert!(rack.equalizer.is_enabled());
        }

        assert!(chain.release());
        assert!(!rack.lock().has_attached());
    }
}
