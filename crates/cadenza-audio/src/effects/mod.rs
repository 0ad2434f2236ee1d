//! Audio effect processors bound to an engine session.
//!
//! Processors are created per [`AudioSessionId`] by an [`EffectsFactory`]
//! and never outlive the session they were created for. Each processor is
//! optional: a platform that cannot build one still gets the others.

mod chain;

pub use chain::EffectsChain;

use cadenza_core::{AudioSessionId, Result};
use tracing::warn;

/// Multi-band equalizer. Levels are in millibels.
pub trait Equalizer: Send {
    fn number_of_bands(&self) -> u16;

    /// Inclusive `(min, max)` level range in millibels.
    fn band_level_range(&self) -> (i16, i16);

    fn band_level(&self, band: u16) -> Result<i16>;

    fn set_band_level(&mut self, band: u16, level: i16) -> Result<()>;

    fn number_of_presets(&self) -> u16;

    fn preset_name(&self, preset: u16) -> Option<String>;

    /// Load every band from a built-in preset.
    fn use_preset(&mut self, preset: u16) -> Result<()>;

    /// Preset most recently loaded, `None` before the first one.
    fn current_preset(&self) -> Option<u16>;

    fn set_enabled(&mut self, enabled: bool) -> Result<()>;

    fn is_enabled(&self) -> bool;

    fn release(&mut self);
}

/// Low-frequency boost. Strength is per mille, 0 bypasses.
pub trait BassBoost: Send {
    fn set_strength(&mut self, strength: u16) -> Result<()>;

    fn strength(&self) -> u16;

    fn release(&mut self);
}

/// Stereo widening. Strength is per mille, 0 bypasses.
pub trait Virtualizer: Send {
    fn set_strength(&mut self, strength: u16) -> Result<()>;

    fn strength(&self) -> u16;

    fn release(&mut self);
}

/// Room simulation selected from built-in presets. Preset 0 is "none".
pub trait PresetReverb: Send {
    fn number_of_presets(&self) -> u16;

    fn set_preset(&mut self, preset: u16) -> Result<()>;

    fn preset(&self) -> u16;

    fn release(&mut self);
}

/// Creates effect processors attached to an engine session.
pub trait EffectsFactory: Send {
    fn equalizer(&mut self, session: AudioSessionId) -> Result<Box<dyn Equalizer>>;

    fn bass_boost(&mut self, session: AudioSessionId) -> Result<Box<dyn BassBoost>>;

    fn virtualizer(&mut self, session: AudioSessionId) -> Result<Box<dyn Virtualizer>>;

    fn reverb(&mut self, session: AudioSessionId) -> Result<Box<dyn PresetReverb>>;
}

/// The live processors for one engine session.
pub struct EffectProcessorSet {
    pub session: AudioSessionId,
    pub equalizer: Option<Box<dyn Equalizer>>,
    pub bass_boost: Option<Box<dyn BassBoost>>,
    pub virtualizer: Option<Box<dyn Virtualizer>>,
    pub reverb: Option<Box<dyn PresetReverb>>,
}

impl EffectProcessorSet {
    /// Create every processor for `session`. A processor that fails to
    /// build is logged and left out.
    pub fn create(factory: &mut dyn EffectsFactory, session: AudioSessionId) -> Self {
        Self {
            session,
            equalizer: attach("equalizer", session, factory.equalizer(session)),
            bass_boost: attach("bass boost", session, factory.bass_boost(session)),
            virtualizer: attach("virtualizer", session, factory.virtualizer(session)),
            reverb: attach("reverb", session, factory.reverb(session)),
        }
    }

    /// Release every processor. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(mut eq) = self.equalizer.take() {
            eq.release();
        }
        if let Some(mut bass) = self.bass_boost.take() {
            bass.release();
        }
        if let Some(mut virt) = self.virtualizer.take() {
            virt.release();
        }
        if let Some(mut reverb) = self.reverb.take() {
            reverb.release();
        }
    }
}

impl Drop for EffectProcessorSet {
    fn drop(&mut self) {
        self.release();
    }
}

fn attach<T: ?Sized>(
    kind: &str,
    session: AudioSessionId,
    created: Result<Box<T>>,
) -> Option<Box<T>> {
    match created {
        Ok(processor) => Some(processor),
        Err(e) => {
            warn!("Failed to create {kind} for session {session}: {e}");
            None
        }
    }
}
