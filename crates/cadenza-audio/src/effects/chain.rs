//! Effect settings and the processors currently realising them.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use cadenza_core::{AudioSessionId, EffectSettings};
use tracing::{debug, info, warn};

use super::{EffectProcessorSet, EffectsFactory, Equalizer};

/// Owns [`EffectSettings`] and the live [`EffectProcessorSet`].
///
/// Setters always update the settings when the value is acceptable, and
/// push it to the live processor when there is one. Bounds that only the
/// processor knows (band count, level range, preset count) are checked
/// against it; without a processor the value is stored and checked again
/// on the next rebuild.
pub struct EffectsChain {
    factory: Box<dyn EffectsFactory>,
    settings: EffectSettings,
    live: Option<EffectProcessorSet>,
}

impl EffectsChain {
    pub fn new(factory: Box<dyn EffectsFactory>) -> Self {
        Self {
            factory,
            settings: EffectSettings::default(),
            live: None,
        }
    }

    pub const fn settings(&self) -> &EffectSettings {
        &self.settings
    }

    /// Session the live processors are bound to.
    pub fn live_session(&self) -> Option<AudioSessionId> {
        self.live.as_ref().map(|set| set.session)
    }

    /// Build processors for `session` and apply the stored settings.
    ///
    /// Order: equalizer enabled, preset, band overrides, reverb, bass boost,
    /// virtualizer.
    pub fn rebuild(&mut self, session: AudioSessionId) {
        self.release();

        let mut set = EffectProcessorSet::create(self.factory.as_mut(), session);
        if let Some(eq) = set.equalizer.as_deref_mut() {
            if self.settings.eq_preset >= eq.number_of_presets() {
                let fallback = EffectSettings::default().eq_preset;
                debug!(
                    "Stored equalizer preset {} not offered, falling back to {fallback}",
                    self.settings.eq_preset
                );
                self.settings.eq_preset = fallback;
            }
            apply_equalizer(eq, &self.settings);
        }
        if let Some(reverb) = set.reverb.as_deref_mut() {
            let preset = self.settings.reverb_preset;
            if preset < reverb.number_of_presets() {
                if let Err(e) = reverb.set_preset(preset) {
                    warn!("Failed to apply reverb preset {preset}: {e}");
                }
            } else {
                debug!("Stored reverb preset {preset} not offered, skipping");
            }
        }
        if let Some(bass) = set.bass_boost.as_deref_mut() {
            if let Err(e) = bass.set_strength(self.settings.bass_boost_strength) {
                warn!("Failed to apply bass boost strength: {e}");
            }
        }
        if let Some(virt) = set.virtualizer.as_deref_mut() {
            if let Err(e) = virt.set_strength(self.settings.virtualizer_strength) {
                warn!("Failed to apply virtualizer strength: {e}");
            }
        }

        info!("Effects rebuilt for session {session}");
        self.live = Some(set);
    }

    /// Release the live processors. Returns whether anything was released.
    pub fn release(&mut self) -> bool {
        let Some(mut set) = self.live.take() else {
            return false;
        };
        set.release();
        debug!("Effects released for session {}", set.session);
        true
    }

    fn equalizer(&self) -> Option<&dyn Equalizer> {
        self.live.as_ref()?.equalizer.as_deref()
    }

    fn equalizer_mut(&mut self) -> Option<&mut (dyn Equalizer + 'static)> {
        self.live.as_mut()?.equalizer.as_deref_mut()
    }

    // Setters

    pub fn set_band_level(&mut self, band: i32, level: i16) {
        let Ok(band) = u16::try_from(band) else {
            debug!("Ignoring band level for band {band}");
            return;
        };

        if let Some(eq) = self.equalizer_mut() {
            let (min, max) = eq.band_level_range();
            if band >= eq.number_of_bands() || !(min..=max).contains(&level) {
                debug!("Ignoring band {band} level {level}: out of range");
                return;
            }
            if let Err(e) = eq.set_band_level(band, level) {
                warn!("Failed to set band {band} level: {e}");
            }
        }
        self.settings.override_band(band, level);
    }

    pub fn set_equalizer_enabled(&mut self, enabled: bool) {
        self.settings.eq_enabled = enabled;
        if let Some(eq) = self.equalizer_mut() {
            if let Err(e) = eq.set_enabled(enabled) {
                warn!("Failed to toggle equalizer: {e}");
            }
        }
    }

    pub fn set_equalizer_preset(&mut self, preset: i32) {
        let Ok(preset) = u16::try_from(preset) else {
            debug!("Ignoring equalizer preset {preset}");
            return;
        };

        if let Some(eq) = self.equalizer_mut() {
            if preset >= eq.number_of_presets() {
                debug!("Ignoring equalizer preset {preset}: out of range");
                return;
            }
            if let Err(e) = eq.use_preset(preset) {
                warn!("Failed to use equalizer preset {preset}: {e}");
            }
        }
        self.settings.select_preset(preset);
    }

    pub fn set_reverb_preset(&mut self, preset: i32) {
        let Ok(preset) = u16::try_from(preset) else {
            debug!("Ignoring reverb preset {preset}");
            return;
        };

        if let Some(reverb) = self.live.as_mut().and_then(|set| set.reverb.as_deref_mut()) {
            if preset >= reverb.number_of_presets() {
                debug!("Ignoring reverb preset {preset}: out of range");
                return;
            }
            if let Err(e) = reverb.set_preset(preset) {
                warn!("Failed to set reverb preset {preset}: {e}");
            }
        }
        self.settings.reverb_preset = preset;
    }

    pub fn set_bass_boost_strength(&mut self, strength: i32) {
        let Some(strength) = EffectSettings::checked_strength(strength) else {
            debug!("Ignoring bass boost strength {strength}");
            return;
        };

        self.settings.bass_boost_strength = strength;
        if let Some(bass) = self.live.as_mut().and_then(|set| set.bass_boost.as_deref_mut()) {
            if let Err(e) = bass.set_strength(strength) {
                warn!("Failed to set bass boost strength: {e}");
            }
        }
    }

    pub fn set_virtualizer_strength(&mut self, strength: i32) {
        let Some(strength) = EffectSettings::checked_strength(strength) else {
            debug!("Ignoring virtualizer strength {strength}");
            return;
        };

        self.settings.virtualizer_strength = strength;
        if let Some(virt) = self.live.as_mut().and_then(|set| set.virtualizer.as_deref_mut()) {
            if let Err(e) = virt.set_strength(strength) {
                warn!("Failed to set virtualizer strength: {e}");
            }
        }
    }

    // Queries

    /// Band count of the live equalizer, 0 without one.
    pub fn band_count(&self) -> u16 {
        self.equalizer().map_or(0, |eq| eq.number_of_bands())
    }

    /// Level range of the live equalizer, `(0, 0)` without one.
    pub fn band_level_range(&self) -> (i16, i16) {
        self.equalizer().map_or((0, 0), |eq| eq.band_level_range())
    }

    /// Live level of `band`; without a live equalizer the stored override,
    /// else 0.
    pub fn band_level(&self, band: i32) -> i16 {
        let Ok(band) = u16::try_from(band) else {
            return 0;
        };
        match self.equalizer() {
            Some(eq) if band < eq.number_of_bands() => eq.band_level(band).unwrap_or_default(),
            Some(_) => 0,
            None => self.settings.band_override(band).unwrap_or_default(),
        }
    }

    pub const fn equalizer_enabled(&self) -> bool {
        self.settings.eq_enabled
    }

    pub const fn equalizer_preset(&self) -> u16 {
        self.settings.eq_preset
    }

    pub const fn reverb_preset(&self) -> u16 {
        self.settings.reverb_preset
    }

    pub const fn bass_boost_strength(&self) -> u16 {
        self.settings.bass_boost_strength
    }

    pub const fn virtualizer_strength(&self) -> u16 {
        self.settings.virtualizer_strength
    }

    /// Band levels that `preset` would produce.
    ///
    /// Needs a live equalizer: its current preset and band levels are
    /// saved, the preset is applied and read back, then the saved state is
    /// put back. Empty when there is no equalizer or the preset does not
    /// exist.
    pub fn band_levels_for_preset(&mut self, preset: i32) -> Vec<i32> {
        let Ok(preset) = u16::try_from(preset) else {
            return Vec::new();
        };
        let Some(eq) = self.equalizer_mut() else {
            return Vec::new();
        };
        if preset >= eq.number_of_presets() {
            return Vec::new();
        }

        let saved = EqualizerState::capture(eq);
        let levels = match eq.use_preset(preset) {
            Ok(()) => (0..eq.number_of_bands())
                .map(|band| i32::from(eq.band_level(band).unwrap_or_default()))
                .collect(),
            Err(e) => {
                warn!("Failed to preview equalizer preset {preset}: {e}");
                Vec::new()
            }
        };
        saved.restore(eq);
        levels
    }
}

/// Preset and band levels read from a live equalizer.
struct EqualizerState {
    preset: Option<u16>,
    levels: Vec<i16>,
}

impl EqualizerState {
    fn capture(eq: &dyn Equalizer) -> Self {
        Self {
            preset: eq.current_preset(),
            levels: (0..eq.number_of_bands())
                .map(|band| eq.band_level(band).unwrap_or_default())
                .collect(),
        }
    }

    fn restore(self, eq: &mut dyn Equalizer) {
        if let Some(preset) = self.preset {
            if let Err(e) = eq.use_preset(preset) {
                warn!("Failed to restore equalizer preset {preset}: {e}");
            }
        }
        for (band, level) in (0..).zip(self.levels) {
            if let Err(e) = eq.set_band_level(band, level) {
                warn!("Failed to restore band {band} level: {e}");
            }
        }
    }
}

/// Push the equalizer part of `settings` onto a processor.
fn apply_equalizer(eq: &mut dyn Equalizer, settings: &EffectSettings) {
    if let Err(e) = eq.set_enabled(settings.eq_enabled) {
        warn!("Failed to toggle equalizer: {e}");
    }

    if settings.eq_preset < eq.number_of_presets() {
        if let Err(e) = eq.use_preset(settings.eq_preset) {
            warn!("Failed to use equalizer preset {}: {e}", settings.eq_preset);
        }
    } else {
        debug!(
            "Stored equalizer preset {} not offered, skipping",
            settings.eq_preset
        );
    }

    let bands = eq.number_of_bands();
    let (min, max) = eq.band_level_range();
    for (&band, &level) in &settings.eq_band_levels {
        if band >= bands || !(min..=max).contains(&level) {
            debug!("Stored band {band} level {level} out of range, skipping");
            continue;
        }
        if let Err(e) = eq.set_band_level(band, level) {
            warn!("Failed to restore band {band} level: {e}");
        }
    }
}
