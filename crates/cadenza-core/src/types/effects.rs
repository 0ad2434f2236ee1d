//! Process-wide effect configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Accepted range for bass-boost and virtualizer strengths (per mille).
pub const STRENGTH_RANGE: RangeInclusive<i32> = 0..=1000;

/// Effect parameters that outlive any individual track.
///
/// This is the single source of truth: live effect processors are rebuilt
/// from it whenever a new engine session is prepared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectSettings {
    pub eq_enabled: bool,
    pub eq_preset: u16,
    /// Per-band overrides applied on top of `eq_preset`, keyed by band.
    pub eq_band_levels: BTreeMap<u16, i16>,
    pub reverb_preset: u16,
    pub bass_boost_strength: u16,
    pub virtualizer_strength: u16,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            eq_enabled: true,
            eq_preset: 0,
            eq_band_levels: BTreeMap::new(),
            reverb_preset: 0,
            bass_boost_strength: 0,
            virtualizer_strength: 0,
        }
    }
}

impl EffectSettings {
    /// Validate a strength against [`STRENGTH_RANGE`].
    pub fn checked_strength(value: i32) -> Option<u16> {
        STRENGTH_RANGE
            .contains(&value)
            .then(|| u16::try_from(value).ok())
            .flatten()
    }

    /// Switch presets. A preset defines every band, so overrides are dropped.
    pub fn select_preset(&mut self, preset: u16) {
        self.eq_preset = preset;
        self.eq_band_levels.clear();
    }

    /// Remember a manual band level.
    pub fn override_band(&mut self, band: u16, level: i16) {
        self.eq_band_levels.insert(band, level);
    }

    /// Manual level for `band`, if one was set since the last preset change.
    pub fn band_override(&self, band: u16) -> Option<i16> {
        self.eq_band_levels.get(&band).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EffectSettings::default();
        assert!(settings.eq_enabled);
        assert_eq!(settings.eq_preset, 0);
        assert!(settings.eq_band_levels.is_empty());
        assert_eq!(settings.bass_boost_strength, 0);
        assert_eq!(settings.virtualizer_strength, 0);
        assert_eq!(settings.reverb_preset, 0);
    }

    #[test]
    fn test_checked_strength() {
        assert_eq!(EffectSettings::checked_strength(0), Some(0));
        assert_eq!(EffectSettings::checked_strength(1000), Some(1000));
        assert_eq!(EffectSettings::checked_strength(1001), None);
        assert_eq!(EffectSettings::checked_strength(-1), None);
    }

    #[test]
    fn test_preset_clears_overrides() {
        let mut settings = EffectSettings::default();
        settings.override_band(2, 300);
        assert_eq!(settings.band_override(2), Some(300));

        settings.select_preset(4);
        assert_eq!(settings.eq_preset, 4);
        assert_eq!(settings.band_override(2), None);
    }

    #[test]
    fn test_overrides_are_ordered_by_band() {
        let mut settings = EffectSettings::default();
        settings.override_band(3, -200);
        settings.override_band(0, 600);
        let bands: Vec<u16> = settings.eq_band_levels.keys().copied().collect();
        assert_eq!(bands, vec![0, 3]);
    }
}
