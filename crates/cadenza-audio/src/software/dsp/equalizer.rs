//! Five-band graphic equalizer built from peaking biquads.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use super::{Coefficients, Processor, StereoBiquad};

/// Band centre frequencies in Hz.
pub const BAND_CENTRES: [f32; 5] = [60.0, 230.0, 910.0, 3600.0, 14_000.0];

/// Inclusive band level range in millibels.
pub const LEVEL_RANGE: (i16, i16) = (-1500, 1500);

const BAND_Q: f32 = 0.9;

/// Built-in presets as `(name, per-band millibels)`.
pub const EQ_PRESETS: [(&str, [i16; 5]); 10] = [
    ("Normal", [300, 0, 0, 0, 300]),
    ("Classical", [500, 300, -200, 400, 400]),
    ("Dance", [600, 0, 200, 400, 100]),
    ("Flat", [0, 0, 0, 0, 0]),
    ("Folk", [300, 0, 0, 200, -100]),
    ("Heavy Metal", [400, 100, 900, 300, 0]),
    ("Hip Hop", [500, 300, 0, 100, 300]),
    ("Jazz", [400, 200, -200, 200, 500]),
    ("Pop", [-100, 200, 500, 100, -200]),
    ("Rock", [500, 300, -100, 300, 500]),
];

pub struct GraphicEq {
    sample_rate: f32,
    enabled: bool,
    levels: [i16; 5],
    preset: Option<usize>,
    filters: [StereoBiquad; 5],
}

impl GraphicEq {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            enabled: false,
            levels: [0; 5],
            preset: None,
            filters: Default::default(),
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.filters.iter_mut().for_each(StereoBiquad::reset);
        }
        self.enabled = enabled;
    }

    /// Preset most recently loaded.
    pub const fn preset(&self) -> Option<usize> {
        self.preset
    }

    pub fn level(&self, band: usize) -> Option<i16> {
        self.levels.get(band).copied()
    }

    /// Set one band, clamped to [`LEVEL_RANGE`]. Returns false for an
    /// unknown band.
    pub fn set_level(&mut self, band: usize, millibels: i16) -> bool {
        let Some(slot) = self.levels.get_mut(band) else {
            return false;
        };
        *slot = millibels.clamp(LEVEL_RANGE.0, LEVEL_RANGE.1);
        self.retune(band);
        true
    }

    /// Load every band from [`EQ_PRESETS`]. Returns false for an unknown
    /// preset.
    pub fn load_preset(&mut self, preset: usize) -> bool {
        let Some((_, levels)) = EQ_PRESETS.get(preset) else {
            return false;
        };
        for (band, &level) in levels.iter().enumerate() {
            self.set_level(band, level);
        }
        self.preset = Some(preset);
        true
    }

    fn retune(&mut self, band: usize) {
        let gain_db = f32::from(self.levels[band]) / 100.0;
        self.filters[band].set(Coefficients::peaking(
            self.sample_rate,
            BAND_CENTRES[band],
            BAND_Q,
            gain_db,
        ));
    }
}

impl Processor for GraphicEq {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }
        for filter in &mut self.filters {
            filter.process(samples);
        }
    }

    fn reset(&mut self) {
        self.filters.iter_mut().for_each(StereoBiquad::reset);
    }
}
