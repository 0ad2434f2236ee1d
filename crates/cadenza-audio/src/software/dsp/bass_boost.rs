//! Bass boost as a low shelf whose gain follows strength.

use super::{Coefficients, Processor, StereoBiquad, MAX_STRENGTH};

const SHELF_HZ: f32 = 100.0;
const MAX_GAIN_DB: f32 = 15.0;

pub struct BassShelf {
    sample_rate: f32,
    strength: u16,
    shelf: StereoBiquad,
}

impl BassShelf {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            strength: 0,
            shelf: StereoBiquad::default(),
        }
    }

    pub const fn strength(&self) -> u16 {
        self.strength
    }

    /// Strength is clamped to [`MAX_STRENGTH`]. Zero bypasses.
    pub fn set_strength(&mut self, strength: u16) {
        self.strength = strength.min(MAX_STRENGTH);
        let gain_db = MAX_GAIN_DB * f32::from(self.strength) / f32::from(MAX_STRENGTH);
        self.shelf
            .set(Coefficients::low_shelf(self.sample_rate, SHELF_HZ, gain_db));
    }

    /// Gain applied at DC, linear.
    pub fn dc_gain(&self) -> f32 {
        let gain_db = MAX_GAIN_DB * f32::from(self.strength) / f32::from(MAX_STRENGTH);
        10f32.powf(gain_db / 20.0)
    }
}

impl Processor for BassShelf {
    fn process(&mut self, samples: &mut [f32]) {
        self.shelf.process(samples);
    }

    fn reset(&mut self) {
        self.shelf.reset();
    }
}
