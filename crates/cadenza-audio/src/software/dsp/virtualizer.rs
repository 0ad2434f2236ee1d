//! Stereo widening by mid/side scaling.

use super::{Processor, MAX_STRENGTH};

pub struct Widener {
    strength: u16,
    side_gain: f32,
    makeup: f32,
}

impl Default for Widener {
    fn default() -> Self {
        Self {
            strength: 0,
            side_gain: 1.0,
            makeup: 1.0,
        }
    }
}

impl Widener {
    pub const fn strength(&self) -> u16 {
        self.strength
    }

    /// Side gain runs from 1.0 at zero strength to 2.0 at full strength.
    pub fn set_strength(&mut self, strength: u16) {
        self.strength = strength.min(MAX_STRENGTH);
        self.side_gain = 1.0 + f32::from(self.strength) / f32::from(MAX_STRENGTH);
        // Keep the worst-case sum (mid + side) at unity.
        self.makeup = 2.0 / (1.0 + self.side_gain);
    }
}

impl Processor for Widener {
    fn process(&mut self, samples: &mut [f32]) {
        if self.strength == 0 {
            return;
        }
        for frame in samples.chunks_exact_mut(2) {
            let mid = (frame[0] + frame[1]) * 0.5;
            let side = (frame[0] - frame[1]) * 0.5 * self.side_gain;
            frame[0] = (mid + side) * self.makeup;
            frame[1] = (mid - side) * self.makeup;
        }
    }

    fn reset(&mut self) {}
}
