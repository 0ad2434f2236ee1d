//! Biquad filters (RBJ Audio EQ Cookbook).

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::f32::consts::PI;

/// Normalised biquad coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Peaking (bell) filter around `freq`.
    pub fn peaking(sample_rate: f32, freq: f32, q: f32, gain_db: f32) -> Self {
        if gain_db.abs() < 0.01 {
            return Self::IDENTITY;
        }
        let a = 10f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * clamp_freq(freq, sample_rate) / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);

        Self::normalise(
            1.0 + alpha * a,
            -2.0 * cos,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos,
            1.0 - alpha / a,
        )
    }

    /// Low shelf with unity slope below `freq`.
    pub fn low_shelf(sample_rate: f32, freq: f32, gain_db: f32) -> Self {
        if gain_db.abs() < 0.01 {
            return Self::IDENTITY;
        }
        let a = 10f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * clamp_freq(freq, sample_rate) / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / 2.0 * 2f32.sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalise(
            a * ((a + 1.0) - (a - 1.0) * cos + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos),
            a * ((a + 1.0) - (a - 1.0) * cos - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos),
            (a + 1.0) + (a - 1.0) * cos - two_sqrt_a_alpha,
        )
    }

    fn normalise(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response at DC.
    pub fn dc_gain(&self) -> f32 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// Keep the centre frequency below Nyquist.
fn clamp_freq(freq: f32, sample_rate: f32) -> f32 {
    freq.clamp(10.0, sample_rate * 0.45)
}

/// Direct form I state for one channel.
#[derive(Debug, Default, Clone, Copy)]
struct State {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl State {
    #[inline]
    fn process(&mut self, input: f32, c: &Coefficients) -> f32 {
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2
            - c.a1 * self.y1
            - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// One biquad applied to both channels of interleaved stereo.
#[derive(Debug, Clone)]
pub struct StereoBiquad {
    coeffs: Coefficients,
    left: State,
    right: State,
}

impl Default for StereoBiquad {
    fn default() -> Self {
        Self::new(Coefficients::IDENTITY)
    }
}

impl StereoBiquad {
    pub fn new(coeffs: Coefficients) -> Self {
        Self {
            coeffs,
            left: State::default(),
            right: State::default(),
        }
    }

    /// Swap coefficients, keeping the filter history.
    pub fn set(&mut self, coeffs: Coefficients) {
        self.coeffs = coeffs;
    }

    pub fn is_identity(&self) -> bool {
        self.coeffs == Coefficients::IDENTITY
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        if self.is_identity() {
            return;
        }
        for frame in samples.chunks_exact_mut(2) {
            frame[0] = self.left.process(frame[0], &self.coeffs);
            frame[1] = self.right.process(frame[1], &self.coeffs);
        }
    }

    pub fn reset(&mut self) {
        self.left = State::default();
        self.right = State::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_gain_is_identity() {
        assert_eq!(
            Coefficients::peaking(48_000.0, 1000.0, 1.0, 0.0),
            Coefficients::IDENTITY
        );
        assert_eq!(
            Coefficients::low_shelf(48_000.0, 100.0, 0.0),
            Coefficients::IDENTITY
        );
    }

    #[test]
    fn test_low_shelf_dc_gain() {
        let c = Coefficients::low_shelf(48_000.0, 100.0, 12.0);
        let expected = 10f32.powf(12.0 / 20.0);
        assert!((c.dc_gain() - expected).abs() < 0.05, "{}", c.dc_gain());
    }

    #[test]
    fn test_peaking_leaves_dc_alone() {
        let c = Coefficients::peaking(48_000.0, 3600.0, 0.9, 9.0);
        assert!((c.dc_gain() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_frequency_above_nyquist_is_stable() {
        let mut filter = StereoBiquad::new(Coefficients::peaking(22_050.0, 14_000.0, 0.9, 15.0));
        let mut samples = vec![0.5f32; 4096];
        filter.process(&mut samples);
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() < 10.0));
    }

    #[test]
    fn test_dc_passes_through_shelf() {
        let mut filter = StereoBiquad::new(Coefficients::low_shelf(48_000.0, 100.0, 6.0));
        let mut samples = vec![0.1f32; 48_000];
        filter.process(&mut samples);
        let settled = samples[samples.len() - 1];
        assert!((settled - 0.1 * 10f32.powf(6.0 / 20.0)).abs() < 0.01);
    }
}
