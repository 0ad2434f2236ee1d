//! Freeverb-style preset reverb: parallel lowpass-feedback combs into
//! series allpasses, per channel.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use super::Processor;

/// Comb delays in samples at 44.1 kHz.
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass delays in samples at 44.1 kHz.
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];

const STEREO_SPREAD: usize = 23;

/// Wet/dry crossfade step per frame (~10 ms at 48 kHz).
const FADE_COEFF: f32 = 0.9995;

/// Room settings for one preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbPreset {
    pub name: &'static str,
    pub room_size: f32,
    pub damping: f32,
    pub wet: f32,
    pub width: f32,
}

/// Built-in presets. Index 0 bypasses.
pub const REVERB_PRESETS: [ReverbPreset; 7] = [
    ReverbPreset { name: "None", room_size: 0.0, damping: 0.0, wet: 0.0, width: 0.0 },
    ReverbPreset { name: "Small Room", room_size: 0.3, damping: 0.7, wet: 0.08, width: 0.6 },
    ReverbPreset { name: "Medium Room", room_size: 0.45, damping: 0.6, wet: 0.12, width: 0.8 },
    ReverbPreset { name: "Large Room", room_size: 0.6, damping: 0.5, wet: 0.16, width: 1.0 },
    ReverbPreset { name: "Medium Hall", room_size: 0.72, damping: 0.45, wet: 0.18, width: 1.0 },
    ReverbPreset { name: "Large Hall", room_size: 0.85, damping: 0.3, wet: 0.24, width: 1.0 },
    ReverbPreset { name: "Plate", room_size: 0.65, damping: 0.1, wet: 0.2, width: 0.9 },
];

struct Comb {
    buffer: Vec<f32>,
    index: usize,
    store: f32,
}

impl Comb {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let output = self.buffer[self.index];
        self.store = output * (1.0 - damping) + self.store * damping;
        self.buffer[self.index] = input + self.store * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.store = 0.0;
        self.index = 0;
    }
}

struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

struct Channel {
    combs: [Comb; 8],
    allpasses: [Allpass; 4],
}

impl Channel {
    fn new(scale: f32, spread: usize) -> Self {
        Self {
            combs: std::array::from_fn(|i| {
                Comb::new((COMB_TUNINGS[i] as f32 * scale) as usize + spread)
            }),
            allpasses: std::array::from_fn(|i| {
                Allpass::new((ALLPASS_TUNINGS[i] as f32 * scale) as usize + spread)
            }),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let mut out = self
            .combs
            .iter_mut()
            .map(|comb| comb.process(input, feedback, damping))
            .sum::<f32>()
            * 0.125;
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(Comb::reset);
        self.allpasses.iter_mut().for_each(Allpass::reset);
    }
}

pub struct Reverb {
    left: Channel,
    right: Channel,
    preset: usize,
    settings: ReverbPreset,
    feedback: f32,
    wet1: f32,
    wet2: f32,
    dry: f32,
    /// Crossfade position between dry (0) and processed (1).
    fade: f32,
}

impl Reverb {
    pub fn new(sample_rate: u32) -> Self {
        let scale = sample_rate as f32 / 44_100.0;
        let spread = (STEREO_SPREAD as f32 * scale) as usize;
        let mut reverb = Self {
            left: Channel::new(scale, 0),
            right: Channel::new(scale, spread),
            preset: 0,
            settings: REVERB_PRESETS[0],
            feedback: 0.0,
            wet1: 0.0,
            wet2: 0.0,
            dry: 1.0,
            fade: 0.0,
        };
        reverb.set_preset(0);
        reverb
    }

    pub const fn preset(&self) -> usize {
        self.preset
    }

    /// Switch presets. Returns false for an unknown preset.
    pub fn set_preset(&mut self, preset: usize) -> bool {
        let Some(settings) = REVERB_PRESETS.get(preset) else {
            return false;
        };
        self.preset = preset;
        if preset != 0 {
            self.settings = *settings;
        }
        let s = self.settings;
        self.feedback = s.room_size * 0.24 + 0.6;
        self.wet1 = s.wet * (s.width * 0.5 + 0.5);
        self.wet2 = s.wet * ((1.0 - s.width) * 0.5);
        self.dry = (1.0 - s.wet * 0.5) * (1.0 - (self.wet1 + self.wet2)).max(0.0);
        true
    }

    const fn target(&self) -> f32 {
        if self.preset == 0 {
            0.0
        } else {
            1.0
        }
    }
}

impl Processor for Reverb {
    fn process(&mut self, samples: &mut [f32]) {
        let target = self.target();
        // Tails of the previous preset fade out rather than cut.
        if self.preset == 0 && self.fade < 1e-4 {
            return;
        }
        let damping = self.settings.damping;
        for frame in samples.chunks_exact_mut(2) {
            self.fade = FADE_COEFF * self.fade + (1.0 - FADE_COEFF) * target;

            let (l, r) = (frame[0], frame[1]);
            let input = (l + r) * 0.25;
            let out_l = self.left.process(input, self.feedback, damping);
            let out_r = self.right.process(input, self.feedback, damping);

            let wet_l = out_l * self.wet1 + out_r * self.wet2 + l * self.dry;
            let wet_r = out_r * self.wet1 + out_l * self.wet2 + r * self.dry;
            frame[0] = l * (1.0 - self.fade) + wet_l * self.fade;
            frame[1] = r * (1.0 - self.fade) + wet_r * self.fade;
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(frames: usize) -> Vec<f32> {
        let mut samples = vec![0.0f32; frames * 2];
        samples[0] = 1.0;
        samples[1] = 1.0;
        samples
    }

    #[test]
    fn test_preset_zero_bypasses() {
        let mut reverb = Reverb::new(44_100);
        let mut samples = impulse(4096);
        let original = samples.clone();
        reverb.process(&mut samples);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let mut reverb = Reverb::new(44_100);
        assert!(reverb.set_preset(3));
        assert!(!reverb.set_preset(REVERB_PRESETS.len()));
        assert_eq!(reverb.preset(), 3);
    }

    #[test]
    fn test_hall_produces_tail() {
        let mut reverb = Reverb::new(44_100);
        reverb.set_preset(5);
        // Let the crossfade settle on silence first.
        let mut warmup = vec![0.0f32; 44_100 * 2];
        reverb.process(&mut warmup);

        let mut samples = impulse(22_050);
        reverb.process(&mut samples);
        let tail = samples[4000..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(tail > 1e-4, "tail {tail}");
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() <= 1.5));
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_reset_clears_tail() {
        let mut reverb = Reverb::new(48_000);
        reverb.set_preset(6);
        let mut warmup = vec![0.0f32; 48_000 * 2];
        reverb.process(&mut warmup);
        let mut samples = impulse(2048);
        reverb.process(&mut samples);
        reverb.reset();

        let mut silence = vec![0.0f32; 4096];
        reverb.process(&mut silence);
        assert!(silence.iter().all(|s| *s == 0.0));
    }
}
