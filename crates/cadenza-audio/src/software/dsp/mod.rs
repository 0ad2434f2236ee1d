//! Sample processors backing the software effects.
//!
//! Every processor works in place on interleaved stereo at the source
//! sample rate, before rate conversion.

mod bass_boost;
mod biquad;
mod equalizer;
mod reverb;
mod virtualizer;

pub use bass_boost::BassShelf;
pub use biquad::{Coefficients, StereoBiquad};
pub use equalizer::{GraphicEq, BAND_CENTRES, EQ_PRESETS, LEVEL_RANGE};
pub use reverb::{Reverb, ReverbPreset, REVERB_PRESETS};
pub use virtualizer::Widener;

/// Strength scale shared by bass boost and virtualizer.
pub const MAX_STRENGTH: u16 = 1000;

/// In-place stereo processor.
pub trait Processor: Send {
    fn process(&mut self, samples: &mut [f32]);

    /// Drop filter history, e.g. after a seek.
    fn reset(&mut self);
}
