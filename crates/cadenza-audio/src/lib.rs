//! # cadenza-audio
//!
//! Background playback controller for Cadenza.
//!
//! Features:
//! - Single-owner controller thread serializing every command
//! - Effects chain that survives engine restarts
//! - Session surface publishing with a position ticker
//! - Software backend: symphonia decoding, rubato varispeed, cpal output

pub mod broadcaster;
pub mod controller;
pub mod effects;
pub mod engine;
pub mod publisher;
pub mod software;

#[cfg(test)]
mod mock;

pub use broadcaster::EventBroadcaster;
pub use controller::{ControllerHandle, PlaybackController};
pub use effects::{BassBoost, EffectsChain, EffectsFactory, Equalizer, PresetReverb, Virtualizer};
pub use engine::{EngineFactory, EngineNotice, EngineSession, NoticeKind};
pub use publisher::{NullSurface, SessionSurface, SurfaceRemote};
pub use software::SoftwareBackend;
