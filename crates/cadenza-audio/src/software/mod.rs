//! Software playback backend: symphonia decoding, in-process effects,
//! rubato rate conversion, and cpal output.

pub mod buffer;
pub mod decode;
pub mod dsp;
pub mod effects;
pub mod engine;
pub mod output;
pub mod resample;

use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use cadenza_core::BackendConfig;

pub use effects::{EffectRack, RackRegistry, SoftwareEffectsFactory};
pub use engine::{SoftwareEngine, SoftwareEngineFactory};
pub use output::{list_output_devices, OutputTarget};
pub use resample::SPEED_RANGE;

/// Source of engine and effects factories that share one session registry.
///
/// Effect processors can only bind to sessions opened by an engine factory
/// from the same backend.
pub struct SoftwareBackend {
    config: BackendConfig,
    target: OutputTarget,
    racks: RackRegistry,
    next_id: Arc<AtomicU32>,
}

impl SoftwareBackend {
    /// Render to the configured output device.
    pub fn new(config: BackendConfig) -> Self {
        let target = OutputTarget::Device(config.output_device.clone());
        Self::with_target(config, target)
    }

    /// Render nowhere, consuming audio in real time at `sample_rate`.
    pub fn headless(config: BackendConfig, sample_rate: u32) -> Self {
        Self::with_target(config, OutputTarget::Null { sample_rate })
    }

    fn with_target(config: BackendConfig, target: OutputTarget) -> Self {
        Self {
            config,
            target,
            racks: RackRegistry::default(),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    pub const fn target(&self) -> &OutputTarget {
        &self.target
    }

    pub fn engine_factory(&self) -> SoftwareEngineFactory {
        SoftwareEngineFactory::new(
            self.config.clone(),
            self.target.clone(),
            self.racks.clone(),
            Arc::clone(&self.next_id),
        )
    }

    pub fn effects_factory(&self) -> SoftwareEffectsFactory {
        SoftwareEffectsFactory::new(self.racks.clone())
    }

    /// Engine sessions currently open.
    pub fn live_sessions(&self) -> usize {
        self.racks.len()
    }
}
