//! # cadenza-core
//!
//! Core types, configuration, and error handling for the Cadenza
//! background playback controller.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BackendConfig, Config, ControllerConfig};
pub use error::{Error, Result};
pub use types::*;
