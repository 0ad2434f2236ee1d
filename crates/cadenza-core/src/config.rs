//! Runtime configuration.
//!
//! Settings are read from `config.json` in the platform config directory
//! (or an explicit path). Every field has a default, so a partial or absent
//! file is fine.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// File name looked up inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Playback controller settings.
    pub controller: ControllerConfig,
    /// Software backend settings.
    pub backend: BackendConfig,
    /// Optional `tracing` filter directive (e.g. `cadenza=debug`).
    pub log_filter: Option<String>,
}

/// Playback controller settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Interval of the surface re-publish loop while playing.
    pub publish_interval_ms: u64,
    /// Slowest accepted playback rate.
    pub min_speed: f32,
    /// Fastest accepted playback rate.
    pub max_speed: f32,
    /// Title shown on the session surface when the track has no file stem.
    pub surface_title: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: 1000,
            min_speed: 0.25,
            max_speed: 4.0,
            surface_title: "Audio Playing".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Returns true if `rate` falls within the configured speed range.
    pub fn accepts_speed(&self, rate: f32) -> bool {
        rate.is_finite() && rate >= self.min_speed && rate <= self.max_speed
    }
}

/// Software playback backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Capacity of the decode-to-output ring buffer.
    pub ring_buffer_ms: u32,
    /// Audio decoded before an engine session reports ready.
    pub prefill_ms: u32,
    /// Output device name; the host default is used when unset.
    pub output_device: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            ring_buffer_ms: 2000,
            prefill_ms: 250,
            output_device: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Default config file path (`<config dir>/cadenza/config.json`).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "cadenza", "Cadenza")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Reject settings the controller cannot work with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.controller;
        if c.publish_interval_ms == 0 {
            return Err(Error::Config("publish_interval_ms must be positive".into()));
        }
        if !(c.min_speed.is_finite() && c.max_speed.is_finite())
            || c.min_speed <= 0.0
            || c.min_speed > c.max_speed
        {
            return Err(Error::Config(format!(
                "invalid speed range {}..={}",
                c.min_speed, c.max_speed
            )));
        }
        if self.backend.ring_buffer_ms < self.backend.prefill_ms {
            return Err(Error::Config(
                "ring_buffer_ms must not be smaller than prefill_ms".into(),
            ));
        }
        Ok(())
    }
}
