//! Error types for Cadenza.

use thiserror::Error;

/// Result type alias using Cadenza's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Cadenza.
#[derive(Error, Debug)]
pub enum Error {
    // Playback errors
    #[error("Media resource unavailable: {0}")]
    Resource(String),

    #[error("Engine failed to initialize: {0}")]
    EngineInit(String),

    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    #[error("Parameter out of range: {0}")]
    OutOfRange(String),

    // Audio errors
    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    // Controller errors
    #[error("Playback controller is not running")]
    ControllerUnavailable,

    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error is dropped by the controller instead of
    /// being reported to the caller.
    pub const fn is_swallowed(&self) -> bool {
        matches!(self, Self::UnsupportedCapability(_) | Self::OutOfRange(_))
    }

    /// Returns true if this error rejects a `start` command.
    pub const fn rejects_start(&self) -> bool {
        matches!(self, Self::Resource(_) | Self::EngineInit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_swallowed() {
        assert!(Error::UnsupportedCapability("rate".into()).is_swallowed());
        assert!(Error::OutOfRange("band 9".into()).is_swallowed());
        assert!(!Error::Resource("missing".into()).is_swallowed());
        assert!(!Error::EngineInit("prepare".into()).is_swallowed());
    }

    #[test]
    fn test_error_rejects_start() {
        assert!(Error::Resource("missing".into()).rejects_start());
        assert!(Error::EngineInit("prepare".into()).rejects_start());
        assert!(!Error::ControllerUnavailable.rejects_start());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Resource("/nonexistent.mp3".into());
        assert_eq!(
            err.to_string(),
            "Media resource unavailable: /nonexistent.mp3"
        );
    }
}
