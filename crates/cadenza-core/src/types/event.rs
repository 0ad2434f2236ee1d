//! Payloads pushed to the external observers.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

/// State name carried by a [`PlaybackEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Loading,
    Playing,
    Paused,
    Stopped,
    Completed,
    Next,
    Previous,
}

impl EventState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Next => "next",
            Self::Previous => "previous",
        }
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State-change event delivered to the single event subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackEvent {
    pub state: EventState,
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl PlaybackEvent {
    pub const fn new(state: EventState, position_ms: u64, duration_ms: u64) -> Self {
        Self {
            state,
            position_ms,
            duration_ms,
        }
    }
}

/// Session-surface action relayed to the host because the controller does
/// not own its semantics (next/previous).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub action: String,
}

impl ActionEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }
}
