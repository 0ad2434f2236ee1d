//! Session surface vocabulary (lock screen / persistent notification).

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

use super::PlaybackState;

/// User action offered by, and received from, the session surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum SurfaceAction {
    Play,
    Pause,
    Next,
    Previous,
    Stop,
    #[serde(rename_all = "camelCase")]
    Seek { position_ms: u64 },
}

impl SurfaceAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Stop => "stop",
            Self::Seek { .. } => "seek",
        }
    }

    /// Whether the controller relays this action to the host instead of
    /// owning its meaning.
    pub const fn is_relayed(self) -> bool {
        matches!(self, Self::Next | Self::Previous)
    }
}

/// Everything the surface needs to render itself from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceSnapshot {
    pub title: String,
    pub subtitle: String,
    pub state: PlaybackState,
    pub position_ms: u64,
    pub duration_ms: u64,
    /// The play/pause slot: `Pause` while playing, `Play` otherwise.
    pub primary: SurfaceAction,
    pub actions: Vec<SurfaceAction>,
    /// Whether the surface should stay pinned (playing).
    pub ongoing: bool,
}

impl SurfaceSnapshot {
    pub fn new(
        title: impl Into<String>,
        state: PlaybackState,
        position_ms: u64,
        duration_ms: u64,
    ) -> Self {
        let playing = state == PlaybackState::Playing;
        let primary = if playing {
            SurfaceAction::Pause
        } else {
            SurfaceAction::Play
        };
        let subtitle = if playing {
            "Your audio is playing"
        } else {
            "Paused"
        };

        Self {
            title: title.into(),
            subtitle: subtitle.to_string(),
            state,
            position_ms,
            duration_ms,
            primary,
            actions: vec![
                SurfaceAction::Previous,
                primary,
                SurfaceAction::Next,
                SurfaceAction::Stop,
            ],
            ongoing: playing,
        }
    }
}
