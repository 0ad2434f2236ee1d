//! The live playback session.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{EventState, PlaybackEvent, PlaybackState};

/// Audio identity of one engine session.
///
/// Effect processors are bound to this id; it is handed out by the engine
/// when a session is prepared and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AudioSessionId(pub u32);

impl std::fmt::Display for AudioSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The single live playback session.
///
/// Replaced (never merged) by every successful `start`. Position and
/// duration are the last values read from the engine, so they stay
/// meaningful after the engine has been released.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    pub id: Uuid,
    pub track_path: Option<PathBuf>,
    pub state: PlaybackState,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub speed: f32,
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            track_path: None,
            state: PlaybackState::Idle,
            position_ms: 0,
            duration_ms: 0,
            speed: 1.0,
            started_at: None,
        }
    }
}

impl PlaybackSession {
    /// Fresh session for a track that is about to load.
    pub fn loading(path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            track_path: Some(path.into()),
            state: PlaybackState::Loading,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Display title derived from the file stem.
    pub fn title(&self) -> Option<String> {
        self.track_path
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
    }

    /// Event for `state` at the cached position.
    pub const fn event(&self, state: EventState) -> PlaybackEvent {
        PlaybackEvent::new(state, self.position_ms, self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_is_idle() {
        let session = PlaybackSession::default();
        assert_eq!(session.state, PlaybackState::Idle);
        assert!(session.track_path.is_none());
        assert!((session.speed - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_loading_session() {
        let session = PlaybackSession::loading("/music/Blue in Green.flac");
        assert_eq!(session.state, PlaybackState::Loading);
        assert_eq!(session.title().as_deref(), Some("Blue in Green"));
        assert!(session.started_at.is_some());
        assert_ne!(session.id, Uuid::nil());
    }

    #[test]
    fn test_sessions_are_distinct() {
        let a = PlaybackSession::loading("a.mp3");
        let b = PlaybackSession::loading("a.mp3");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_event_uses_cached_position() {
        let mut session = PlaybackSession::loading("a.mp3");
        session.position_ms = 5000;
        session.duration_ms = 180_000;
        let event = session.event(EventState::Stopped);
        assert_eq!(event, PlaybackEvent::new(EventState::Stopped, 5000, 180_000));
    }
}
