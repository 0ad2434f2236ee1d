//! Playback engine capability and the adapter that owns the live session.
//!
//! The decode/render engine is opaque: anything implementing
//! [`EngineFactory`] can back the controller. The [`EngineAdapter`] keeps at
//! most one [`EngineSession`] alive and gives every other component safe
//! defaults when none is loaded.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::Path;

use cadenza_core::{AudioSessionId, Error, Result};
use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

/// Something the engine reports from its own thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    /// The track played to its end.
    Completed,
    /// Decoding or rendering failed mid-playback.
    Failed(String),
}

/// Notice tagged with the session that produced it, so notices from a
/// session that has since been replaced can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineNotice {
    pub session: AudioSessionId,
    pub kind: NoticeKind,
}

/// Channel on which engine sessions deliver their notices.
pub type NoticeSender = Sender<EngineNotice>;

/// Creates prepared engine sessions.
pub trait EngineFactory: Send {
    /// Create an engine session for `path` and prepare it.
    ///
    /// Blocks until the session is ready to start. Fails with
    /// [`Error::EngineInit`] when the engine cannot prepare the track.
    fn open(&mut self, path: &Path, notices: NoticeSender) -> Result<Box<dyn EngineSession>>;
}

/// One prepared decode/render engine instance bound to a single track.
pub trait EngineSession: Send {
    /// Audio identity that effect processors bind to.
    fn audio_session_id(&self) -> AudioSessionId;

    /// Start or resume rendering.
    fn start(&mut self) -> Result<()>;

    /// Suspend rendering, keeping the position.
    fn pause(&mut self) -> Result<()>;

    /// Reposition; the engine clamps to `[0, duration]`.
    fn seek(&mut self, position_ms: u64) -> Result<()>;

    /// Stop rendering. The session cannot be restarted afterwards.
    fn stop(&mut self) -> Result<()>;

    /// Change the playback rate.
    ///
    /// Fails with [`Error::UnsupportedCapability`] or [`Error::OutOfRange`]
    /// when the rate cannot be applied.
    fn set_speed(&mut self, rate: f32) -> Result<()>;

    fn position_ms(&self) -> u64;

    fn duration_ms(&self) -> u64;

    fn is_playing(&self) -> bool;

    /// Free the engine's resources. Must be idempotent.
    fn release(&mut self);
}

/// Owner of the single live engine session.
pub struct EngineAdapter {
    factory: Box<dyn EngineFactory>,
    session: Option<Box<dyn EngineSession>>,
    notices: NoticeSender,
}

impl EngineAdapter {
    pub fn new(factory: Box<dyn EngineFactory>, notices: NoticeSender) -> Self {
        Self {
            factory,
            session: None,
            notices,
        }
    }

    /// Replace any live session with a new one playing `path` from
    /// `start_position_ms`.
    ///
    /// The previous session is released before the new one is created, so
    /// on failure no session is loaded.
    pub fn load(&mut self, path: &Path, start_position_ms: u64) -> Result<AudioSessionId> {
        self.release();

        let mut session = self
            .factory
            .open(path, self.notices.clone())
            .map_err(|e| match e {
                e if e.rejects_start() => e,
                e => Error::EngineInit(e.to_string()),
            })?;

        if let Err(e) = Self::begin(session.as_mut(), start_position_ms) {
            warn!("Engine failed to start {}: {e}", path.display());
            session.release();
            return Err(Error::EngineInit(e.to_string()));
        }

        let id = session.audio_session_id();
        info!(
            "Engine session {id} playing {} from {start_position_ms} ms",
            path.display()
        );
        self.session = Some(session);
        Ok(id)
    }

    fn begin(session: &mut dyn EngineSession, start_position_ms: u64) -> Result<()> {
        if start_position_ms > 0 {
            session.seek(start_position_ms)?;
        }
        session.start()
    }

    /// Audio identity of the live session.
    pub fn session_id(&self) -> Option<AudioSessionId> {
        self.session.as_ref().map(|s| s.audio_session_id())
    }

    pub const fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    pub fn start(&mut self) -> Result<()> {
        self.session.as_mut().map_or(Ok(()), |s| s.start())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.session.as_mut().map_or(Ok(()), |s| s.pause())
    }

    pub fn seek(&mut self, position_ms: u64) -> Result<()> {
        self.session.as_mut().map_or(Ok(()), |s| s.seek(position_ms))
    }

    pub fn stop(&mut self) -> Result<()> {
        self.session.as_mut().map_or(Ok(()), |s| s.stop())
    }

    pub fn set_speed(&mut self, rate: f32) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => session.set_speed(rate),
            None => Err(Error::UnsupportedCapability(
                "no engine session to change speed on".to_string(),
            )),
        }
    }

    pub fn position_ms(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.position_ms())
    }

    pub fn duration_ms(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.duration_ms())
    }

    pub fn is_playing(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_playing())
    }

    /// Release the live session, if any. Safe to call repeatedly.
    pub fn release(&mut self) -> Option<AudioSessionId> {
        let mut session = self.session.take()?;
        let id = session.audio_session_id();
        session.release();
        debug!("Engine session {id} released");
        Some(id)
    }
}

impl Drop for EngineAdapter {
    fn drop(&mut self) {
        self.release();
    }
}
