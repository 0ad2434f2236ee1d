//! Session surface publication: lock screen / notification state, the
//! periodic position ticker, and the remote for actions coming back.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cadenza_core::{
    Command, ControllerConfig, Error, PlaybackSession, PlaybackState, Result, SurfaceAction,
    SurfaceSnapshot,
};
use crossbeam_channel::{bounded, select, tick, Sender};
use tracing::{debug, trace, warn};

/// A system surface (lock screen, notification, console line) that
/// mirrors the playback session.
pub trait SessionSurface: Send {
    /// Rebuild the surface from scratch.
    fn publish(&mut self, snapshot: &SurfaceSnapshot);

    /// Refresh only the progress.
    fn update_position(&mut self, position_ms: u64, duration_ms: u64);

    /// Remove the surface.
    fn dismiss(&mut self);
}

/// Surface that renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl SessionSurface for NullSurface {
    fn publish(&mut self, _snapshot: &SurfaceSnapshot) {}

    fn update_position(&mut self, _position_ms: u64, _duration_ms: u64) {}

    fn dismiss(&mut self) {}
}

/// Handed to whoever renders the surface so user actions can reach the
/// controller.
#[derive(Debug, Clone)]
pub struct SurfaceRemote {
    actions: Sender<SurfaceAction>,
}

impl SurfaceRemote {
    pub(crate) const fn new(actions: Sender<SurfaceAction>) -> Self {
        Self { actions }
    }

    pub fn trigger(&self, action: SurfaceAction) -> Result<()> {
        self.actions
            .send(action)
            .map_err(|_| Error::ControllerUnavailable)
    }
}

/// One tick of the position ticker, stamped with the generation that
/// spawned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
}

struct PositionTicker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PositionTicker {
    fn spawn(interval: Duration, generation: u64, ticks: Sender<Tick>) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("position-ticker".to_string())
            .spawn(move || {
                let timer = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(timer) -> _ => {
                            if ticks.send(Tick { generation }).is_err() {
                                break;
                            }
                        }
                    }
                }
                trace!("Position ticker {generation} exited");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    fn cancel(&mut self) {
        // Dropping the sender disconnects the stop channel.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Position ticker panicked");
            }
        }
    }
}

impl Drop for PositionTicker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Keeps the session surface in step with the controller.
///
/// A full rebuild happens when the surface first appears, when playing and
/// paused swap, or when the track changes. Everything else is a position
/// update.
pub struct SessionPublisher {
    surface: Box<dyn SessionSurface>,
    fallback_title: String,
    interval: Duration,
    ticks: Sender<Tick>,
    generation: u64,
    ticker: Option<PositionTicker>,
    shown: Option<(PlaybackState, Option<PathBuf>)>,
}

impl SessionPublisher {
    pub fn new(
        surface: Box<dyn SessionSurface>,
        config: &ControllerConfig,
        ticks: Sender<Tick>,
    ) -> Self {
        Self {
            surface,
            fallback_title: config.surface_title.clone(),
            interval: Duration::from_millis(config.publish_interval_ms),
            ticks,
            generation: 0,
            ticker: None,
            shown: None,
        }
    }

    /// Mirror `session` onto the surface.
    pub fn sync(&mut self, session: &PlaybackSession) {
        match session.state {
            PlaybackState::Playing | PlaybackState::Paused => {
                let key = (session.state, session.track_path.clone());
                if self.shown.as_ref() == Some(&key) {
                    self.surface
                        .update_position(session.position_ms, session.duration_ms);
                    return;
                }
                let title = session
                    .title()
                    .unwrap_or_else(|| self.fallback_title.clone());
                let snapshot = SurfaceSnapshot::new(
                    title,
                    session.state,
                    session.position_ms,
                    session.duration_ms,
                );
                debug!("Publishing surface: {} ({})", snapshot.title, session.state);
                self.surface.publish(&snapshot);
                self.shown = Some(key);
            }
            PlaybackState::Idle
            | PlaybackState::Loading
            | PlaybackState::Stopped
            | PlaybackState::Completed => self.dismiss(),
        }
    }

    fn dismiss(&mut self) {
        if self.shown.take().is_some() {
            debug!("Dismissing surface");
            self.surface.dismiss();
        }
    }

    pub const fn is_shown(&self) -> bool {
        self.shown.is_some()
    }

    pub const fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    /// Start periodic position publication if it is not already running.
    pub fn start_ticking(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        self.generation += 1;
        match PositionTicker::spawn(self.interval, self.generation, self.ticks.clone()) {
            Ok(ticker) => self.ticker = Some(ticker),
            Err(e) => warn!("Failed to start position ticker: {e}"),
        }
    }

    /// Stop periodic publication. Ticks already queued become stale.
    pub fn stop_ticking(&mut self) {
        self.generation += 1;
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    /// Whether `tick` came from the running ticker.
    pub const fn is_current(&self, tick: Tick) -> bool {
        self.ticker.is_some() && tick.generation == self.generation
    }

    /// Push the latest position for a current tick. Returns false for a
    /// stale tick.
    pub fn on_tick(&mut self, tick: Tick, session: &PlaybackSession) -> bool {
        if !self.is_current(tick) {
            trace!("Dropping stale tick {}", tick.generation);
            return false;
        }
        if self.shown.is_some() {
            self.surface
                .update_position(session.position_ms, session.duration_ms);
        }
        true
    }

    /// Stop ticking and take the surface down.
    pub fn shutdown(&mut self) {
        self.stop_ticking();
        self.dismiss();
    }
}

/// Command a surface action stands for.
pub const fn command_for(action: SurfaceAction) -> Command {
    match action {
        SurfaceAction::Play => Command::Play,
        SurfaceAction::Pause => Command::Pause,
        SurfaceAction::Next => Command::Next,
        SurfaceAction::Previous => Command::Previous,
        SurfaceAction::Stop => Command::Stop,
        SurfaceAction::Seek { position_ms } => Command::Seek { position_ms },
    }
}
