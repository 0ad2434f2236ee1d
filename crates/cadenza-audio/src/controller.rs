//! The playback controller.
//!
//! A single owner thread holds the engine, the effects chain, the session
//! and the surface publisher. Commands, engine notices, ticker ticks and
//! surface actions all arrive on channels and are handled one at a time,
//! so no two mutations of the session ever interleave.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cadenza_core::{
    ActionEvent, Command, ControllerConfig, Error, EventState, PlaybackEvent, PlaybackSession,
    PlaybackState, Reply, Result, SurfaceAction, Transition, Transport,
};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::broadcaster::EventBroadcaster;
use crate::effects::{EffectsChain, EffectsFactory};
use crate::engine::{EngineAdapter, EngineFactory, EngineNotice, NoticeKind};
use crate::publisher::{command_for, SessionPublisher, SessionSurface, SurfaceRemote, Tick};

enum Request {
    Command {
        command: Command,
        reply: Option<Sender<Result<Reply>>>,
    },
    Shutdown,
}

struct Inbox {
    requests: Receiver<Request>,
    notices: Receiver<EngineNotice>,
    ticks: Receiver<Tick>,
    surface: Receiver<SurfaceAction>,
}

/// Owner of all playback state. Lives on its own thread; talk to it
/// through a [`ControllerHandle`].
pub struct PlaybackController {
    config: ControllerConfig,
    engine: EngineAdapter,
    effects: EffectsChain,
    publisher: SessionPublisher,
    session: PlaybackSession,
    events: Arc<EventBroadcaster<PlaybackEvent>>,
    actions: Arc<EventBroadcaster<ActionEvent>>,
    snapshot: Arc<RwLock<PlaybackSession>>,
    // Keeps the surface channel connected while the controller runs.
    _surface_tx: Sender<SurfaceAction>,
}

impl PlaybackController {
    /// Spawn the controller thread and return a handle to it.
    pub fn spawn(
        engine_factory: impl EngineFactory + 'static,
        effects_factory: impl EffectsFactory + 'static,
        surface: impl SessionSurface + 'static,
        config: ControllerConfig,
    ) -> Result<ControllerHandle> {
        let (request_tx, request_rx) = unbounded();
        let (notice_tx, notice_rx) = unbounded();
        let (tick_tx, tick_rx) = unbounded();
        let (surface_tx, surface_rx) = unbounded();

        let events = Arc::new(EventBroadcaster::new());
        let actions = Arc::new(EventBroadcaster::new());
        let snapshot = Arc::new(RwLock::new(PlaybackSession::default()));

        let controller = Self {
            engine: EngineAdapter::new(Box::new(engine_factory), notice_tx),
            effects: EffectsChain::new(Box::new(effects_factory)),
            publisher: SessionPublisher::new(Box::new(surface), &config, tick_tx),
            config,
            session: PlaybackSession::default(),
            events: Arc::clone(&events),
            actions: Arc::clone(&actions),
            snapshot: Arc::clone(&snapshot),
            _surface_tx: surface_tx.clone(),
        };
        let inbox = Inbox {
            requests: request_rx,
            notices: notice_rx,
            ticks: tick_rx,
            surface: surface_rx,
        };

        let worker = thread::Builder::new()
            .name("playback-controller".to_string())
            .spawn(move || controller.run(inbox))?;

        Ok(ControllerHandle {
            requests: request_tx,
            surface: surface_tx,
            events,
            actions,
            snapshot,
            worker: Arc::new(Mutex::new(Some(worker))),
        })
    }

    fn run(mut self, inbox: Inbox) {
        info!("Playback controller started");
        loop {
            select! {
                recv(inbox.requests) -> request => match request {
                    Ok(Request::Command { command, reply }) => {
                        let result = self.handle(command);
                        // Callers read the snapshot right after the reply.
                        self.commit();
                        if let Some(reply) = reply {
                            let _ = reply.send(result);
                        }
                    }
                    Ok(Request::Shutdown) | Err(_) => break,
                },
                recv(inbox.notices) -> notice => {
                    if let Ok(notice) = notice {
                        self.on_notice(notice);
                    }
                }
                recv(inbox.ticks) -> tick => {
                    if let Ok(tick) = tick {
                        self.on_tick(tick);
                    }
                }
                recv(inbox.surface) -> action => {
                    if let Ok(action) = action {
                        self.on_surface_action(action);
                    }
                }
            }
            self.commit();
        }
        // Presses already queued still count.
        while let Ok(action) = inbox.surface.try_recv() {
            self.on_surface_action(action);
        }
        self.teardown();
        self.commit();
        info!("Playback controller stopped");
    }

    /// Publish the session for [`ControllerHandle::snapshot`].
    fn commit(&self) {
        let mut shared = self.snapshot.write();
        if *shared != self.session {
            shared.clone_from(&self.session);
        }
    }

    fn handle(&mut self, command: Command) -> Result<Reply> {
        if command.is_query() {
            trace!("Handling {}", command.name());
        } else {
            debug!("Handling {}", command.name());
        }

        let reply = match command {
            Command::Start { path, position_ms } => {
                self.start(path.as_deref(), position_ms)?;
                Reply::None
            }
            Command::Pause => self.transport(Transport::Pause),
            Command::Play => self.transport(Transport::Resume),
            Command::Next => self.transport(Transport::Next),
            Command::Previous => self.transport(Transport::Previous),
            Command::Seek { position_ms } => self.seek(position_ms),
            Command::Stop => self.transport(Transport::Stop),
            Command::SetSpeed { rate } => {
                self.set_speed(rate);
                Reply::None
            }

            Command::SetEqualizerBandLevel { band, level } => {
                self.effects.set_band_level(band, level);
                Reply::None
            }
            Command::SetEqualizerEnabled { enabled } => {
                self.effects.set_equalizer_enabled(enabled);
                Reply::None
            }
            Command::SetEqualizerPreset { preset } => {
                self.effects.set_equalizer_preset(preset);
                Reply::None
            }
            Command::SetReverbPreset { preset } => {
                self.effects.set_reverb_preset(preset);
                Reply::None
            }
            Command::SetBassBoostStrength { strength } => {
                self.effects.set_bass_boost_strength(strength);
                Reply::None
            }
            Command::SetVirtualizerStrength { strength } => {
                self.effects.set_virtualizer_strength(strength);
                Reply::None
            }

            Command::GetEqualizerBands => Reply::Int(self.effects.band_count().into()),
            Command::GetEqualizerBandLevelRange => {
                let (min, max) = self.effects.band_level_range();
                Reply::Range(min, max)
            }
            Command::GetEqualizerBandLevel { band } => {
                Reply::Int(self.effects.band_level(band).into())
            }
            Command::GetEqualizerEnabled => Reply::Bool(self.effects.equalizer_enabled()),
            Command::GetEqualizerPreset => Reply::Int(self.effects.equalizer_preset().into()),
            Command::GetReverbPreset => Reply::Int(self.effects.reverb_preset().into()),
            Command::GetBassBoostStrength => {
                Reply::Int(self.effects.bass_boost_strength().into())
            }
            Command::GetVirtualizerStrength => {
                Reply::Int(self.effects.virtualizer_strength().into())
            }
            Command::GetBandLevelsForPreset { preset } => {
                Reply::Levels(self.effects.band_levels_for_preset(preset))
            }
            Command::GetPlaybackSpeed => Reply::Float(self.session.speed.into()),
        };
        Ok(reply)
    }

    // Transport

    /// Replace the current session with a new one playing `path`.
    ///
    /// The prior session is released whether or not the new one comes up;
    /// a rejected start leaves the controller `Idle`.
    fn start(&mut self, path: Option<&str>, position_ms: u64) -> Result<()> {
        let path = match path.map(str::trim) {
            Some(p) if !p.is_empty() => {
                let path = PathBuf::from(p);
                check_readable(&path).map(|()| path)
            }
            _ => Err(Error::Resource("no media path given".to_string())),
        };

        self.publisher.stop_ticking();
        self.release_resources();
        let path = match path {
            Ok(path) => path,
            Err(e) => {
                warn!("Start rejected: {e}");
                self.session = PlaybackSession::default();
                self.publisher.sync(&self.session);
                return Err(e);
            }
        };

        info!("Starting {} at {position_ms} ms", path.display());
        self.session = PlaybackSession::loading(&path);

        let audio_session = match self.engine.load(&path, position_ms) {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to start {}: {e}", path.display());
                self.session = PlaybackSession::default();
                self.publisher.sync(&self.session);
                return Err(e);
            }
        };

        self.effects.rebuild(audio_session);
        self.session.state = PlaybackState::Playing;
        self.refresh_position();
        self.publisher.sync(&self.session);
        self.emit(EventState::Playing);
        self.publisher.start_ticking();
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Reply {
        let transition = self.session.state.on(Transport::Seek);
        if transition.drives_engine {
            if let Err(e) = self.engine.seek(position_ms) {
                warn!("Seek to {position_ms} ms failed: {e}");
            }
            self.refresh_position();
        }
        self.apply(transition);
        Reply::None
    }

    fn transport(&mut self, op: Transport) -> Reply {
        let transition = self.session.state.on(op);
        if transition.drives_engine {
            self.refresh_position();
            let outcome = match op {
                Transport::Pause => {
                    self.publisher.stop_ticking();
                    self.engine.pause()
                }
                Transport::Resume => self.engine.start(),
                Transport::Stop => {
                    self.publisher.stop_ticking();
                    self.engine.stop()
                }
                Transport::Seek
                | Transport::Next
                | Transport::Previous
                | Transport::Complete
                | Transport::Fail => Ok(()),
            };
            if let Err(e) = outcome {
                if op == Transport::Resume {
                    self.fail(&format!("resume failed: {e}"));
                    return Reply::None;
                }
                warn!("Engine {op:?} failed: {e}");
            }
            if op == Transport::Pause {
                self.refresh_position();
            }
        }

        self.apply(transition);

        match op {
            Transport::Resume if transition.drives_engine => self.publisher.start_ticking(),
            Transport::Stop if transition.drives_engine => self.release_resources(),
            _ => {}
        }
        Reply::None
    }

    /// Apply the state change and emit the event of `transition`.
    fn apply(&mut self, transition: Transition) {
        if let Some(next) = transition.next {
            debug!("Playback state {} -> {next}", self.session.state);
            self.session.state = next;
            self.publisher.sync(&self.session);
        }
        if let Some(state) = transition.emits {
            self.emit(state);
        }
    }

    fn set_speed(&mut self, rate: f32) {
        if !self.config.accepts_speed(rate) {
            debug!("Ignoring playback speed {rate}: outside accepted range");
            return;
        }
        match self.engine.set_speed(rate) {
            Ok(()) => {
                debug!("Playback speed set to {rate}");
                self.session.speed = rate;
            }
            Err(e) if e.is_swallowed() => debug!("Ignoring playback speed {rate}: {e}"),
            Err(e) => warn!("Failed to set playback speed {rate}: {e}"),
        }
    }

    // Engine and surface input

    fn on_notice(&mut self, notice: EngineNotice) {
        if self.engine.session_id() != Some(notice.session) {
            debug!("Ignoring notice from stale session {}", notice.session);
            return;
        }
        match notice.kind {
            NoticeKind::Completed => {
                let transition = self.session.state.on(Transport::Complete);
                if transition.next.is_none() {
                    return;
                }
                info!("Playback completed");
                self.publisher.stop_ticking();
                self.refresh_position();
                self.apply(transition);
                self.release_resources();
            }
            NoticeKind::Failed(reason) => self.fail(&reason),
        }
    }

    /// Engine failure while playing or paused: stop and release.
    fn fail(&mut self, reason: &str) {
        let transition = self.session.state.on(Transport::Fail);
        if transition.next.is_none() {
            debug!("Ignoring engine failure in {}: {reason}", self.session.state);
            return;
        }
        error!("Playback failed: {reason}");
        self.publisher.stop_ticking();
        self.refresh_position();
        self.apply(transition);
        self.release_resources();
    }

    fn on_tick(&mut self, tick: Tick) {
        if !self.publisher.is_current(tick) || self.session.state != PlaybackState::Playing {
            trace!("Dropping tick {}", tick.generation);
            return;
        }
        self.refresh_position();
        self.publisher.on_tick(tick, &self.session);
    }

    fn on_surface_action(&mut self, action: SurfaceAction) {
        debug!("Surface action: {}", action.as_str());
        if action.is_relayed() {
            self.actions.emit(ActionEvent::new(action.as_str()));
        }
        if let Err(e) = self.handle(command_for(action)) {
            warn!("Surface action {} failed: {e}", action.as_str());
        }
    }

    // Helpers

    fn emit(&self, state: EventState) {
        let event = self.session.event(state);
        trace!("Emitting {state} at {} ms", event.position_ms);
        self.events.emit(event);
    }

    /// Cache the engine's position and duration while one is loaded.
    fn refresh_position(&mut self) {
        if self.engine.is_loaded() {
            self.session.position_ms = self.engine.position_ms();
            self.session.duration_ms = self.engine.duration_ms();
        }
    }

    /// Engine first, then its effect processors.
    fn release_resources(&mut self) {
        self.engine.release();
        self.effects.release();
    }

    fn teardown(&mut self) {
        self.publisher.stop_ticking();
        if self.session.state.has_engine() {
            self.refresh_position();
            self.session.state = PlaybackState::Stopped;
            self.emit(EventState::Stopped);
        }
        self.release_resources();
        self.publisher.shutdown();
    }
}

/// Reject paths that are missing, not regular files, or unreadable.
fn check_readable(path: &Path) -> Result<()> {
    let metadata = path
        .metadata()
        .map_err(|e| Error::Resource(format!("{}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(Error::Resource(format!("{} is not a file", path.display())));
    }
    File::open(path).map_err(|e| Error::Resource(format!("{}: {e}", path.display())))?;
    Ok(())
}

/// Cloneable handle onto a running [`PlaybackController`].
#[derive(Clone)]
pub struct ControllerHandle {
    requests: Sender<Request>,
    surface: Sender<SurfaceAction>,
    events: Arc<EventBroadcaster<PlaybackEvent>>,
    actions: Arc<EventBroadcaster<ActionEvent>>,
    snapshot: Arc<RwLock<PlaybackSession>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ControllerHandle {
    /// Run `command` and wait for its reply.
    pub fn dispatch(&self, command: Command) -> Result<Reply> {
        let (tx, rx) = bounded(1);
        self.requests
            .send(Request::Command {
                command,
                reply: Some(tx),
            })
            .map_err(|_| Error::ControllerUnavailable)?;
        rx.recv().map_err(|_| Error::ControllerUnavailable)?
    }

    /// Queue `command` without waiting. Failures are only logged.
    pub fn send(&self, command: Command) -> Result<()> {
        self.requests
            .send(Request::Command {
                command,
                reply: None,
            })
            .map_err(|_| Error::ControllerUnavailable)
    }

    /// Receive playback events. Replaces any previous subscriber.
    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Receive surface actions relayed to the host (next / previous).
    pub fn subscribe_actions(&self) -> Receiver<ActionEvent> {
        self.actions.subscribe()
    }

    pub fn surface_remote(&self) -> SurfaceRemote {
        SurfaceRemote::new(self.surface.clone())
    }

    /// Last committed session.
    pub fn snapshot(&self) -> PlaybackSession {
        self.snapshot.read().clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.snapshot.read().state
    }

    /// Release everything and stop the controller thread.
    pub fn shutdown(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        let _ = self.requests.send(Request::Shutdown);
        worker.join().map_err(|_| Error::ControllerUnavailable)
    }

    // Transport

    pub fn start(&self, path: impl AsRef<Path>, position_ms: u64) -> Result<()> {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.dispatch(Command::Start {
            path: Some(path),
            position_ms,
        })
        .map(drop)
    }

    pub fn pause(&self) -> Result<()> {
        self.dispatch(Command::Pause).map(drop)
    }

    pub fn play(&self) -> Result<()> {
        self.dispatch(Command::Play).map(drop)
    }

    pub fn next(&self) -> Result<()> {
        self.dispatch(Command::Next).map(drop)
    }

    pub fn previous(&self) -> Result<()> {
        self.dispatch(Command::Previous).map(drop)
    }

    pub fn seek(&self, position_ms: u64) -> Result<()> {
        self.dispatch(Command::Seek { position_ms }).map(drop)
    }

    pub fn stop(&self) -> Result<()> {
        self.dispatch(Command::Stop).map(drop)
    }

    pub fn set_speed(&self, rate: f32) -> Result<()> {
        self.dispatch(Command::SetSpeed { rate }).map(drop)
    }

    pub fn speed(&self) -> Result<f32> {
        let reply = self.dispatch(Command::GetPlaybackSpeed)?;
        #[allow(clippy::cast_possible_truncation)]
        let rate = reply.as_float().map_or(1.0, |rate| rate as f32);
        Ok(rate)
    }

    // Effects

    pub fn set_equalizer_band_level(&self, band: i32, level: i16) -> Result<()> {
        self.dispatch(Command::SetEqualizerBandLevel { band, level })
            .map(drop)
    }

    pub fn set_equalizer_enabled(&self, enabled: bool) -> Result<()> {
        self.dispatch(Command::SetEqualizerEnabled { enabled })
            .map(drop)
    }

    pub fn set_equalizer_preset(&self, preset: i32) -> Result<()> {
        self.dispatch(Command::SetEqualizerPreset { preset }).map(drop)
    }

    pub fn set_reverb_preset(&self, preset: i32) -> Result<()> {
        self.dispatch(Command::SetReverbPreset { preset }).map(drop)
    }

    pub fn set_bass_boost_strength(&self, strength: i32) -> Result<()> {
        self.dispatch(Command::SetBassBoostStrength { strength })
            .map(drop)
    }

    pub fn set_virtualizer_strength(&self, strength: i32) -> Result<()> {
        self.dispatch(Command::SetVirtualizerStrength { strength })
            .map(drop)
    }

    pub fn equalizer_bands(&self) -> Result<i64> {
        self.query_int(Command::GetEqualizerBands)
    }

    pub fn equalizer_band_level_range(&self) -> Result<(i16, i16)> {
        let reply = self.dispatch(Command::GetEqualizerBandLevelRange)?;
        Ok(reply.as_range().unwrap_or_default())
    }

    pub fn equalizer_band_level(&self, band: i32) -> Result<i64> {
        self.query_int(Command::GetEqualizerBandLevel { band })
    }

    pub fn equalizer_enabled(&self) -> Result<bool> {
        let reply = self.dispatch(Command::GetEqualizerEnabled)?;
        Ok(reply.as_bool().unwrap_or_default())
    }

    pub fn equalizer_preset(&self) -> Result<i64> {
        self.query_int(Command::GetEqualizerPreset)
    }

    pub fn reverb_preset(&self) -> Result<i64> {
        self.query_int(Command::GetReverbPreset)
    }

    pub fn bass_boost_strength(&self) -> Result<i64> {
        self.query_int(Command::GetBassBoostStrength)
    }

    pub fn virtualizer_strength(&self) -> Result<i64> {
        self.query_int(Command::GetVirtualizerStrength)
    }

    pub fn band_levels_for_preset(&self, preset: i32) -> Result<Vec<i32>> {
        let reply = self.dispatch(Command::GetBandLevelsForPreset { preset })?;
        Ok(reply.into_levels().unwrap_or_default())
    }

    fn query_int(&self, command: Command) -> Result<i64> {
        Ok(self.dispatch(command)?.as_int().unwrap_or_default())
    }
}
