//! File playback engine coordinating decode, effects, rate conversion, and
//! output.
//!
//! Each session runs one worker thread that owns the decoder and the output
//! stream. Commands are acknowledged, so a `seek` has been applied by the
//! time it returns and position reads reflect it.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cadenza_core::{AudioSessionId, BackendConfig, Error, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use super::buffer::{shared_ring_buffer, SharedRingBuffer};
use super::decode::FileDecoder;
use super::effects::{EffectRack, RackRegistry, SharedRack};
use super::output::{Output, OutputTarget};
use super::resample::Varispeed;
use crate::engine::{EngineFactory, EngineNotice, EngineSession, NoticeKind, NoticeSender};

/// Ring samples per millisecond of buffering (48 kHz stereo).
const RING_SAMPLES_PER_MS: usize = 96;

/// Keep this much ring space free before decoding more.
const MIN_FREE: usize = 2048;

const READY_TIMEOUT: Duration = Duration::from_secs(5);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug)]
enum EngineCommand {
    Play,
    Pause,
    Seek(u64),
    Stop,
    SetSpeed(f32),
    Shutdown,
}

struct Request {
    command: EngineCommand,
    reply: Sender<Result<()>>,
}

/// State the worker publishes for lock-free reads.
#[derive(Default)]
struct Shared {
    playing: Arc<AtomicBool>,
    position_ms: AtomicU64,
    duration_ms: AtomicU64,
}

/// Opens [`SoftwareEngine`] sessions.
pub struct SoftwareEngineFactory {
    config: BackendConfig,
    target: OutputTarget,
    racks: RackRegistry,
    next_id: Arc<AtomicU32>,
}

impl SoftwareEngineFactory {
    pub(crate) const fn new(
        config: BackendConfig,
        target: OutputTarget,
        racks: RackRegistry,
        next_id: Arc<AtomicU32>,
    ) -> Self {
        Self {
            config,
            target,
            racks,
            next_id,
        }
    }
}

impl EngineFactory for SoftwareEngineFactory {
    fn open(&mut self, path: &Path, notices: NoticeSender) -> Result<Box<dyn EngineSession>> {
        let decoder = FileDecoder::open(path)?;
        let session = AudioSessionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let shared = Arc::new(Shared::default());
        shared
            .duration_ms
            .store(decoder.duration_ms().unwrap_or(0), Ordering::Release);
        let rack = Arc::new(Mutex::new(EffectRack::new(decoder.sample_rate())));

        let (command_tx, command_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let setup = WorkerSetup {
            session,
            target: self.target.clone(),
            ring_samples: self.config.ring_buffer_ms as usize * RING_SAMPLES_PER_MS,
            prefill_ms: self.config.prefill_ms,
            commands: command_rx,
            notices,
            shared: Arc::clone(&shared),
            rack: Arc::clone(&rack),
            decoder,
        };

        let worker = std::thread::Builder::new()
            .name(format!("audio-engine-{}", session.0))
            .spawn(move || setup.launch(&ready_tx))
            .map_err(|e| Error::EngineInit(format!("Failed to spawn engine thread: {e}")))?;

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                // The worker exits on its own once the command channel drops.
                return Err(Error::EngineInit(format!(
                    "session {session} not ready after {READY_TIMEOUT:?}"
                )));
            }
        }

        self.racks.insert(session, rack);
        info!("Engine session {session} prepared for {}", path.display());

        Ok(Box::new(SoftwareEngine {
            session,
            commands: command_tx,
            shared,
            worker: Some(worker),
            racks: self.racks.clone(),
        }))
    }
}

/// One prepared file, rendered by its own worker thread.
pub struct SoftwareEngine {
    session: AudioSessionId,
    commands: Sender<Request>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    racks: RackRegistry,
}

impl SoftwareEngine {
    fn request(&self, command: EngineCommand) -> Result<()> {
        if self.worker.is_none() {
            return Err(Error::UnsupportedCapability(format!(
                "engine session {} released",
                self.session
            )));
        }

        let (reply, response) = bounded(1);
        self.commands
            .send(Request { command, reply })
            .map_err(|_| {
                Error::AudioOutput(format!("engine worker for {} has exited", self.session))
            })?;
        response.recv_timeout(COMMAND_TIMEOUT).map_err(|_| {
            Error::AudioOutput(format!("engine worker for {} not responding", self.session))
        })?
    }
}

impl EngineSession for SoftwareEngine {
    fn audio_session_id(&self) -> AudioSessionId {
        self.session
    }

    fn start(&mut self) -> Result<()> {
        self.request(EngineCommand::Play)
    }

    fn pause(&mut self) -> Result<()> {
        self.request(EngineCommand::Pause)
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        self.request(EngineCommand::Seek(position_ms))
    }

    fn stop(&mut self) -> Result<()> {
        self.request(EngineCommand::Stop)
    }

    fn set_speed(&mut self, rate: f32) -> Result<()> {
        self.request(EngineCommand::SetSpeed(rate))
    }

    fn position_ms(&self) -> u64 {
        self.shared.position_ms.load(Ordering::Acquire)
    }

    fn duration_ms(&self) -> u64 {
        self.shared.duration_ms.load(Ordering::Acquire)
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    fn release(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let (reply, _) = bounded(1);
        let _ = self.commands.send(Request {
            command: EngineCommand::Shutdown,
            reply,
        });
        if worker.join().is_err() {
            error!("Engine worker for {} panicked", self.session);
        }

        self.shared.playing.store(false, Ordering::Release);
        self.racks.remove(self.session);
        info!("Engine session {} released", self.session);
    }
}

impl Drop for SoftwareEngine {
    fn drop(&mut self) {
        self.release();
    }
}

/// Everything the worker thread needs to build itself.
struct WorkerSetup {
    session: AudioSessionId,
    target: OutputTarget,
    ring_samples: usize,
    prefill_ms: u32,
    commands: Receiver<Request>,
    notices: NoticeSender,
    shared: Arc<Shared>,
    rack: SharedRack,
    decoder: FileDecoder,
}

impl WorkerSetup {
    /// Open the output (cpal streams must stay on this thread), prefill, and
    /// report readiness before entering the render loop.
    fn launch(self, ready: &Sender<Result<()>>) {
        match self.prepare() {
            Ok(mut worker) => match worker.fill(worker.prefill_samples) {
                Ok(()) => {
                    let _ = ready.send(Ok(()));
                    worker.run();
                }
                Err(e) => {
                    let _ = ready.send(Err(Error::EngineInit(format!("prefill failed: {e}"))));
                }
            },
            Err(e) => {
                let _ = ready.send(Err(Error::EngineInit(e.to_string())));
            }
        }
    }

    fn prepare(self) -> Result<EngineWorker> {
        let ring = shared_ring_buffer(self.ring_samples);
        let output = Output::open(
            &self.target,
            Arc::clone(&ring),
            Arc::clone(&self.shared.playing),
        )?;
        let source_rate = self.decoder.sample_rate();
        let output_rate = output.sample_rate();
        let varispeed = Varispeed::new(source_rate, output_rate)?;

        let prefill_samples = usize::try_from(frames_in(u64::from(self.prefill_ms), output_rate))
            .unwrap_or(usize::MAX)
            .saturating_mul(2)
            .min(ring.capacity() / 2);

        debug!(
            "Session {}: {source_rate} Hz source, {output_rate} Hz output, {} sample ring",
            self.session,
            ring.capacity()
        );

        Ok(EngineWorker {
            session: self.session,
            commands: self.commands,
            notices: self.notices,
            shared: self.shared,
            ring,
            output,
            decoder: self.decoder,
            varispeed,
            rack: self.rack,
            backlog: Vec::new(),
            source_rate,
            decoded_frames: 0,
            prefill_samples,
            eof: false,
            stopped: false,
            finished: false,
        })
    }
}

/// Internal worker that runs the render loop.
struct EngineWorker {
    session: AudioSessionId,
    commands: Receiver<Request>,
    notices: NoticeSender,
    shared: Arc<Shared>,
    ring: SharedRingBuffer,
    output: Output,
    decoder: FileDecoder,
    varispeed: Varispeed,
    rack: SharedRack,
    /// Converted audio that did not fit in the ring yet.
    backlog: Vec<f32>,
    source_rate: u32,
    /// Source frames read from the decoder, counted from position 0.
    decoded_frames: u64,
    prefill_samples: usize,
    eof: bool,
    stopped: bool,
    /// Completion or failure has been reported.
    finished: bool,
}

impl EngineWorker {
    fn run(mut self) {
        debug!("Engine worker for {} started", self.session);

        loop {
            // Poll when rendering, block briefly otherwise.
            let request = if self.is_playing() {
                match self.commands.try_recv() {
                    Ok(request) => Some(request),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match self.commands.recv_timeout(IDLE_POLL) {
                    Ok(request) => Some(request),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };

            if let Some(Request { command, reply }) = request {
                if matches!(command, EngineCommand::Shutdown) {
                    let _ = reply.send(Ok(()));
                    break;
                }
                let result = self.handle(command);
                let _ = reply.send(result);
            }

            if self.is_playing() {
                if let Err(e) = self.fill(self.ring.capacity()) {
                    self.fail(&e);
                }
                self.output.pump();
                self.update_position();
                self.check_finished();
            }

            if self.ring.free() < MIN_FREE || self.eof {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        self.shared.playing.store(false, Ordering::Release);
        debug!("Engine worker for {} exited", self.session);
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    fn set_playing(&self, playing: bool) {
        self.shared.playing.store(playing, Ordering::Release);
    }

    fn handle(&mut self, command: EngineCommand) -> Result<()> {
        trace!("Session {} command: {command:?}", self.session);
        match command {
            EngineCommand::Play => {
                if self.stopped {
                    return Err(Error::UnsupportedCapability(format!(
                        "engine session {} is stopped",
                        self.session
                    )));
                }
                if !self.finished {
                    self.set_playing(true);
                }
                Ok(())
            }
            EngineCommand::Pause => {
                if self.is_playing() {
                    self.update_position();
                }
                self.set_playing(false);
                Ok(())
            }
            EngineCommand::Seek(position_ms) => self.seek_to(position_ms),
            EngineCommand::Stop => {
                if self.is_playing() {
                    self.update_position();
                }
                self.set_playing(false);
                self.stopped = true;
                self.ring.clear();
                self.backlog.clear();
                Ok(())
            }
            EngineCommand::SetSpeed(rate) => {
                self.varispeed.set_speed(rate)?;
                debug!("Session {} speed set to {rate}", self.session);
                Ok(())
            }
            EngineCommand::Shutdown => Ok(()),
        }
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        let duration = self.shared.duration_ms.load(Ordering::Acquire);
        let target = if duration > 0 {
            position_ms.min(duration)
        } else {
            position_ms
        };
        debug!("Session {} seeking to {target} ms", self.session);

        self.ring.clear();
        self.backlog.clear();
        self.varispeed.reset();
        self.rack.lock().reset();
        self.eof = false;
        self.finished = false;

        match self.decoder.seek(target) {
            Ok(()) => {}
            Err(e) if duration > 0 && target >= duration => {
                debug!("Seek to end of session {}: {e}", self.session);
                self.eof = true;
            }
            Err(e) => return Err(e),
        }

        self.decoded_frames = frames_in(target, self.source_rate);
        self.shared.position_ms.store(target, Ordering::Release);
        self.fill(self.prefill_samples)
    }

    /// Decode until the ring holds `target` samples, it is nearly full, or
    /// the stream ends.
    fn fill(&mut self, target: usize) -> Result<()> {
        loop {
            if !self.backlog.is_empty() {
                let written = self.ring.write(&self.backlog);
                self.backlog.drain(..written);
                if !self.backlog.is_empty() {
                    return Ok(());
                }
            }

            if self.eof || self.ring.available() >= target || self.ring.free() < MIN_FREE {
                return Ok(());
            }

            match self.decoder.decode_next()? {
                Some(mut samples) => {
                    self.decoded_frames += (samples.len() / 2) as u64;
                    self.rack.lock().process(&mut samples);
                    self.backlog = self.varispeed.process(&samples)?;
                }
                None => {
                    trace!("Session {} reached end of stream", self.session);
                    self.eof = true;
                    self.backlog = self.varispeed.flush()?;
                }
            }
        }
    }

    /// Position is what has been decoded minus everything still queued
    /// ahead of the output, in source frames.
    fn update_position(&self) {
        let per_output = self.varispeed.input_per_output();
        let queued = (self.ring.available() + self.backlog.len()) as f64 / 2.0 * per_output
            + self.varispeed.pending_frames() as f64
            + self.varispeed.latency_frames();
        let frames = (self.decoded_frames as f64 - queued).max(0.0);
        let mut position = (frames * 1000.0 / f64::from(self.source_rate)) as u64;

        let duration = self.shared.duration_ms.load(Ordering::Acquire);
        if duration > 0 {
            position = position.min(duration);
        }
        self.shared.position_ms.store(position, Ordering::Release);
    }

    fn check_finished(&mut self) {
        if self.finished || !self.eof || !self.backlog.is_empty() || !self.ring.is_empty() {
            return;
        }
        self.finished = true;
        self.set_playing(false);

        let duration = self.shared.duration_ms.load(Ordering::Acquire);
        if duration > 0 {
            self.shared.position_ms.store(duration, Ordering::Release);
        }
        info!("Session {} playback finished", self.session);
        self.notify(NoticeKind::Completed);
    }

    fn fail(&mut self, error: &Error) {
        error!("Session {} failed: {error}", self.session);
        self.finished = true;
        self.eof = true;
        self.set_playing(false);
        self.ring.clear();
        self.backlog.clear();
        self.notify(NoticeKind::Failed(error.to_string()));
    }

    fn notify(&self, kind: NoticeKind) {
        let notice = EngineNotice {
            session: self.session,
            kind,
        };
        if self.notices.send(notice).is_err() {
            warn!("No listener for notices from session {}", self.session);
        }
    }
}

/// Frames at `rate` Hz in `ms` milliseconds, saturating on overflow.
fn frames_in(ms: u64, rate: u32) -> u64 {
    ms.saturating_mul(u64::from(rate)) / 1000
}
