//! JSON-lines host transport over stdin/stdout.
//!
//! Each input line is either a command, `{"id":1,"method":"seek","positionMs":5000}`,
//! or a session-surface button press, `{"action":"pause"}`. Commands get
//! `{"id":..,"result":..}` or `{"id":..,"error":..}` back. Playback events
//! and relayed actions are written as they happen, as `{"event":{...}}` and
//! `{"action":"next"}`.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::time::Duration;

use anyhow::Result;
use cadenza_audio::ControllerHandle;
use cadenza_core::{ActionEvent, Command, PlaybackEvent, Reply, SurfaceAction};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, info, warn};

/// How long to wait for trailing events after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command { id: Value, command: Command },
    Surface(SurfaceAction),
}

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Reply { id: Value, result: Reply },
    Failure { id: Value, error: String },
    Event { event: PlaybackEvent },
    Action(ActionEvent),
}

pub fn parse_line(line: &str) -> std::result::Result<Inbound, String> {
    let mut value: Value = serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
    let Some(object) = value.as_object_mut() else {
        return Err("expected a JSON object".to_string());
    };

    if object.contains_key("method") {
        let id = object.remove("id").unwrap_or(Value::Null);
        let command = serde_json::from_value(value).map_err(|e| format!("invalid command: {e}"))?;
        Ok(Inbound::Command { id, command })
    } else if object.contains_key("action") {
        serde_json::from_value(value)
            .map(Inbound::Surface)
            .map_err(|e| format!("invalid action: {e}"))
    } else {
        Err("expected \"method\" or \"action\"".to_string())
    }
}

/// Run one inbound line against the controller. Blocks until the
/// controller replies.
pub fn respond(handle: &ControllerHandle, inbound: Inbound) -> Option<Outbound> {
    match inbound {
        Inbound::Command { id, command } => {
            debug!("Host command {}", command.name());
            Some(match handle.dispatch(command) {
                Ok(result) => Outbound::Reply { id, result },
                Err(e) => Outbound::Failure {
                    id,
                    error: e.to_string(),
                },
            })
        }
        Inbound::Surface(action) => match handle.surface_remote().trigger(action) {
            Ok(()) => None,
            Err(e) => Some(Outbound::Failure {
                id: Value::Null,
                error: e.to_string(),
            }),
        },
    }
}

/// Serve the host until input ends or the process is interrupted, then shut
/// the controller down.
pub async fn serve<R, W>(handle: ControllerHandle, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (out_tx, mut out_rx) = unbounded_channel();
    forward(handle.subscribe(), out_tx.clone(), |event| Outbound::Event {
        event,
    })?;
    forward(handle.subscribe_actions(), out_tx, Outbound::Action)?;

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    let mut lines = input.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Input closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let reply = match parse_line(line) {
                    Ok(inbound) => {
                        let handle = handle.clone();
                        tokio::task::spawn_blocking(move || respond(&handle, inbound)).await?
                    }
                    Err(error) => {
                        warn!("Rejected input line: {error}");
                        Some(Outbound::Failure { id: Value::Null, error })
                    }
                };
                if let Some(reply) = reply {
                    write_line(&mut output, &reply).await?;
                }
            }
            Some(out) = out_rx.recv() => write_line(&mut output, &out).await?,
            _ = &mut interrupted => {
                info!("Interrupted");
                break;
            }
        }
    }

    let closing = handle.clone();
    tokio::task::spawn_blocking(move || closing.shutdown()).await??;

    while let Ok(Some(out)) = tokio::time::timeout(DRAIN_TIMEOUT, out_rx.recv()).await {
        write_line(&mut output, &out).await?;
    }
    Ok(())
}

/// Pump a controller channel into the output queue from a plain thread, so
/// the runtime never waits on it at exit.
fn forward<T: Send + 'static>(
    source: crossbeam_channel::Receiver<T>,
    sink: UnboundedSender<Outbound>,
    wrap: fn(T) -> Outbound,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("transport-forward".to_string())
        .spawn(move || {
            for item in source {
                if sink.send(wrap(item)).is_err() {
                    break;
                }
            }
        })
        .map(drop)
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &Outbound) -> Result<()> {
    let mut bytes = serde_json::to_vec(line)?;
    bytes.push(b'\n');
    output.write_all(&bytes).await?;
    output.flush().await?;
    Ok(())
}
