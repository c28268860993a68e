//! Operator control surface.
//!
//! Messages are JSON objects tagged by `"type"` (`getData`, `reset`, `setApi`,
//! `togglePauseState`, `getStatus`). [serve] applies them to a [Monitor] one at a
//! time; [ControlHandle] is the sending side.

use crate::monitor::{Monitor, MonitorState, ResetOutcome};
use crate::notify::DataPayload;
use crate::rpc::BlockSource;
use crate::store::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    GetData,
    /// Clear all tallies. Refused while a poll cycle holds the busy flag (it may be
    /// inside a long retry backoff); the refusal is logged and the message must be resent.
    Reset,
    SetApi { endpoint: String },
    TogglePauseState { paused: bool },
    GetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub state: MonitorState,
    pub paused: bool,
    pub endpoint: String,
}

/// Reply to a request-style message. Fire-and-forget messages have none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Data(DataPayload),
    Status(StatusPayload),
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control channel closed")]
    Closed,
    #[error("control input/output failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("reply could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Apply one message to the monitor.
pub async fn handle<S, P>(monitor: &Monitor<S, P>, message: ControlMessage) -> Option<ControlResponse>
where
    S: BlockSource,
    P: SnapshotStore,
{
    match message {
        ControlMessage::GetData => Some(ControlResponse::Data(monitor.data().await)),
        ControlMessage::Reset => {
            if monitor.reset().await == ResetOutcome::Busy {
                tracing::warn!("reset refused, poll cycle in flight; send it again later");
            }
            None
        }
        ControlMessage::SetApi { endpoint } => {
            monitor.source().set_endpoint(endpoint);
            None
        }
        ControlMessage::TogglePauseState { paused } => {
            monitor.set_paused(paused).await;
            None
        }
        ControlMessage::GetStatus => Some(ControlResponse::Status(StatusPayload {
            state: monitor.state().await,
            paused: monitor.is_paused(),
            endpoint: monitor.source().endpoint(),
        })),
    }
}

/// Message in flight to [serve].
pub struct Command {
    message: ControlMessage,
    reply: Option<oneshot::Sender<Option<ControlResponse>>>,
}

/// Cloneable sender of control messages.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<Command>,
}

impl ControlHandle {
    /// Send and wait for the reply (`None` for fire-and-forget messages).
    pub async fn request(&self, message: ControlMessage) -> Result<Option<ControlResponse>, ControlError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command {
                message,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| ControlError::Closed)?;
        reply_rx.await.map_err(|_| ControlError::Closed)
    }

    /// Send without waiting for the message to be applied.
    pub async fn send(&self, message: ControlMessage) -> Result<(), ControlError> {
        self.tx
            .send(Command {
                message,
                reply: None,
            })
            .await
            .map_err(|_| ControlError::Closed)
    }
}

/// Control channel pair: hand the receiver to [serve].
pub fn channel(capacity: usize) -> (ControlHandle, mpsc::Receiver<Command>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ControlHandle { tx }, rx)
}

/// Apply incoming messages until every [ControlHandle] is dropped.
pub async fn serve<S, P>(monitor: Arc<Monitor<S, P>>, mut rx: mpsc::Receiver<Command>)
where
    S: BlockSource,
    P: SnapshotStore,
{
    while let Some(Command { message, reply }) = rx.recv().await {
        tracing::debug!(?message, "control message");
        let response = handle(&monitor, message).await;
        if let Some(reply) = reply {
            let _ = reply.send(response);
        }
    }
    tracing::debug!("control channel closed");
}

/// Forward one JSON control message per input line to `control`, writing each reply
/// as a JSON line to `output`. Blank and malformed lines are skipped.
///
/// Returns once `input` is exhausted; the monitor itself keeps running.
pub async fn forward_lines<R, W>(input: R, output: &mut W, control: &ControlHandle) -> Result<(), ControlError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message: ControlMessage = match serde_json::from_str(&line) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(reason = %e, "ignoring malformed control message");
                continue;
            }
        };
        if let Some(reply) = control.request(message).await? {
            let mut encoded = serde_json::to_vec(&reply)?;
            encoded.push(b'\n');
            output.write_all(&encoded).await?;
            output.flush().await?;
        }
    }
    tracing::info!("control input closed");
    Ok(())
}
