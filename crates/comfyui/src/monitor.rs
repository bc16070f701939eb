//! Execution monitoring over the ComfyUI event stream.
//!
//! [`await_completion`] consumes events from a job's WebSocket
//! connection until the engine reports the prompt finished or failed.
//! Stream disconnects are handled by the liveness-gated
//! [`reattach`](crate::reconnect::reattach) loop; receive timeouts are
//! non-fatal because the engine can stay silent for the whole duration
//! of a long-running node.

use std::time::Duration;

use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use crate::api::ComfyApi;
use crate::client::{ComfyClient, ComfyConnection};
use crate::messages::{parse_event, ExecutionEvent};
use crate::reconnect::{reattach, ReconnectError, ReconnectPolicy};

/// Tunable parameters for the monitoring loop.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Per-receive timeout.  Expiry is not an error; the loop keeps
    /// waiting.
    pub recv_timeout: Duration,
    /// Reconnection policy applied on stream disconnects.
    pub reconnect: ReconnectPolicy,
    /// Log every raw frame at debug level (protocol tracing).
    pub trace_frames: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            trace_frames: false,
        }
    }
}

/// Terminal verdict of the monitoring loop.
///
/// `Errored` is not terminal for the job pipeline: a partially
/// completed prompt can still have usable outputs in history, so the
/// caller proceeds to the history fetch either way.
#[derive(Debug, Clone)]
pub enum MonitorOutcome {
    /// The engine reported the prompt finished (`executing` with a
    /// null node and this job's prompt id).
    Completed,
    /// The engine reported a node-level failure for this prompt.
    Errored {
        /// Human-readable failure site summary.
        detail: String,
    },
}

/// Errors that end monitoring without a verdict from the engine.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The stream dropped and could not be re-established.
    #[error(transparent)]
    Reconnect(#[from] ReconnectError),

    /// The consumption loop ended without reaching `Completed` or
    /// `Errored`.  This must not happen; the variant exists so the
    /// invariant is checked rather than assumed.
    #[error("Workflow monitoring loop exited without confirmation of completion or error")]
    NoTerminalState,
}

/// Internal state of the monitoring loop.
#[derive(Debug)]
enum MonitorState {
    AwaitingCompletion,
    Completed,
    Errored(String),
}

/// Consume the event stream until this job's prompt completes or errors.
///
/// Takes ownership of the connection and closes it on every exit
/// path, including reconnect failures.  Events for other prompt ids
/// are ignored; malformed frames are logged and skipped.
pub async fn await_completion(
    mut conn: ComfyConnection,
    client: &ComfyClient,
    api: &ComfyApi,
    prompt_id: &str,
    config: &MonitorConfig,
) -> Result<MonitorOutcome, MonitorError> {
    let result = consume_events(&mut conn, client, api, prompt_id, config).await;
    conn.close().await;
    result
}

/// The monitoring loop proper.  Separated from [`await_completion`]
/// so the connection can be closed on every exit path in one place.
async fn consume_events(
    conn: &mut ComfyConnection,
    client: &ComfyClient,
    api: &ComfyApi,
    prompt_id: &str,
    config: &MonitorConfig,
) -> Result<MonitorOutcome, MonitorError> {
    tracing::info!(prompt_id, "Waiting for workflow execution");

    // The session id survives reconnects; a replacement connection
    // must join the same event stream.
    let session_id = conn.client_id.clone();

    let mut state = MonitorState::AwaitingCompletion;

    while matches!(state, MonitorState::AwaitingCompletion) {
        match tokio::time::timeout(config.recv_timeout, conn.ws_stream.next()).await {
            Err(_elapsed) => {
                // The engine is allowed to be silent during long-running
                // nodes; only a closed stream is a problem.
                tracing::debug!(prompt_id, "Websocket receive timed out, still waiting");
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                if config.trace_frames {
                    tracing::debug!(frame = %text, "Received websocket frame");
                }
                if let Some(next) = apply_event(&text, prompt_id) {
                    state = next;
                }
            }
            Ok(Some(Ok(Message::Binary(_)))) => {
                // Preview image data; not part of completion detection.
                tracing::trace!("Ignoring binary frame (preview image)");
            }
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {
                // Handled automatically by tungstenite.
            }
            Ok(Some(Ok(Message::Close(frame)))) => {
                tracing::warn!(?frame, "Websocket closed by server, attempting reconnect");
                *conn = reattach(client, api, &session_id, &config.reconnect).await?;
                tracing::info!("Resuming event consumption after reconnect");
            }
            Ok(Some(Ok(Message::Frame(_)))) => {}
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "Websocket receive error, attempting reconnect");
                *conn = reattach(client, api, &session_id, &config.reconnect).await?;
                tracing::info!("Resuming event consumption after reconnect");
            }
            Ok(None) => {
                tracing::warn!("Websocket stream exhausted, attempting reconnect");
                *conn = reattach(client, api, &session_id, &config.reconnect).await?;
                tracing::info!("Resuming event consumption after reconnect");
            }
        }
    }

    match state {
        MonitorState::Completed => Ok(MonitorOutcome::Completed),
        MonitorState::Errored(detail) => Ok(MonitorOutcome::Errored { detail }),
        // The loop only exits once a terminal state is assigned; this
        // arm trips if that invariant is ever broken.
        MonitorState::AwaitingCompletion => Err(MonitorError::NoTerminalState),
    }
}

/// Interpret one text frame.  Returns the next state when the frame is
/// terminal for this prompt, `None` otherwise.
fn apply_event(text: &str, prompt_id: &str) -> Option<MonitorState> {
    let event = match parse_event(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Received invalid event frame");
            return None;
        }
    };

    match event {
        ExecutionEvent::Status(data) => {
            tracing::debug!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "Queue status update",
            );
            None
        }
        ExecutionEvent::Executing(data) => {
            if data.prompt_id.as_deref() != Some(prompt_id) {
                return None;
            }
            match data.node {
                Some(node) => {
                    tracing::debug!(prompt_id, node = %node, "Executing node");
                    None
                }
                None => {
                    tracing::info!(prompt_id, "Execution finished");
                    Some(MonitorState::Completed)
                }
            }
        }
        ExecutionEvent::ExecutionError(data) => {
            if data.prompt_id.as_deref() != Some(prompt_id) {
                return None;
            }
            let detail = data.detail();
            tracing::error!(prompt_id, %detail, "Execution error received");
            Some(MonitorState::Errored(detail))
        }
        ExecutionEvent::Unknown { event_type } => {
            tracing::trace!(event_type = %event_type, "Ignoring event");
            None
        }
    }
}
