//! Liveness-gated reconnection for a dropped event stream.
//!
//! When the WebSocket drops mid-job the bridge must decide between
//! "network blip" and "backend crashed".  [`reattach`] probes the
//! engine's HTTP root before every attempt: an unreachable backend
//! aborts immediately (reconnecting a stream to a dead server cannot
//! help), a reachable one gets a bounded number of reconnect attempts
//! with a fixed delay between them.

use std::time::Duration;

use crate::api::ComfyApi;
use crate::client::{ComfyClient, ComfyConnection};

/// Tunable parameters for the reconnect loop.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnection attempts.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

/// Errors from a failed reconnection.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// The HTTP root stopped answering: the backend itself is gone,
    /// not just the stream.
    #[error("ComfyUI HTTP unreachable during websocket reconnect")]
    BackendDown,

    /// Every attempt in the budget failed while the backend stayed up.
    #[error("Websocket reconnect failed after {attempts} attempts. Last error: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Attempt to re-establish the event stream after a disconnect.
///
/// Probes liveness before every attempt, so a backend that dies
/// midway through the budget is detected on the next pass instead of
/// burning the remaining attempts.  Returns the new connection on
/// success; events that arrived during the gap are not replayed, so
/// completion must still be confirmed against the history endpoint.
pub async fn reattach(
    client: &ComfyClient,
    api: &ComfyApi,
    client_id: &str,
    policy: &ReconnectPolicy,
) -> Result<ComfyConnection, ReconnectError> {
    let mut last_error = String::from("no attempt made");

    for attempt in 1..=policy.max_attempts {
        if !api.is_alive().await {
            tracing::error!(
                attempt,
                "ComfyUI HTTP unreachable, aborting websocket reconnect",
            );
            return Err(ReconnectError::BackendDown);
        }

        tracing::info!(
            attempt,
            max_attempts = policy.max_attempts,
            "Reconnect attempt (ComfyUI HTTP reachable)",
        );

        match client.connect(client_id).await {
            Ok(conn) => {
                tracing::info!(attempt, "Websocket reconnected");
                return Ok(conn);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                last_error = e.to_string();
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    tracing::error!(
        attempts = policy.max_attempts,
        "Failed to reconnect websocket after connection closed",
    );
    Err(ReconnectError::Exhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}
