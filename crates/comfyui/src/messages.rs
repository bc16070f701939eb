//! ComfyUI WebSocket event types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes the
//! kinds that drive completion detection into a closed
//! [`ExecutionEvent`] enum; every other tag becomes
//! [`ExecutionEvent::Unknown`] so that callers can match exhaustively.

use serde::Deserialize;

/// One event received over the ComfyUI event stream.
///
/// The monitor only acts on `status`, `executing` and
/// `execution_error`; anything else the server may send (`progress`,
/// `executed`, `execution_cached`, future additions) is carried as
/// [`Unknown`](Self::Unknown) and ignored.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Server status broadcast (queue depth).
    Status(StatusData),

    /// A node is executing, or the prompt finished when `node` is `None`.
    Executing(ExecutingData),

    /// Execution failed inside a node.
    ExecutionError(ExecutionErrorData),

    /// Any event tag this bridge does not act on.
    Unknown { event_type: String },
}

/// Queue status information.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

/// Current queue state.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i64,
}

/// Payload for `executing` events.
///
/// When `node` is `None` and `prompt_id` matches the submitted job,
/// execution of that prompt has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

/// Payload for `execution_error` events.
///
/// Fields are optional because the engine populates them per error
/// site; missing values are rendered as `unknown` in error text.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionErrorData {
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub exception_message: Option<String>,
}

impl ExecutionErrorData {
    /// Human-readable one-line summary of the failure site.
    pub fn detail(&self) -> String {
        format!(
            "Node Type: {}, Node ID: {}, Message: {}",
            self.node_type.as_deref().unwrap_or("unknown"),
            self.node_id.as_deref().unwrap_or("unknown"),
            self.exception_message.as_deref().unwrap_or("unknown"),
        )
    }
}

/// Envelope shared by all ComfyUI WebSocket messages.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parse a ComfyUI WebSocket text frame into a typed event.
///
/// Returns `Err` for malformed JSON or for a recognized tag whose
/// payload does not match the expected shape.  Callers log the error
/// and keep consuming; a bad frame never changes monitor state.
pub fn parse_event(text: &str) -> Result<ExecutionEvent, serde_json::Error> {
    let raw: RawEvent = serde_json::from_str(text)?;
    let event = match raw.event_type.as_str() {
        "status" => ExecutionEvent::Status(serde_json::from_value(raw.data)?),
        "executing" => ExecutionEvent::Executing(serde_json::from_value(raw.data)?),
        "execution_error" => ExecutionEvent::ExecutionError(serde_json::from_value(raw.data)?),
        _ => ExecutionEvent::Unknown {
            event_type: raw.event_type,
        },
    };
    Ok(event)
}
