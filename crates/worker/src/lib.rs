//! Job-execution bridge between a serverless job queue and a ComfyUI
//! generation server.
//!
//! One [`Job`] at a time flows through validation, readiness probing,
//! input-image upload, workflow submission, execution monitoring and
//! artifact collection, and always comes out as a structured
//! [`result::JobResult`] -- never a crash.

use serde::Deserialize;
use serde_json::Value;

pub mod collector;
pub mod config;
pub mod handler;
pub mod input;
pub mod result;
pub mod storage;
pub mod uploader;
pub mod workflow;

/// One generation job handed to the bridge by the enclosing queue.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    /// Queue-assigned job identifier; used to scope uploaded artifacts.
    pub id: String,
    /// Raw input payload; validated by [`input::validate_input`].
    #[serde(default)]
    pub input: Option<Value>,
}
