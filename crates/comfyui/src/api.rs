//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (readiness probing, workflow
//! submission, history retrieval, artifact download, image upload,
//! capability introspection) using [`reqwest`].  Each endpoint carries
//! its own request timeout; slow endpoints like `/view` get more room
//! than the liveness probe.

use std::time::Duration;

use serde_json::Value;

/// Timeout for the `GET /` liveness probe.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for `POST /prompt` and `GET /history/{id}`.
const API_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for `POST /upload/image`.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for `GET /view` artifact downloads.
const VIEW_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for the best-effort `GET /object_info` introspection call.
const OBJECT_INFO_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for a single ComfyUI server.
pub struct ComfyApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.  The only
    /// valid key for history lookups of this job.
    pub prompt_id: String,
    /// Position in the execution queue, when reported.
    pub number: Option<i64>,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The engine rejected the workflow at queue time (HTTP 400).
    /// The message carries whatever structured detail could be
    /// extracted from the response body.
    #[error("{0}")]
    Rejected(String),

    /// The queue response was 2xx but did not contain a `prompt_id`.
    #[error("Missing 'prompt_id' in queue response: {body}")]
    MissingPromptId { body: String },

    /// The readiness probe exhausted its attempt budget.
    #[error("ComfyUI server not reachable after {attempts} attempts")]
    Unreachable { attempts: u32 },
}

impl ComfyApi {
    /// Create a new API client for a ComfyUI server.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Base HTTP URL this client talks to.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Probe the engine's HTTP root once.
    ///
    /// Returns `true` only on a 200 response within the liveness
    /// timeout.  Any transport error or other status means the
    /// backend cannot currently serve this job.
    pub async fn is_alive(&self) -> bool {
        match self
            .client
            .get(format!("{}/", self.api_url))
            .timeout(LIVENESS_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().as_u16() == 200,
            Err(e) => {
                tracing::debug!(error = %e, "Liveness probe failed");
                false
            }
        }
    }

    /// Poll the engine's HTTP root until it responds with 200.
    ///
    /// Makes up to `attempts` probes with a fixed `delay` between
    /// them.  Exhausting the budget is a terminal failure for the
    /// job; no partial result can be produced without a backend.
    pub async fn wait_until_ready(
        &self,
        attempts: u32,
        delay: Duration,
    ) -> Result<(), ComfyApiError> {
        tracing::info!(url = %self.api_url, attempts, "Checking ComfyUI API server");

        for attempt in 1..=attempts {
            if self.is_alive().await {
                tracing::info!(attempt, "ComfyUI API is reachable");
                return Ok(());
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(url = %self.api_url, attempts, "ComfyUI API never became reachable");
        Err(ComfyApiError::Unreachable { attempts })
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with `{"prompt": workflow, "client_id":
    /// client_id}`.  A 400 response is translated into
    /// [`ComfyApiError::Rejected`] with as much structured validation
    /// detail as the body yields; a 2xx response without a
    /// `prompt_id` is a hard error.
    pub async fn submit_workflow(
        &self,
        workflow: &Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .timeout(API_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        if response.status().as_u16() == 400 {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(body = %text, "ComfyUI rejected workflow with 400");
            return Err(ComfyApiError::Rejected(self.validation_detail(&text).await));
        }

        let value: Value = Self::parse_response(response).await?;
        let prompt_id = match value.get("prompt_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(ComfyApiError::MissingPromptId {
                    body: value.to_string(),
                })
            }
        };
        let number = value.get("number").and_then(Value::as_i64);

        Ok(SubmitResponse { prompt_id, number })
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends `GET /history/{prompt_id}`.  The returned JSON maps
    /// prompt ids to records containing declared outputs.
    pub async fn get_history(&self, prompt_id: &str) -> Result<Value, ComfyApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .timeout(API_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch an artifact's bytes from the `/view` endpoint.
    pub async fn fetch_artifact(
        &self,
        filename: &str,
        subfolder: &str,
        kind: &str,
    ) -> Result<Vec<u8>, ComfyApiError> {
        tracing::debug!(filename, subfolder, kind, "Fetching artifact bytes");

        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[("filename", filename), ("subfolder", subfolder), ("type", kind)])
            .timeout(VIEW_TIMEOUT)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Upload one input image via multipart `POST /upload/image`.
    ///
    /// The `overwrite` flag is always set so a re-run job can reuse
    /// the same input filenames.
    pub async fn upload_image(&self, name: &str, bytes: Vec<u8>) -> Result<(), ComfyApiError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Fetch the list of installed checkpoint models, best-effort.
    ///
    /// Digs `CheckpointLoaderSimple.input.required.ckpt_name[0]` out
    /// of `GET /object_info`.  Returns `None` on any failure; callers
    /// only use this to enrich error messages, never for control flow.
    pub async fn available_checkpoints(&self) -> Option<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/object_info", self.api_url))
            .timeout(OBJECT_INFO_TIMEOUT)
            .send()
            .await;

        let value: Value = match response {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not parse /object_info response");
                    return None;
                }
            },
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "Could not fetch /object_info");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch /object_info");
                return None;
            }
        };

        let options = value
            .get("CheckpointLoaderSimple")?
            .get("input")?
            .get("required")?
            .get("ckpt_name")?
            .get(0)?;

        let names = options
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect::<Vec<_>>();

        Some(names)
    }

    // ---- private helpers ----

    /// Build a human-readable rejection message from a 400 body.
    ///
    /// Handles the error shapes ComfyUI is known to produce: a
    /// structured `error` object, per-node `node_errors`, and the
    /// `prompt_outputs_failed_validation` condition (which is
    /// augmented with the live checkpoint list when available).
    async fn validation_detail(&self, body: &str) -> String {
        let data: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(_) => {
                return format!(
                    "ComfyUI validation failed (could not parse error response): {body}"
                )
            }
        };

        let mut message = "Workflow validation failed".to_string();

        if let Some(error_info) = data.get("error") {
            if let Some(obj) = error_info.as_object() {
                if let Some(msg) = obj.get("message").and_then(Value::as_str) {
                    message = msg.to_string();
                }
                if obj.get("type").and_then(Value::as_str)
                    == Some("prompt_outputs_failed_validation")
                {
                    message = "Workflow validation failed".to_string();
                }
            } else if let Some(msg) = error_info.as_str() {
                message = msg.to_string();
            }
        }

        let mut details = Vec::new();
        if let Some(node_errors) = data.get("node_errors").and_then(Value::as_object) {
            for (node_id, node_error) in node_errors {
                if let Some(fields) = node_error.as_object() {
                    for (error_type, error_msg) in fields {
                        details.push(format!(
                            "Node {node_id} ({error_type}): {}",
                            render_plain(error_msg)
                        ));
                    }
                } else {
                    details.push(format!("Node {node_id}: {}", render_plain(node_error)));
                }
            }
        }

        // The engine reports this condition without per-node detail,
        // so the live model list is the most useful hint we can add.
        if data.get("type").and_then(Value::as_str) == Some("prompt_outputs_failed_validation") {
            if let Some(msg) = data.get("message").and_then(Value::as_str) {
                message = msg.to_string();
            }
            message.push_str("\n\nThis usually means a required model or parameter is not available.");
            message.push_str(&self.checkpoint_hint().await);
            return message;
        }

        if !details.is_empty() {
            let mut detailed = format!("{message}:\n");
            detailed.push_str(
                &details
                    .iter()
                    .map(|d| format!("- {d}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );

            let looks_like_missing_model = details
                .iter()
                .any(|d| d.contains("not in list") && d.contains("ckpt_name"));
            if looks_like_missing_model {
                detailed.push('\n');
                detailed.push_str(&self.checkpoint_hint().await);
            }
            return detailed;
        }

        format!("{message}. Raw response: {body}")
    }

    /// One-line hint listing installed checkpoints, or a fallback
    /// when the capability endpoint yields nothing.
    async fn checkpoint_hint(&self) -> String {
        match self.available_checkpoints().await {
            Some(names) if !names.is_empty() => {
                format!("\nAvailable checkpoint models: {}", names.join(", "))
            }
            _ => "\nNo checkpoint models appear to be available. Please check your model installation."
                .to_string(),
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyApiError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Render a JSON value for an error line, without quoting plain strings.
fn render_plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
