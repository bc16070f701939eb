//! History fetch and artifact collection after execution ends.
//!
//! The history record is authoritative for what a job produced --
//! the event stream only says *that* it finished.  Per-artifact
//! failures are recorded and skipped so one bad file never discards
//! its siblings; only a missing history entry is terminal.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;

use kiln_comfyui::api::{ComfyApi, ComfyApiError};

use crate::result::{ArtifactKind, OutputArtifact};
use crate::storage::ArtifactStore;

/// Artifact type the engine marks as intermediate; never collected.
const TRANSIENT_KIND: &str = "temp";

/// One artifact reference inside a node's declared outputs.
#[derive(Debug, Deserialize)]
struct ImageRef {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    subfolder: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Terminal collection failures.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The submission id was absent from the history record set.
    #[error("Prompt ID {prompt_id} not found in history after execution.")]
    HistoryMissing { prompt_id: String },

    /// The history fetch itself failed at the HTTP layer.
    #[error(transparent)]
    Api(#[from] ComfyApiError),
}

/// Fetch the job's history record and collect its artifacts.
///
/// Every non-terminal problem (missing filename, failed byte fetch,
/// failed storage upload) pushes a message onto `errors` and skips
/// that artifact.  When `store` is configured artifacts are staged
/// and uploaded; otherwise they are returned inline as base64.
pub async fn collect_artifacts(
    api: &ComfyApi,
    store: Option<&ArtifactStore>,
    job_id: &str,
    prompt_id: &str,
    errors: &mut Vec<String>,
) -> Result<Vec<OutputArtifact>, CollectError> {
    tracing::info!(prompt_id, "Fetching history");
    let history = api.get_history(prompt_id).await?;

    let entry = history
        .get(prompt_id)
        .ok_or_else(|| CollectError::HistoryMissing {
            prompt_id: prompt_id.to_string(),
        })?;

    let outputs = entry.get("outputs").and_then(Value::as_object);
    let outputs = match outputs {
        Some(outputs) if !outputs.is_empty() => outputs,
        _ => {
            let warning = format!("No outputs found in history for prompt {prompt_id}.");
            tracing::warn!(%warning);
            if errors.is_empty() {
                errors.push(warning);
            }
            return Ok(Vec::new());
        }
    };

    tracing::info!(nodes = outputs.len(), "Processing output nodes");

    let mut collected = Vec::new();

    for (node_id, node_output) in outputs {
        if let Some(images) = node_output.get("images").and_then(Value::as_array) {
            tracing::debug!(node_id = %node_id, count = images.len(), "Node declared image(s)");
            for image in images {
                collect_one(api, store, job_id, node_id, image, &mut collected, errors).await;
            }
        }

        // Forward-compat: surface output kinds we do not collect yet.
        let other_keys: Vec<&String> = node_output
            .as_object()
            .map(|fields| fields.keys().filter(|k| k.as_str() != "images").collect())
            .unwrap_or_default();
        if !other_keys.is_empty() {
            tracing::warn!(
                node_id = %node_id,
                keys = ?other_keys,
                "Node produced unhandled output keys",
            );
        }
    }

    Ok(collected)
}

/// Collect a single declared artifact, appending either an output
/// entry or an error message.
async fn collect_one(
    api: &ComfyApi,
    store: Option<&ArtifactStore>,
    job_id: &str,
    node_id: &str,
    image: &Value,
    collected: &mut Vec<OutputArtifact>,
    errors: &mut Vec<String>,
) {
    let image_ref: ImageRef = match serde_json::from_value(image.clone()) {
        Ok(image_ref) => image_ref,
        Err(e) => {
            let msg = format!("Skipping malformed image entry in node {node_id}: {e}");
            tracing::warn!(%msg);
            errors.push(msg);
            return;
        }
    };

    let kind = image_ref.kind.as_deref().unwrap_or("output");
    if kind == TRANSIENT_KIND {
        tracing::debug!(
            node_id = %node_id,
            filename = ?image_ref.filename,
            "Skipping transient artifact",
        );
        return;
    }

    let filename = match image_ref.filename.as_deref() {
        Some(filename) if !filename.is_empty() => filename,
        _ => {
            let msg = format!("Skipping image in node {node_id} due to missing filename");
            tracing::warn!(%msg);
            errors.push(msg);
            return;
        }
    };

    let bytes = match api.fetch_artifact(filename, &image_ref.subfolder, kind).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(filename, error = %e, "Artifact fetch failed");
            errors.push(format!(
                "Failed to fetch image data for {filename} from /view endpoint."
            ));
            return;
        }
    };

    match store {
        Some(store) => match store.stage_and_upload(job_id, filename, &bytes).await {
            Ok(url) => collected.push(OutputArtifact {
                filename: filename.to_string(),
                kind: ArtifactKind::S3Url,
                data: url,
            }),
            Err(e) => {
                let msg = format!("Error uploading {filename} to S3: {e}");
                tracing::warn!(%msg);
                errors.push(msg);
            }
        },
        None => {
            collected.push(OutputArtifact {
                filename: filename.to_string(),
                kind: ArtifactKind::Base64,
                data: BASE64.encode(&bytes),
            });
            tracing::debug!(filename, "Encoded artifact as base64");
        }
    }
}
