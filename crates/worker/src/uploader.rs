//! Input-image upload: decode base64 payloads and push them to the
//! engine before submission.
//!
//! Failures are collected per image so the job error names every bad
//! input at once, but any failure aborts the job before a workflow is
//! queued -- an engine run against half its inputs is never useful.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use kiln_comfyui::api::{ComfyApi, ComfyApiError};

use crate::input::InputImage;

/// Aggregate upload failure.  Carries one message per failed image.
#[derive(Debug, thiserror::Error)]
#[error("Failed to upload one or more input images")]
pub struct UploadError {
    pub details: Vec<String>,
}

/// Upload every input image to the engine, sequentially.
///
/// Sibling uploads continue after an individual failure; if any image
/// failed, the whole job aborts with the collected details.
pub async fn upload_input_images(
    api: &ComfyApi,
    images: &[InputImage],
) -> Result<(), UploadError> {
    if images.is_empty() {
        return Ok(());
    }

    tracing::info!(count = images.len(), "Uploading input image(s)");

    let mut details = Vec::new();

    for image in images {
        let payload = strip_data_uri(&image.image);

        let blob = match BASE64.decode(payload) {
            Ok(blob) => blob,
            Err(e) => {
                let msg = format!("Error decoding base64 for {}: {e}", image.name);
                tracing::warn!(%msg);
                details.push(msg);
                continue;
            }
        };

        match api.upload_image(&image.name, blob).await {
            Ok(()) => {
                tracing::info!(name = %image.name, "Uploaded input image");
            }
            Err(ComfyApiError::Request(e)) if e.is_timeout() => {
                let msg = format!("Timeout uploading {}", image.name);
                tracing::warn!(%msg);
                details.push(msg);
            }
            Err(e) => {
                let msg = format!("Error uploading {}: {e}", image.name);
                tracing::warn!(%msg);
                details.push(msg);
            }
        }
    }

    if details.is_empty() {
        tracing::info!("Input image upload complete");
        Ok(())
    } else {
        tracing::warn!(failures = details.len(), "Input image upload finished with errors");
        Err(UploadError { details })
    }
}

/// Strip an optional data-URI prefix: split on the first comma and
/// keep the remainder, otherwise assume the string is pure base64.
fn strip_data_uri(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_prefix, rest)) => rest,
        None => payload,
    }
}
