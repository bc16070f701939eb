//! Structured job results returned to the enclosing queue.

use serde::Serialize;

/// How an artifact's payload is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactKind {
    /// Inline base64-encoded bytes.
    #[serde(rename = "base64")]
    Base64,
    /// URL of the uploaded object in external storage.
    #[serde(rename = "s3_url")]
    S3Url,
}

/// One collected output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputArtifact {
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub data: String,
}

/// Status marker for a run that finished cleanly without producing
/// any artifacts.
pub const STATUS_NO_IMAGES: &str = "success_no_images";

/// The structured response for one job.  Every exit path of the
/// bridge produces one of these; absent fields are omitted from the
/// serialized output.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct JobResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<OutputArtifact>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_worker: Option<bool>,
}

impl JobResult {
    /// A terminal failure with a single top-level error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// A terminal failure carrying per-item detail lines.
    pub fn failure_with_details(error: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            error: Some(error.into()),
            details: Some(details),
            ..Self::default()
        }
    }

    /// Merge collected artifacts and accumulated errors into the
    /// final response:
    ///
    /// * no artifacts, some errors -- overall failure with details;
    /// * no artifacts, no errors -- success with an explicit
    ///   "no images" status marker;
    /// * any artifacts -- success; errors (if any) ride along.
    pub fn assemble(images: Vec<OutputArtifact>, errors: Vec<String>) -> Self {
        if images.is_empty() {
            if errors.is_empty() {
                tracing::info!("Job completed successfully, but the workflow produced no images");
                return Self {
                    images: Some(Vec::new()),
                    status: Some(STATUS_NO_IMAGES.to_string()),
                    ..Self::default()
                };
            }
            tracing::warn!("Job failed with no output images");
            return Self::failure_with_details("Job processing failed", errors);
        }

        if !errors.is_empty() {
            tracing::warn!(?errors, "Job completed with errors/warnings");
        }
        tracing::info!(count = images.len(), "Job completed, returning image(s)");

        Self {
            images: Some(images),
            errors: (!errors.is_empty()).then_some(errors),
            ..Self::default()
        }
    }
}
