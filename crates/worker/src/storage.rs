//! External artifact storage over an S3-compatible endpoint.
//!
//! Collected artifact bytes are staged to a scoped temporary file and
//! uploaded with the AWS SDK.  The temporary file is owned by a
//! [`tempfile::NamedTempFile`], so it is removed on every exit path --
//! success, staging failure, or upload failure alike.

use std::io::Write as _;
use std::path::Path;

use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;

use crate::config::BucketConfig;

/// Fallback suffix for staged files whose filename has no extension.
const DEFAULT_SUFFIX: &str = ".png";

/// Handle to the configured artifact bucket.
pub struct ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    endpoint_url: String,
}

/// Errors while staging or uploading an artifact.  All of them are
/// per-artifact: the collector records the message and moves on.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to stage artifact to a temporary file: {0}")]
    Stage(#[from] std::io::Error),

    #[error("Failed to read staged artifact: {0}")]
    Read(String),

    #[error("S3 upload failed: {0}")]
    Upload(String),
}

impl ArtifactStore {
    /// Build an S3 client against the configured endpoint.
    ///
    /// Credentials and (optionally) region come from the standard AWS
    /// environment; path-style addressing is forced because the
    /// endpoint is usually a non-AWS S3 implementation.
    pub async fn connect(config: &BucketConfig) -> Self {
        let region = RegionProviderChain::default_provider().or_else("us-east-1");
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .endpoint_url(config.endpoint_url.clone())
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&base)
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            endpoint_url: config.endpoint_url.trim_end_matches('/').to_string(),
        }
    }

    /// Stage `bytes` to a temporary file and upload them under
    /// `{job_id}/{filename}`.  Returns the object URL.
    pub async fn stage_and_upload(
        &self,
        job_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let mut staged = tempfile::Builder::new()
            .prefix("kiln-artifact-")
            .suffix(&artifact_suffix(filename))
            .tempfile()?;
        staged.write_all(bytes)?;
        staged.flush()?;
        tracing::debug!(path = %staged.path().display(), "Staged artifact bytes");

        let body = ByteStream::from_path(staged.path())
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;

        let key = format!("{job_id}/{filename}");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Upload(e.to_string()))?;

        let url = format!("{}/{}/{}", self.endpoint_url, self.bucket, key);
        tracing::info!(filename, %url, "Uploaded artifact to S3");
        Ok(url)
    }
}

/// Suffix for the staged temp file, preserving the artifact's
/// extension so downstream tooling can sniff the format.
fn artifact_suffix(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| DEFAULT_SUFFIX.to_string())
}
