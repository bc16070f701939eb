//! Worker configuration loaded from environment variables.

use std::time::Duration;

use kiln_comfyui::monitor::MonitorConfig;
use kiln_comfyui::reconnect::ReconnectPolicy;

/// Bridge configuration, constructed once at process start and passed
/// to every component.
///
/// All fields have defaults suitable for a worker colocated with its
/// ComfyUI instance. Override via environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Host and port the engine listens on (default: `127.0.0.1:8188`).
    pub comfy_host: String,
    /// Readiness probe attempt budget (default: `500`).
    pub readiness_attempts: u32,
    /// Delay between readiness probes (default: `50ms`).
    pub readiness_interval: Duration,
    /// Websocket reconnect attempt budget (default: `5`).
    pub reconnect_attempts: u32,
    /// Delay between websocket reconnect attempts (default: `3s`).
    pub reconnect_delay: Duration,
    /// Log every raw websocket frame at debug level (default: `false`).
    pub ws_trace: bool,
    /// External artifact storage; `None` switches the collector to
    /// inline base64 artifacts.
    pub bucket: Option<BucketConfig>,
    /// Ask the enclosing queue to recycle this worker after the job.
    pub refresh_worker: bool,
}

/// S3-compatible storage endpoint for collected artifacts.
#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// Endpoint URL, e.g. `https://s3.us-east-1.amazonaws.com`.
    pub endpoint_url: String,
    /// Bucket receiving staged artifacts.
    pub bucket: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default          |
    /// |-----------------------------------|------------------|
    /// | `COMFY_HOST`                      | `127.0.0.1:8188` |
    /// | `COMFY_API_AVAILABLE_MAX_RETRIES` | `500`            |
    /// | `COMFY_API_AVAILABLE_INTERVAL_MS` | `50`             |
    /// | `WEBSOCKET_RECONNECT_ATTEMPTS`    | `5`              |
    /// | `WEBSOCKET_RECONNECT_DELAY_S`     | `3`              |
    /// | `WEBSOCKET_TRACE`                 | `false`          |
    /// | `BUCKET_ENDPOINT_URL`             | unset            |
    /// | `BUCKET_NAME`                     | `comfyui-outputs`|
    /// | `REFRESH_WORKER`                  | `false`          |
    pub fn from_env() -> Self {
        let comfy_host =
            std::env::var("COMFY_HOST").unwrap_or_else(|_| "127.0.0.1:8188".to_string());

        let readiness_attempts: u32 = std::env::var("COMFY_API_AVAILABLE_MAX_RETRIES")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("COMFY_API_AVAILABLE_MAX_RETRIES must be a valid u32");

        let readiness_interval_ms: u64 = std::env::var("COMFY_API_AVAILABLE_INTERVAL_MS")
            .unwrap_or_else(|_| "50".into())
            .parse()
            .expect("COMFY_API_AVAILABLE_INTERVAL_MS must be a valid u64");

        let reconnect_attempts: u32 = std::env::var("WEBSOCKET_RECONNECT_ATTEMPTS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("WEBSOCKET_RECONNECT_ATTEMPTS must be a valid u32");

        let reconnect_delay_s: u64 = std::env::var("WEBSOCKET_RECONNECT_DELAY_S")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("WEBSOCKET_RECONNECT_DELAY_S must be a valid u64");

        let ws_trace = env_flag("WEBSOCKET_TRACE");
        let refresh_worker = env_flag("REFRESH_WORKER");

        let bucket = std::env::var("BUCKET_ENDPOINT_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .map(|endpoint_url| BucketConfig {
                endpoint_url,
                bucket: std::env::var("BUCKET_NAME")
                    .unwrap_or_else(|_| "comfyui-outputs".to_string()),
            });

        Self {
            comfy_host,
            readiness_attempts,
            readiness_interval: Duration::from_millis(readiness_interval_ms),
            reconnect_attempts,
            reconnect_delay: Duration::from_secs(reconnect_delay_s),
            ws_trace,
            bucket,
            refresh_worker,
        }
    }

    /// HTTP base URL for the engine.
    pub fn api_url(&self) -> String {
        format!("http://{}", self.comfy_host)
    }

    /// WebSocket base URL for the engine.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.comfy_host)
    }

    /// Monitoring parameters derived from this configuration.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect_attempts,
                delay: self.reconnect_delay,
            },
            trace_frames: self.ws_trace,
            ..MonitorConfig::default()
        }
    }
}

/// Parse a boolean env flag: `true` (case-insensitive) enables it.
fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.to_ascii_lowercase() == "true")
        .unwrap_or(false)
}
