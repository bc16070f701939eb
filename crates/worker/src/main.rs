//! `kiln-worker` -- ComfyUI job-execution bridge.
//!
//! Reads one job as JSON from stdin (`{"id": "...", "input": {...}}`),
//! drives it through the ComfyUI engine, and writes the structured
//! result as JSON to stdout.  Logs go to stderr so stdout stays a
//! clean result channel for the enclosing queue.
//!
//! # Environment variables
//!
//! See [`WorkerConfig::from_env`](kiln_worker::config::WorkerConfig::from_env)
//! for the full table (engine host, retry budgets, protocol tracing,
//! S3 artifact storage, worker refresh).

use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kiln_worker::config::WorkerConfig;
use kiln_worker::handler::run_job;
use kiln_worker::result::JobResult;
use kiln_worker::Job;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiln_worker=info,kiln_comfyui=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(comfy_host = %config.comfy_host, "Starting kiln-worker");

    let mut raw = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut raw).await {
        emit(&JobResult::failure(format!("Failed to read job from stdin: {e}")));
        return;
    }

    let job: Job = match serde_json::from_str(&raw) {
        Ok(job) => job,
        Err(e) => {
            emit(&JobResult::failure(format!("Invalid job payload: {e}")));
            return;
        }
    };

    let result = run_job(&config, &job).await;
    emit(&result);
}

/// Write the result to stdout as a single JSON document.
fn emit(result: &JobResult) {
    let json = serde_json::to_string(result).expect("JobResult is always serialisable");
    println!("{json}");
}
