//! The per-job pipeline: validate, probe, upload, submit, monitor,
//! collect, assemble.
//!
//! Every failure mode maps to a structured [`JobResult`]; nothing in
//! here panics on a bad job or a dead backend.  The websocket
//! connection is scoped to this function and closed on every exit
//! path.

use kiln_comfyui::api::{ComfyApi, ComfyApiError};
use kiln_comfyui::client::ComfyClient;
use kiln_comfyui::monitor::{await_completion, MonitorOutcome};

use crate::collector::{collect_artifacts, CollectError};
use crate::config::WorkerConfig;
use crate::input::validate_input;
use crate::result::JobResult;
use crate::storage::ArtifactStore;
use crate::uploader::upload_input_images;
use crate::Job;

/// Run one job to completion and produce its structured result.
pub async fn run_job(config: &WorkerConfig, job: &Job) -> JobResult {
    tracing::info!(job_id = %job.id, "Handling job");

    let mut result = process(config, job).await;
    if config.refresh_worker {
        result.refresh_worker = Some(true);
    }
    result
}

/// The pipeline proper; split out so the refresh-worker flag is
/// applied uniformly to every exit path.
async fn process(config: &WorkerConfig, job: &Job) -> JobResult {
    // Validate before any engine contact.
    let validated = match validate_input(job.input.as_ref()) {
        Ok(validated) => validated,
        Err(e) => return JobResult::failure(e.to_string()),
    };

    // The engine must answer HTTP before anything else is attempted.
    let api = ComfyApi::new(config.api_url());
    if api
        .wait_until_ready(config.readiness_attempts, config.readiness_interval)
        .await
        .is_err()
    {
        return JobResult::failure(format!(
            "ComfyUI server ({}) not reachable after multiple retries.",
            config.comfy_host
        ));
    }

    // Fail fast on input uploads: a workflow queued against missing
    // inputs wastes a whole generation run.
    if let Err(e) = upload_input_images(&api, &validated.images).await {
        return JobResult::failure_with_details(e.to_string(), e.details);
    }

    // The stream is opened before submission so no early event can be
    // missed; the session id ties the two together.
    let client_id = uuid::Uuid::new_v4().to_string();
    let client = ComfyClient::new(config.ws_url(), config.api_url());
    let conn = match client.connect(&client_id).await {
        Ok(conn) => conn,
        Err(e) => return JobResult::failure(format!("WebSocket communication error: {e}")),
    };

    let submission = match api.submit_workflow(&validated.workflow, &client_id).await {
        Ok(submission) => submission,
        Err(e) => {
            conn.close().await;
            return JobResult::failure(submit_error_message(e));
        }
    };
    tracing::info!(
        prompt_id = %submission.prompt_id,
        queue_number = ?submission.number,
        "Queued workflow",
    );

    let mut errors: Vec<String> = Vec::new();

    match await_completion(
        conn,
        &client,
        &api,
        &submission.prompt_id,
        &config.monitor_config(),
    )
    .await
    {
        Ok(MonitorOutcome::Completed) => {}
        Ok(MonitorOutcome::Errored { detail }) => {
            // Not terminal: a partially-completed prompt may still
            // have usable outputs in history.
            errors.push(format!("Workflow execution error: {detail}"));
        }
        Err(e) => return JobResult::failure(format!("WebSocket communication error: {e}")),
    }

    let store = match &config.bucket {
        Some(bucket) => Some(ArtifactStore::connect(bucket).await),
        None => None,
    };

    let images = match collect_artifacts(
        &api,
        store.as_ref(),
        &job.id,
        &submission.prompt_id,
        &mut errors,
    )
    .await
    {
        Ok(images) => images,
        Err(e @ CollectError::HistoryMissing { .. }) => {
            let msg = e.to_string();
            tracing::error!(%msg);
            if errors.is_empty() {
                return JobResult::failure(msg);
            }
            errors.push(msg);
            return JobResult::failure_with_details(
                "Job processing failed, prompt ID not found in history.",
                errors,
            );
        }
        Err(CollectError::Api(e)) => {
            return JobResult::failure(format!("HTTP communication error with ComfyUI: {e}"));
        }
    };

    JobResult::assemble(images, errors)
}

/// Map a submission failure to its job-level error message.
fn submit_error_message(error: ComfyApiError) -> String {
    match error {
        // The rejection message already carries the extracted
        // validation detail; pass it through untouched.
        ComfyApiError::Rejected(message) => message,
        other @ ComfyApiError::MissingPromptId { .. } => other.to_string(),
        other => format!("Error queuing workflow: {other}"),
    }
}
