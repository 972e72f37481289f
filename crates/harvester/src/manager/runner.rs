//! Body of one execution task.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::Inner;
use crate::broadcast::ExecutionTracker;
use crate::error::{FetchError, StorageError};
use crate::fetch::FetchOptions;
use crate::job::{ExecutionStatus, JobConfiguration, JobStatus};
use crate::sanitize::redact_target;

/// Immutable inputs captured when the execution was started.
pub(super) struct RunPlan {
    pub job_id: String,
    pub execution_id: String,
    pub targets: Vec<String>,
    pub configuration: JobConfiguration,
}

/// Errors that abort the whole execution.
#[derive(Error, Debug)]
enum ExecutionError {
    #[error("cannot prepare output directory: {0}")]
    OutputDirectory(#[from] StorageError),

    #[error("job {0} was removed during execution")]
    JobVanished(String),

    #[error("execution panicked: {0}")]
    Panicked(String),
}

enum ItemOutcome {
    Success { artifact: String, item_count: u64 },
    /// Error text; recorded as `<target>: <error>`.
    Failure(String),
}

pub(super) async fn run(
    inner: Arc<Inner>,
    plan: RunPlan,
    token: CancellationToken,
    done: watch::Sender<bool>,
) {
    let span = tracing::info_span!(
        "execution",
        job_id = %plan.job_id,
        execution_id = %plan.execution_id,
    );

    async move {
        let tracker = inner.events.tracker(&plan.job_id, &plan.execution_id);
        tracker.started(plan.targets.len() as u64);

        let directory = inner
            .artifacts
            .execution_directory(&plan.job_id, &plan.execution_id);

        let outcome = AssertUnwindSafe(process_targets(&inner, &plan, &token, &tracker))
            .catch_unwind()
            .await;

        let fatal = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(panic) => Some(ExecutionError::Panicked(panic_message(panic))),
        };

        let (status, error) = finalize(&inner, &plan, &token, fatal, directory);
        tracker.finished(status, error);
        let _ = done.send(true);
    }
    .instrument(span)
    .await
}

async fn process_targets(
    inner: &Inner,
    plan: &RunPlan,
    token: &CancellationToken,
    tracker: &ExecutionTracker,
) -> Result<(), ExecutionError> {
    let directory = inner.artifacts.prepare(&plan.job_id, &plan.execution_id)?;
    let options = FetchOptions::from(&plan.configuration);
    let delay = plan.configuration.delay();

    for (index, target) in plan.targets.iter().enumerate() {
        if token.is_cancelled() {
            log::info!(
                "Execution {} cancelled after {} of {} targets",
                plan.execution_id,
                index,
                plan.targets.len()
            );
            break;
        }

        let fetched =
            tokio::time::timeout(options.timeout, inner.fetcher.fetch(target, &options)).await;

        let outcome = match fetched {
            Ok(Ok(payload)) => match inner.artifacts.write(
                &directory,
                index,
                target,
                payload.content_type.as_deref(),
                &payload.bytes,
            ) {
                Ok(path) => ItemOutcome::Success {
                    artifact: path.display().to_string(),
                    item_count: payload.item_count,
                },
                Err(e) => ItemOutcome::Failure(e.to_string()),
            },
            Ok(Err(e)) => ItemOutcome::Failure(e.to_string()),
            Err(_) => ItemOutcome::Failure(FetchError::Timeout(options.timeout).to_string()),
        };

        if let ItemOutcome::Failure(error) = &outcome {
            log::warn!("Target {} failed: {}", redact_target(target), error);
        }

        record_item(inner, plan, token, target, outcome, tracker)?;

        let is_last = index + 1 == plan.targets.len();
        if !is_last && !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => {}
            }
        }
    }

    Ok(())
}

/// Applies one target's outcome to the job and execution, then persists.
fn record_item(
    inner: &Inner,
    plan: &RunPlan,
    token: &CancellationToken,
    target: &str,
    outcome: ItemOutcome,
    tracker: &ExecutionTracker,
) -> Result<(), ExecutionError> {
    let mut state = inner.lock_state();

    let counters = match state.jobs.get_mut(&plan.job_id) {
        Some(job) => {
            job.processed += 1;
            match &outcome {
                ItemOutcome::Success { item_count, .. } => {
                    job.succeeded += 1;
                    job.extracted_count += item_count;
                }
                ItemOutcome::Failure(_) => job.failed += 1,
            }
            Some((job.processed, job.total, job.succeeded, job.failed))
        }
        None if token.is_cancelled() => None,
        None => return Err(ExecutionError::JobVanished(plan.job_id.clone())),
    };

    if let Some(execution) = state.execution_mut(&plan.execution_id) {
        match outcome {
            ItemOutcome::Success {
                artifact,
                item_count,
            } => execution.record_success(artifact, item_count),
            ItemOutcome::Failure(error) => {
                execution.record_failure(format!("{}: {}", target, error))
            }
        }
    }

    inner.persist(&state);
    drop(state);

    if let Some((processed, total, succeeded, failed)) = counters {
        tracker.item_processed(processed, total, succeeded, failed);
    }
    Ok(())
}

/// Seals the execution, settles the job status and unregisters the task.
fn finalize(
    inner: &Inner,
    plan: &RunPlan,
    token: &CancellationToken,
    fatal: Option<ExecutionError>,
    directory: PathBuf,
) -> (ExecutionStatus, Option<String>) {
    let now = Utc::now();
    let mut active = inner.lock_active();
    let mut state = inner.lock_state();

    let (status, error) = match fatal {
        Some(e) => (ExecutionStatus::Failed, Some(e.to_string())),
        None if token.is_cancelled() => (ExecutionStatus::Cancelled, None),
        None => (ExecutionStatus::Completed, None),
    };

    if let Some(execution) = state.execution_mut(&plan.execution_id) {
        execution.finalize(status, error.clone(), now);
    }

    if let Some(job) = state.jobs.get_mut(&plan.job_id) {
        let job_status = if status == ExecutionStatus::Cancelled
            || job.status == JobStatus::Cancelled
        {
            JobStatus::Cancelled
        } else if status == ExecutionStatus::Failed {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        job.apply_status(job_status, error.clone(), now);
        job.output_location = Some(directory.display().to_string());
    }

    let owns_entry = active
        .get(&plan.job_id)
        .is_some_and(|entry| entry.execution_id == plan.execution_id);
    if owns_entry {
        active.remove(&plan.job_id);
    }

    inner.persist(&state);

    match &error {
        Some(e) => log::error!("Execution {} failed: {}", plan.execution_id, e),
        None => log::info!("Execution {} finished: {}", plan.execution_id, status),
    }

    (status, error)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
