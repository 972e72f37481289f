//! Subcommand handlers.

use anyhow::{anyhow, Context};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use harvester::{JobConfiguration, JobFilter, JobManager, NewJob, ScheduleSpec, Scheduler};

use crate::output::Printer;
use crate::CreateArgs;

pub fn create(manager: &JobManager, args: CreateArgs, out: &Printer) -> anyhow::Result<()> {
    let mut request = NewJob::new(args.name, args.kind, args.targets).with_priority(args.priority);

    if args.delay_ms.is_some() || args.timeout_ms.is_some() || args.max_payload_bytes.is_some() {
        let defaults = &manager.config().defaults;
        request = request.with_configuration(JobConfiguration {
            delay_ms: args.delay_ms.unwrap_or(defaults.delay_ms),
            timeout_ms: args.timeout_ms.unwrap_or(defaults.timeout_ms),
            max_payload_bytes: args.max_payload_bytes.unwrap_or(defaults.max_payload_bytes),
            retry_attempts: defaults.retry_attempts,
        });
    }
    if let Some(expression) = args.cron {
        request = request.with_schedule(expression);
    }
    for (key, raw) in args.metadata {
        let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
        request = request.with_metadata(key, value);
    }

    let job_id = manager.create_job(request)?;
    if out.is_json() {
        out.json(&serde_json::json!({ "id": job_id }))
    } else {
        println!("{}", job_id);
        Ok(())
    }
}

pub fn list(manager: &JobManager, filter: &JobFilter, out: &Printer) -> anyhow::Result<()> {
    out.jobs(&manager.list_jobs(filter))
}

pub fn show(manager: &JobManager, job_id: &str, out: &Printer) -> anyhow::Result<()> {
    let job = manager
        .get_job(job_id)
        .ok_or_else(|| anyhow!("job not found: {}", job_id))?;
    out.job(&job)
}

pub fn delete(manager: &JobManager, job_id: &str, out: &Printer) -> anyhow::Result<()> {
    if !manager.delete_job(job_id) {
        return Err(anyhow!("job not found: {}", job_id));
    }
    out.message(&format!("Deleted {}", job_id));
    Ok(())
}

/// Starts an execution and streams its events until it is finalized.
pub async fn run(manager: &JobManager, job_id: &str, out: &Printer) -> anyhow::Result<()> {
    // Subscribe first so the Started event is not missed
    let mut events = manager.subscribe();
    let execution_id = manager.execute_job(job_id)?;
    let mut interrupt = interrupt_channel()?;

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) if event.execution_id == execution_id => {
                    out.event(&event)?;
                    if event.is_finished() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Skipped {} events while following {}", skipped, execution_id);
                }
                Err(RecvError::Closed) => break,
            },
            Some(()) = interrupt.recv() => {
                log::info!("Interrupted, cancelling job {}", job_id);
                manager.cancel_job(job_id);
            }
        }
    }

    manager.wait_for(job_id).await;

    let execution = manager
        .get_execution(&execution_id)
        .with_context(|| format!("execution {} disappeared", execution_id))?;
    if !out.is_json() {
        out.execution_summary(&execution)?;
    }
    Ok(())
}

pub fn history(
    manager: &JobManager,
    job_id: Option<&str>,
    limit: usize,
    out: &Printer,
) -> anyhow::Result<()> {
    let mut executions = manager.get_execution_history(job_id);
    executions.truncate(limit);
    out.executions(&executions)
}

pub fn stats(manager: &JobManager, out: &Printer) -> anyhow::Result<()> {
    out.statistics(&manager.get_job_statistics())
}

pub fn schedule(
    manager: &JobManager,
    job_id: &str,
    spec: ScheduleSpec,
    out: &Printer,
) -> anyhow::Result<()> {
    let scheduler = Scheduler::new(manager.clone());
    let description = spec.describe();
    scheduler.schedule_job(job_id, spec)?;

    match scheduler.next_run(job_id) {
        Some(next) => out.message(&format!(
            "Scheduled {} {} (next run {})",
            job_id,
            description,
            next.format("%Y-%m-%d %H:%M:%S UTC")
        )),
        None => out.message(&format!("Scheduled {} {}", job_id, description)),
    }
    if out.is_json() {
        out.schedules(&scheduler.get_scheduled_jobs())?;
    }
    Ok(())
}

pub fn unschedule(manager: &JobManager, job_id: &str, out: &Printer) -> anyhow::Result<()> {
    let scheduler = Scheduler::new(manager.clone());
    if scheduler.unschedule_job(job_id) {
        out.message(&format!("Unscheduled {}", job_id));
    } else {
        out.message(&format!("{} had no schedule", job_id));
    }
    Ok(())
}

pub fn schedules(manager: &JobManager, out: &Printer) -> anyhow::Result<()> {
    let scheduler = Scheduler::new(manager.clone());
    out.schedules(&scheduler.get_scheduled_jobs())
}

/// Runs the scheduler until Ctrl-C, then stops it and cancels running jobs.
pub async fn daemon(manager: &JobManager) -> anyhow::Result<()> {
    let scheduler = Scheduler::new(manager.clone());
    scheduler
        .start()
        .context("failed to start the scheduler thread")?;
    log::info!(
        "Scheduler running with {} scheduled job(s); press Ctrl-C to stop",
        scheduler.get_scheduled_jobs().len()
    );

    let mut events = manager.subscribe();
    let mut interrupt = interrupt_channel()?;

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) if event.is_finished() => {
                    log::info!("Job {} execution {} finished", event.job_id, event.execution_id);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => log::debug!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
            Some(()) = interrupt.recv() => break,
        }
    }

    log::info!("Shutting down");
    tokio::task::block_in_place(|| scheduler.stop());
    manager.shutdown().await;
    Ok(())
}

/// Forwards Ctrl-C presses into the async world. Installed once per process.
fn interrupt_channel() -> anyhow::Result<mpsc::UnboundedReceiver<()>> {
    let (tx, rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("failed to install the Ctrl-C handler")?;
    Ok(rx)
}
