//! Periodic and cron scheduler.
//!
//! Runs on a dedicated thread with its own current-thread runtime, ticking
//! every `tick_interval`. Each tick only calls [`JobManager::execute_job`];
//! executions themselves run on the manager's runtime.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::error::JobError;
use crate::job::{ScheduleDescriptor, ScheduleEntry, ScheduleKind, ScheduleSpec};
use crate::manager::JobManager;

pub mod clock;
pub mod recurrence;

pub use clock::{Clock, ManualClock, SystemClock};

/// State shared between the handle and the scheduler thread.
struct Core {
    manager: JobManager,
    clock: Arc<dyn Clock>,
}

struct Worker {
    shutdown: Arc<AtomicBool>,
    trigger: broadcast::Sender<()>,
    exited: crossbeam_channel::Receiver<()>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    core: Arc<Core>,
    tick_interval: Duration,
    stop_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    /// Scheduler on the wall clock, timed from the manager's configuration.
    pub fn new(manager: JobManager) -> Self {
        Self::with_clock(manager, Arc::new(SystemClock))
    }

    pub fn with_clock(manager: JobManager, clock: Arc<dyn Clock>) -> Self {
        let tick_interval = manager.config().tick_interval();
        let stop_timeout = manager.config().stop_timeout();
        let core = Core { manager, clock };
        core.restore_entries();

        Self {
            core: Arc::new(core),
            tick_interval,
            stop_timeout,
            worker: Mutex::new(None),
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Scheduler worker lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Starts the tick loop. Calling it again while running is a no-op.
    pub fn start(&self) -> std::io::Result<()> {
        let mut worker = self.lock_worker();
        if worker.is_some() {
            return Ok(());
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let (trigger, mut trigger_rx) = broadcast::channel::<()>(4);
        let (exited_tx, exited) = crossbeam_channel::bounded::<()>(1);

        let core = Arc::clone(&self.core);
        let thread_shutdown = Arc::clone(&shutdown);
        let interval = self.tick_interval.max(Duration::from_secs(1));

        let handle = std::thread::Builder::new()
            .name("harvester-scheduler".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("Failed to build scheduler runtime: {}", e);
                        let _ = exited_tx.send(());
                        return;
                    }
                };

                rt.block_on(async {
                    let mut timer = tokio::time::interval(interval);
                    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                    loop {
                        tokio::select! {
                            _ = timer.tick() => {},
                            received = trigger_rx.recv() => {
                                if matches!(received, Err(broadcast::error::RecvError::Closed)) {
                                    break;
                                }
                            },
                        }

                        if thread_shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        core.tick();
                    }
                });

                log::debug!("Scheduler loop exited");
                let _ = exited_tx.send(());
            })?;

        log::info!("Scheduler started (tick every {:?})", interval);
        *worker = Some(Worker {
            shutdown,
            trigger,
            exited,
            handle,
        });
        Ok(())
    }

    /// Stops the tick loop and waits up to `stop_timeout` for it to exit.
    /// Idempotent.
    pub fn stop(&self) {
        let Some(worker) = self.lock_worker().take() else {
            return;
        };

        worker.shutdown.store(true, Ordering::Release);
        // Wake the select loop so it sees the shutdown flag
        let _ = worker.trigger.send(());

        match worker.exited.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("Scheduler thread panicked");
                }
                log::info!("Scheduler stopped");
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Scheduler did not stop within {:?}, detaching its thread",
                    self.stop_timeout
                );
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Runs one scheduling pass now. Returns the ids of the jobs it started.
    pub fn tick(&self) -> Vec<String> {
        self.core.tick()
    }

    /// Registers a schedule for a job, replacing any previous one.
    pub fn schedule_job(&self, job_id: &str, spec: ScheduleSpec) -> Result<(), JobError> {
        recurrence::validate(&spec)?;
        if self.core.manager.get_job(job_id).is_none() {
            return Err(JobError::NotFound(job_id.to_string()));
        }

        let now = self.core.clock.now();
        match spec {
            ScheduleSpec::Cron { expression } => {
                let next_run = recurrence::cron_next_after(&expression, now)?;
                self.core
                    .manager
                    .install_cron(job_id, expression.trim().to_string(), next_run)?;
                log::info!("Scheduled job {} with cron expression", job_id);
            }
            spec => {
                let entry = ScheduleEntry {
                    job_id: job_id.to_string(),
                    next_run: recurrence::next_after(&spec, now),
                    spec,
                    created_at: now,
                    last_run: None,
                };
                log::info!("Scheduled job {} {}", job_id, entry.spec.describe());
                self.core.manager.install_periodic(entry)?;
            }
        }

        Ok(())
    }

    /// Removes any schedule for the job. True if one existed.
    pub fn unschedule_job(&self, job_id: &str) -> bool {
        let removed = self.core.manager.clear_schedule(job_id);
        if removed {
            log::info!("Unscheduled job {}", job_id);
        }
        removed
    }

    /// Every scheduled job: periodic entries and cron-carrying jobs.
    pub fn get_scheduled_jobs(&self) -> BTreeMap<String, ScheduleDescriptor> {
        let mut scheduled = BTreeMap::new();

        for entry in self.core.manager.schedule_entries() {
            scheduled.insert(
                entry.job_id.clone(),
                ScheduleDescriptor {
                    kind: entry.kind(),
                    description: entry.spec.describe(),
                    next_run: entry.next_run,
                    last_run: entry.last_run,
                },
            );
        }

        for job in self.core.manager.cron_jobs() {
            let Some(expression) = job.schedule_expression else {
                continue;
            };
            let next_run = job.next_run.or_else(|| {
                recurrence::cron_next_after(&expression, job.last_run.unwrap_or(job.created_at))
                    .ok()
                    .flatten()
            });
            scheduled.insert(
                job.id.clone(),
                ScheduleDescriptor {
                    kind: ScheduleKind::Cron,
                    description: ScheduleSpec::Cron { expression }.describe(),
                    next_run,
                    last_run: job.last_run,
                },
            );
        }

        scheduled
    }

    /// Next planned trigger of a job, if it is scheduled.
    pub fn next_run(&self, job_id: &str) -> Option<DateTime<Utc>> {
        self.get_scheduled_jobs()
            .remove(job_id)
            .and_then(|descriptor| descriptor.next_run)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Core {
    /// Fills in `next_run` for persisted entries that lack one.
    fn restore_entries(&self) {
        let now = self.clock.now();
        for entry in self.manager.schedule_entries() {
            if entry.next_run.is_none() {
                let next_run = recurrence::next_after(&entry.spec, now);
                self.manager
                    .record_periodic_run(&entry.job_id, None, next_run);
            }
        }
    }

    fn tick(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut started = Vec::new();

        for job_id in self.manager.prune_schedules() {
            log::info!("Dropped schedule of deleted job {}", job_id);
        }

        for entry in self.manager.schedule_entries() {
            if !entry.is_due(now) {
                continue;
            }

            let mut fired = None;
            let job_running = self
                .manager
                .get_job(&entry.job_id)
                .map_or(true, |job| job.is_running());
            if !job_running && self.trigger(&entry.job_id) {
                started.push(entry.job_id.clone());
                fired = Some(now);
            }

            let next_run = recurrence::next_after(&entry.spec, now);
            self.manager
                .record_periodic_run(&entry.job_id, fired, next_run);
        }

        for job in self.manager.cron_jobs() {
            if job.is_running() {
                continue;
            }
            let Some(expression) = job.schedule_expression.as_deref() else {
                continue;
            };

            let anchor = job.last_run.unwrap_or(job.created_at);
            let due_at = match recurrence::cron_next_after(expression, anchor) {
                Ok(Some(due_at)) => due_at,
                Ok(None) => continue,
                Err(e) => {
                    log::error!("Job {} has an unusable cron expression: {}", job.id, e);
                    continue;
                }
            };

            if now >= due_at {
                if self.trigger(&job.id) {
                    started.push(job.id.clone());
                    let next_run = recurrence::cron_next_after(expression, now)
                        .ok()
                        .flatten();
                    self.manager.record_cron_run(&job.id, Some(now), next_run);
                }
            } else {
                self.manager.record_cron_run(&job.id, None, Some(due_at));
            }
        }

        if !started.is_empty() {
            log::info!("Scheduler tick started {} job(s)", started.len());
        }
        started
    }

    /// Executes a job, logging rather than propagating failures.
    fn trigger(&self, job_id: &str) -> bool {
        match self.manager.execute_job(job_id) {
            Ok(execution_id) => {
                log::info!("Scheduled run of job {} started as {}", job_id, execution_id);
                true
            }
            Err(JobError::AlreadyRunning(_)) => {
                log::debug!("Job {} is still running, skipping scheduled run", job_id);
                false
            }
            Err(e) => {
                log::error!("Scheduled run of job {} failed to start: {}", job_id, e);
                false
            }
        }
    }
}
