//! Job manager: owns the job/execution state, enforces one active execution
//! per job and spawns execution tasks.
//!
//! Shared state lives behind two `std::sync::Mutex`es. When both are needed
//! the active-executions map is always locked before the snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::config::EngineConfig;
use crate::error::{HarvesterError, JobError};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::job::{Execution, ExecutionStatus, Job, JobFilter, JobStatus, NewJob};
use crate::scheduler::recurrence;
use crate::storage::ArtifactWriter;
use crate::store::{self, DataDirLock, Snapshot, StateStore};

mod runner;
mod schedules;
mod stats;

pub use stats::JobStatistics;

const INTERRUPTED_MESSAGE: &str = "interrupted: engine stopped while the job was running";

/// Bookkeeping for a spawned execution task.
struct ActiveExecution {
    execution_id: String,
    token: CancellationToken,
    done: watch::Receiver<bool>,
}

struct Inner {
    state: Mutex<Snapshot>,
    active: Mutex<HashMap<String, ActiveExecution>>,
    store: Arc<dyn StateStore>,
    fetcher: Arc<dyn Fetcher>,
    artifacts: ArtifactWriter,
    runtime: Handle,
    events: JobEventBroadcaster,
    config: EngineConfig,
    read_only: bool,
    _lock: Option<DataDirLock>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, Snapshot> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<String, ActiveExecution>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Active executions lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Rewrites the whole snapshot. Failures are logged; memory stays
    /// authoritative. Read-only managers never write.
    fn persist(&self, snapshot: &Snapshot) {
        if self.read_only {
            return;
        }
        if let Err(e) = self.store.save(snapshot) {
            log::error!("Failed to persist state to {}: {}", self.store.describe(), e);
        }
    }
}

/// Entry point for creating, running and inspecting jobs.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    /// Takes exclusive ownership of the data directory, opens the configured
    /// store and uses the HTTP fetcher on the current Tokio runtime.
    ///
    /// Fails with [`crate::StoreError::Locked`] while another manager owns
    /// the directory.
    pub fn open(config: EngineConfig) -> Result<Self, HarvesterError> {
        let lock = DataDirLock::acquire(&config.data_directory)?;
        let store = store::open(&config)?;
        let fetcher = Arc::new(HttpFetcher::new()?);
        let runtime = Handle::try_current().map_err(|_| JobError::NoRuntime)?;
        Self::build(config, store, fetcher, runtime, Some(lock), false)
    }

    /// Loads the configured store for inspection without taking the data
    /// directory lock. Interrupted jobs are reported as persisted, nothing is
    /// ever written back and mutating operations fail with
    /// [`JobError::ReadOnly`].
    pub fn open_read_only(config: EngineConfig) -> Result<Self, HarvesterError> {
        let store = store::open(&config)?;
        let fetcher = Arc::new(HttpFetcher::new()?);
        let runtime = Handle::try_current().map_err(|_| JobError::NoRuntime)?;
        Self::build(config, store, fetcher, runtime, None, true)
    }

    /// Builds a manager on the current Tokio runtime.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn StateStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, HarvesterError> {
        let runtime = Handle::try_current().map_err(|_| JobError::NoRuntime)?;
        Self::with_runtime(config, store, fetcher, runtime)
    }

    /// Builds a manager that spawns executions on `runtime`.
    pub fn with_runtime(
        config: EngineConfig,
        store: Arc<dyn StateStore>,
        fetcher: Arc<dyn Fetcher>,
        runtime: Handle,
    ) -> Result<Self, HarvesterError> {
        Self::build(config, store, fetcher, runtime, None, false)
    }

    fn build(
        config: EngineConfig,
        store: Arc<dyn StateStore>,
        fetcher: Arc<dyn Fetcher>,
        runtime: Handle,
        lock: Option<DataDirLock>,
        read_only: bool,
    ) -> Result<Self, HarvesterError> {
        let mut snapshot = store.load()?;
        log::info!(
            "Loaded {} jobs, {} executions and {} schedules from {}",
            snapshot.jobs.len(),
            snapshot.executions.len(),
            snapshot.schedules.len(),
            store.describe()
        );

        let recovered = if read_only {
            0
        } else {
            recover_interrupted(&mut snapshot)
        };

        let inner = Inner {
            state: Mutex::new(snapshot),
            active: Mutex::new(HashMap::new()),
            store,
            fetcher,
            artifacts: ArtifactWriter::new(config.output_directory()),
            runtime,
            events: JobEventBroadcaster::new(config.event_capacity),
            config,
            read_only,
            _lock: lock,
        };

        if recovered > 0 {
            log::warn!("Marked {} interrupted job(s) as failed", recovered);
            let state = inner.lock_state();
            inner.persist(&state);
        }

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    pub(crate) fn ensure_writable(&self) -> Result<(), JobError> {
        if self.inner.read_only {
            return Err(JobError::ReadOnly);
        }
        Ok(())
    }

    /// Validates and stores a new pending job. Returns its id.
    pub fn create_job(&self, request: NewJob) -> Result<String, JobError> {
        self.ensure_writable()?;
        if request.name.trim().is_empty() {
            return Err(JobError::Validation("name must not be empty".to_string()));
        }
        if request.targets.is_empty() {
            return Err(JobError::Validation(
                "at least one target is required".to_string(),
            ));
        }
        if let Some(expression) = &request.schedule {
            recurrence::parse_cron(expression)?;
        }

        let job = Job::from_request(request, &self.inner.config.defaults);
        let job_id = job.id.clone();

        let mut state = self.inner.lock_state();
        log::info!(
            "Created job {} '{}' ({}, {} targets)",
            job_id,
            job.name,
            job.kind,
            job.total
        );
        state.jobs.insert(job_id.clone(), job);
        self.inner.persist(&state);

        Ok(job_id)
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.inner.lock_state().jobs.get(job_id).cloned()
    }

    /// Jobs matching `filter`, highest priority first, then newest first.
    pub fn list_jobs(&self, filter: &JobFilter) -> Vec<Job> {
        let state = self.inner.lock_state();
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        jobs
    }

    /// Moves an idle job to a terminal status, stamping `completed_at` and
    /// recording `error`. RUNNING is entered through [`Self::execute_job`]
    /// and left through the runner or [`Self::cancel_job`]; PAUSED is
    /// reserved. Anything else is an [`JobError::InvalidTransition`].
    pub fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), JobError> {
        self.ensure_writable()?;
        let active = self.inner.lock_active();
        let mut state = self.inner.lock_state();
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        if active.contains_key(job_id) || !job.status.can_set(status) {
            return Err(JobError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: status,
            });
        }

        log::debug!("Job {} status {} -> {}", job_id, job.status, status);
        job.apply_status(status, error, Utc::now());
        self.inner.persist(&state);
        Ok(())
    }

    /// Removes a job, cancelling it first if it is running. Its execution
    /// history is kept. Returns false for an unknown id or on a read-only
    /// manager.
    pub fn delete_job(&self, job_id: &str) -> bool {
        if self.inner.read_only {
            return false;
        }
        let active = self.inner.lock_active();
        let mut state = self.inner.lock_state();

        if !state.jobs.contains_key(job_id) {
            return false;
        }

        if let Some(entry) = active.get(job_id) {
            log::info!("Cancelling job {} before deletion", job_id);
            entry.token.cancel();
        }

        state.jobs.remove(job_id);
        state.schedules.remove(job_id);
        self.inner.persist(&state);
        log::info!("Deleted job {}", job_id);
        true
    }

    /// Starts a new execution of `job_id` in the background and returns its
    /// execution id.
    pub fn execute_job(&self, job_id: &str) -> Result<String, JobError> {
        self.ensure_writable()?;
        let mut active = self.inner.lock_active();
        let mut state = self.inner.lock_state();

        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        if job.is_running() || active.contains_key(job_id) {
            return Err(JobError::AlreadyRunning(job_id.to_string()));
        }

        let now = Utc::now();
        job.reset_counters();
        job.apply_status(JobStatus::Running, None, now);
        job.last_run = Some(now);

        let execution = Execution::start(job_id, now);
        let plan = runner::RunPlan {
            job_id: job_id.to_string(),
            execution_id: execution.id.clone(),
            targets: job.targets.clone(),
            configuration: job.configuration.clone(),
        };
        state.executions.push(execution);
        self.inner.persist(&state);

        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        active.insert(
            job_id.to_string(),
            ActiveExecution {
                execution_id: plan.execution_id.clone(),
                token: token.clone(),
                done: done_rx,
            },
        );
        drop(state);
        drop(active);

        log::info!(
            "Executing job {} as {} ({} targets)",
            plan.job_id,
            plan.execution_id,
            plan.targets.len()
        );

        let execution_id = plan.execution_id.clone();
        self.inner
            .runtime
            .spawn(runner::run(Arc::clone(&self.inner), plan, token, done_tx));

        Ok(execution_id)
    }

    /// Requests cancellation of the running execution. Returns false when no
    /// task is registered for the job; the status is then left unchanged.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        let active = self.inner.lock_active();
        let Some(entry) = active.get(job_id) else {
            return false;
        };

        entry.token.cancel();

        let mut state = self.inner.lock_state();
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.apply_status(JobStatus::Cancelled, None, Utc::now());
            self.inner.persist(&state);
        }

        log::info!("Cancellation requested for job {}", job_id);
        true
    }

    /// Executions, newest first, optionally restricted to one job.
    pub fn get_execution_history(&self, job_id: Option<&str>) -> Vec<Execution> {
        let state = self.inner.lock_state();
        state
            .executions
            .iter()
            .rev()
            .filter(|e| job_id.map_or(true, |id| e.job_id == id))
            .cloned()
            .collect()
    }

    pub fn get_execution(&self, execution_id: &str) -> Option<Execution> {
        let state = self.inner.lock_state();
        state
            .executions
            .iter()
            .rev()
            .find(|e| e.id == execution_id)
            .cloned()
    }

    pub fn get_job_statistics(&self) -> JobStatistics {
        let state = self.inner.lock_state();
        JobStatistics::collect(&state, self.inner.config.recent_executions)
    }

    /// Whether an execution task is registered for the job.
    pub fn is_running(&self, job_id: &str) -> bool {
        self.inner.lock_active().contains_key(job_id)
    }

    pub fn active_job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock_active().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolves once the job's current execution task has exited. Returns
    /// immediately when nothing is running.
    pub async fn wait_for(&self, job_id: &str) {
        let done = self
            .inner
            .lock_active()
            .get(job_id)
            .map(|entry| entry.done.clone());

        let Some(mut done) = done else {
            return;
        };

        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }

    /// Cancels every running execution and waits for the tasks to exit.
    pub async fn shutdown(&self) {
        let ids = self.active_job_ids();
        for job_id in &ids {
            self.cancel_job(job_id);
        }
        for job_id in &ids {
            self.wait_for(job_id).await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }
}

/// Jobs left RUNNING by a previous process have no task; fail them so they
/// can be executed again.
fn recover_interrupted(snapshot: &mut Snapshot) -> usize {
    let now = Utc::now();
    let mut recovered = 0;

    for job in snapshot.jobs.values_mut() {
        if job.status == JobStatus::Running {
            job.apply_status(
                JobStatus::Failed,
                Some(INTERRUPTED_MESSAGE.to_string()),
                now,
            );
            recovered += 1;
        }
    }
    for execution in snapshot.executions.iter_mut() {
        if !execution.is_finalized() {
            execution.finalize(
                ExecutionStatus::Failed,
                Some(INTERRUPTED_MESSAGE.to_string()),
                now,
            );
        }
    }

    recovered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::{FetchOptions, Payload};
    use crate::job::{JobKind, JobPriority};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct EchoFetcher;

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, target: &str, _: &FetchOptions) -> Result<Payload, FetchError> {
            Ok(Payload::new(target.as_bytes().to_vec(), None))
        }
    }

    fn manager(dir: &std::path::Path) -> (JobManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut config = EngineConfig::with_data_directory(dir);
        config.defaults.delay_ms = 0;
        let manager = JobManager::new(config, store.clone(), Arc::new(EchoFetcher)).unwrap();
        (manager, store)
    }

    fn request(name: &str) -> NewJob {
        NewJob::new(name, JobKind::NewsMedia, vec!["https://a.example".into()])
    }

    #[tokio::test]
    async fn test_create_job_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, store) = manager(dir.path());

        let blank = manager.create_job(request("   "));
        assert!(matches!(blank, Err(JobError::Validation(_))));

        let no_targets = manager.create_job(NewJob::new("x", JobKind::Custom, vec![]));
        assert!(matches!(no_targets, Err(JobError::Validation(_))));

        let bad_cron = manager.create_job(request("cron").with_schedule("not cron"));
        assert!(matches!(bad_cron, Err(JobError::InvalidSchedule(_))));

        assert_eq!(store.save_count(), 0);
        assert!(manager.list_jobs(&JobFilter::default()).is_empty());
    }

    #[tokio::test]
    async fn test_create_and_get_job() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, store) = manager(dir.path());

        let id = manager
            .create_job(request("  Reuters  ").with_priority(JobPriority::High))
            .unwrap();
        let job = manager.get_job(&id).unwrap();

        assert_eq!(job.name, "Reuters");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, JobPriority::High);
        assert_eq!(job.configuration.delay_ms, 0);
        assert!(store.snapshot().jobs.contains_key(&id));
        assert!(manager.get_job("missing").is_none());
    }

    #[tokio::test]
    async fn test_update_status_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path());
        let result = manager.update_status("missing", JobStatus::Failed, None);
        assert!(matches!(result, Err(JobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_status_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path());
        let id = manager.create_job(request("a")).unwrap();

        manager
            .update_status(&id, JobStatus::Failed, Some("upstream gone".into()))
            .unwrap();
        let job = manager.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("upstream gone"));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_status_rejects_lifecycle_states() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path());
        let id = manager.create_job(request("a")).unwrap();

        for status in [JobStatus::Running, JobStatus::Paused, JobStatus::Pending] {
            let result = manager.update_status(&id, status, None);
            assert!(
                matches!(result, Err(JobError::InvalidTransition { to, .. }) if to == status),
                "{} was accepted",
                status
            );
        }

        let job = manager.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());
        assert!(manager.execute_job(&id).is_ok());
        manager.wait_for(&id).await;
    }

    #[tokio::test]
    async fn test_execute_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path());
        assert!(matches!(
            manager.execute_job("missing"),
            Err(JobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_and_wait() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path());
        let id = manager.create_job(request("a")).unwrap();

        let execution_id = manager.execute_job(&id).unwrap();
        manager.wait_for(&id).await;

        let job = manager.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed, 1);
        assert!(!manager.is_running(&id));

        let execution = manager.get_execution(&execution_id).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.output_artifacts.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_without_task_leaves_status() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path());
        let id = manager.create_job(request("a")).unwrap();

        assert!(!manager.cancel_job(&id));
        assert!(!manager.cancel_job("missing"));
        assert_eq!(manager.get_job(&id).unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_delete_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path());
        assert!(!manager.delete_job("missing"));
    }

    #[test]
    fn test_new_without_runtime_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = JobManager::new(
            EngineConfig::with_data_directory(dir.path()),
            Arc::new(MemoryStore::new()),
            Arc::new(EchoFetcher),
        );
        assert!(matches!(
            result,
            Err(HarvesterError::Job(JobError::NoRuntime))
        ));
    }

    #[tokio::test]
    async fn test_interrupted_jobs_are_failed_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, store) = manager(dir.path());
        let id = manager.create_job(request("a")).unwrap();

        // Persisted as running with no task behind it
        let mut snapshot = store.snapshot();
        if let Some(job) = snapshot.jobs.get_mut(&id) {
            job.status = JobStatus::Running;
        }
        snapshot.executions.push(Execution::start(&id, Utc::now()));
        let reloaded = JobManager::new(
            EngineConfig::with_data_directory(dir.path()),
            Arc::new(MemoryStore::with_snapshot(snapshot)),
            Arc::new(EchoFetcher),
        )
        .unwrap();

        let job = reloaded.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        let history = reloaded.get_execution_history(Some(&id));
        assert_eq!(history[0].status, ExecutionStatus::Failed);
        assert!(reloaded.execute_job(&id).is_ok());
    }
}
