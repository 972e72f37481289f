//! Schedule bookkeeping used by the scheduler. Periodic entries live in the
//! snapshot's `schedules` map; cron expressions live on the job.

use chrono::{DateTime, Utc};

use super::JobManager;
use crate::error::JobError;
use crate::job::{Job, ScheduleEntry};

impl JobManager {
    /// Registers (or replaces) a periodic entry. Any cron expression on the
    /// job is cleared: a job has at most one schedule.
    pub(crate) fn install_periodic(&self, entry: ScheduleEntry) -> Result<(), JobError> {
        self.ensure_writable()?;
        let mut state = self.inner.lock_state();
        let job = state
            .jobs
            .get_mut(&entry.job_id)
            .ok_or_else(|| JobError::NotFound(entry.job_id.clone()))?;

        job.schedule_expression = None;
        job.next_run = entry.next_run;
        state.schedules.insert(entry.job_id.clone(), entry);
        self.inner.persist(&state);
        Ok(())
    }

    /// Stores a cron expression on the job, dropping any periodic entry.
    pub(crate) fn install_cron(
        &self,
        job_id: &str,
        expression: String,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), JobError> {
        self.ensure_writable()?;
        let mut state = self.inner.lock_state();
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        job.schedule_expression = Some(expression);
        job.next_run = next_run;
        state.schedules.remove(job_id);
        self.inner.persist(&state);
        Ok(())
    }

    /// Removes both kinds of schedule. True if anything was removed.
    pub(crate) fn clear_schedule(&self, job_id: &str) -> bool {
        if self.inner.read_only {
            return false;
        }
        let mut state = self.inner.lock_state();
        let mut removed = state.schedules.remove(job_id).is_some();
        if let Some(job) = state.jobs.get_mut(job_id) {
            removed |= job.schedule_expression.take().is_some();
            if removed {
                job.next_run = None;
            }
        }
        if removed {
            self.inner.persist(&state);
        }
        removed
    }

    /// Drops periodic entries whose job no longer exists.
    pub(crate) fn prune_schedules(&self) -> Vec<String> {
        let mut state = self.inner.lock_state();
        let orphaned: Vec<String> = state
            .schedules
            .keys()
            .filter(|job_id| !state.jobs.contains_key(*job_id))
            .cloned()
            .collect();
        for job_id in &orphaned {
            state.schedules.remove(job_id);
        }
        if !orphaned.is_empty() {
            self.inner.persist(&state);
        }
        orphaned
    }

    pub(crate) fn schedule_entries(&self) -> Vec<ScheduleEntry> {
        self.inner.lock_state().schedules.values().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn schedule_entry(&self, job_id: &str) -> Option<ScheduleEntry> {
        self.inner.lock_state().schedules.get(job_id).cloned()
    }

    /// Jobs carrying a cron expression.
    pub(crate) fn cron_jobs(&self) -> Vec<Job> {
        self.inner
            .lock_state()
            .jobs
            .values()
            .filter(|job| job.schedule_expression.is_some())
            .cloned()
            .collect()
    }

    /// Advances a periodic entry. `last_run` is only set when it fired.
    pub(crate) fn record_periodic_run(
        &self,
        job_id: &str,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) {
        let mut state = self.inner.lock_state();
        let Some(entry) = state.schedules.get_mut(job_id) else {
            return;
        };
        if last_run.is_some() {
            entry.last_run = last_run;
        }
        entry.next_run = next_run;
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.next_run = next_run;
        }
        self.inner.persist(&state);
    }

    /// Stamps a cron job's run bookkeeping; persists only on change.
    pub(crate) fn record_cron_run(
        &self,
        job_id: &str,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) {
        let mut state = self.inner.lock_state();
        let Some(job) = state.jobs.get_mut(job_id) else {
            return;
        };
        let mut changed = false;
        if last_run.is_some() && job.last_run != last_run {
            job.last_run = last_run;
            changed = true;
        }
        if job.next_run != next_run {
            job.next_run = next_run;
            changed = true;
        }
        if changed {
            self.inner.persist(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::config::EngineConfig;
    use crate::error::FetchError;
    use crate::fetch::{FetchOptions, Fetcher, Payload};
    use crate::job::{JobKind, NewJob, ScheduleSpec};
    use crate::store::MemoryStore;

    struct NoopFetcher;

    #[async_trait::async_trait]
    impl Fetcher for NoopFetcher {
        async fn fetch(&self, _: &str, _: &FetchOptions) -> Result<Payload, FetchError> {
            Ok(Payload::new(Vec::new(), None))
        }
    }

    fn setup() -> (JobManager, String, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let manager = JobManager::new(
            EngineConfig::with_data_directory(dir.path()),
            Arc::new(MemoryStore::new()),
            Arc::new(NoopFetcher),
        )
        .unwrap();
        let job_id = manager
            .create_job(NewJob::new(
                "a",
                JobKind::Custom,
                vec!["https://a.example".into()],
            ))
            .unwrap();
        (manager, job_id, dir)
    }

    fn entry(job_id: &str) -> ScheduleEntry {
        let now = Utc::now();
        ScheduleEntry {
            job_id: job_id.to_string(),
            spec: ScheduleSpec::Interval { minutes: 5 },
            created_at: now,
            next_run: Some(now + Duration::minutes(5)),
            last_run: None,
        }
    }

    #[tokio::test]
    async fn test_install_periodic_replaces_cron() {
        let (manager, job_id, _dir) = setup();
        manager
            .install_cron(&job_id, "*/5 * * * *".into(), None)
            .unwrap();
        manager.install_periodic(entry(&job_id)).unwrap();

        assert!(manager.get_job(&job_id).unwrap().schedule_expression.is_none());
        assert!(manager.schedule_entry(&job_id).is_some());
        assert!(manager.cron_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_install_unknown_job() {
        let (manager, _, _dir) = setup();
        assert!(matches!(
            manager.install_periodic(entry("missing")),
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(
            manager.install_cron("missing", "* * * * *".into(), None),
            Err(JobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_schedule() {
        let (manager, job_id, _dir) = setup();
        assert!(!manager.clear_schedule(&job_id));

        manager.install_periodic(entry(&job_id)).unwrap();
        assert!(manager.clear_schedule(&job_id));
        assert!(manager.schedule_entry(&job_id).is_none());
        assert!(manager.get_job(&job_id).unwrap().next_run.is_none());
    }

    #[tokio::test]
    async fn test_prune_removes_entries_of_deleted_jobs() {
        let (manager, job_id, _dir) = setup();
        manager.install_periodic(entry(&job_id)).unwrap();
        {
            let mut state = manager.inner.lock_state();
            state.jobs.remove(&job_id);
        }
        assert_eq!(manager.prune_schedules(), vec![job_id.clone()]);
        assert!(manager.schedule_entries().is_empty());
    }
}
