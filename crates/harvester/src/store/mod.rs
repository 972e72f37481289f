//! Durable state store.
//!
//! The manager keeps the authoritative [`Snapshot`] in memory and rewrites
//! it through a [`StateStore`] after every mutation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, StoreBackend};
use crate::error::StoreError;
use crate::job::{Execution, Job, ScheduleEntry};

mod json;
mod lock;
mod sqlite;

pub use json::JsonFileStore;
pub use lock::DataDirLock;
pub use sqlite::SqliteStore;

/// Everything the engine persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub jobs: BTreeMap<String, Job>,
    /// Execution history in insertion order (oldest first).
    #[serde(default)]
    pub executions: Vec<Execution>,
    /// Periodic schedule entries keyed by job id.
    #[serde(default)]
    pub schedules: BTreeMap<String, ScheduleEntry>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.executions.is_empty() && self.schedules.is_empty()
    }

    pub fn execution_mut(&mut self, id: &str) -> Option<&mut Execution> {
        self.executions.iter_mut().rev().find(|e| e.id == id)
    }
}

/// Backend that can load and fully rewrite a [`Snapshot`].
pub trait StateStore: Send + Sync {
    /// Loads the persisted state. A store that was never written yields an
    /// empty snapshot.
    fn load(&self) -> Result<Snapshot, StoreError>;

    /// Replaces the persisted state with `snapshot`.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Short description for log lines.
    fn describe(&self) -> String;
}

/// Opens the backend selected in the configuration.
pub fn open(config: &EngineConfig) -> Result<Arc<dyn StateStore>, StoreError> {
    let store: Arc<dyn StateStore> = match config.store_backend {
        StoreBackend::Json => Arc::new(JsonFileStore::in_directory(&config.data_directory)),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open_in_directory(&config.data_directory)?),
    };
    Ok(store)
}

/// In-memory store, used by tests and ephemeral engines.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Snapshot>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Makes every subsequent `save` fail until reset.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of the last saved snapshot.
    pub fn snapshot(&self) -> Snapshot {
        match self.snapshot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        let guard = self.snapshot.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: "memory".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "saves disabled"),
            });
        }
        let mut guard = self.snapshot.lock().map_err(|_| StoreError::LockPoisoned)?;
        *guard = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveTime, Utc};

    use super::Snapshot;
    use crate::job::{
        Execution, ExecutionStatus, Job, JobConfiguration, JobKind, NewJob, ScheduleEntry,
        ScheduleSpec,
    };

    /// A snapshot with one job, one finalized execution and one schedule.
    pub fn populated_snapshot() -> Snapshot {
        let request = NewJob::new(
            "EU sanctions",
            JobKind::SanctionsList,
            vec!["https://a.example/list.json".into()],
        )
        .with_metadata("region", serde_json::json!("eu"));
        let job = Job::from_request(request, &JobConfiguration::default());

        let now = Utc::now();
        let mut execution = Execution::start(&job.id, now);
        execution.record_success("/out/1_a.json".into(), 4);
        execution.finalize(ExecutionStatus::Completed, None, now);

        let schedule = ScheduleEntry {
            job_id: job.id.clone(),
            spec: ScheduleSpec::Daily {
                time: NaiveTime::from_hms_opt(6, 30, 0).unwrap_or_default(),
            },
            created_at: now,
            next_run: Some(now),
            last_run: None,
        };

        let mut snapshot = Snapshot::default();
        snapshot.schedules.insert(job.id.clone(), schedule);
        snapshot.executions.push(execution);
        snapshot.jobs.insert(job.id.clone(), job);
        snapshot
    }
}
