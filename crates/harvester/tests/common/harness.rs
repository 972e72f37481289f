//! Test harness for isolated manager instances.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use harvester::{
    EngineConfig, Execution, JobKind, JobManager, JsonFileStore, MemoryStore, NewJob,
    SqliteStore, StateStore,
};

use super::fetcher::ScriptedFetcher;

pub struct TestHarness {
    temp_dir: TempDir,
    pub fetcher: Arc<ScriptedFetcher>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            fetcher: Arc::new(ScriptedFetcher::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config().output_directory()
    }

    /// Engine config rooted in the temp directory, with no delay between
    /// targets.
    pub fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::with_data_directory(self.temp_dir.path());
        config.defaults.delay_ms = 0;
        config
    }

    /// Manager over an in-memory store.
    pub fn manager(&self) -> (JobManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (self.manager_with_store(store.clone()), store)
    }

    pub fn manager_with_store(&self, store: Arc<dyn StateStore>) -> JobManager {
        self.manager_with(self.config(), store)
    }

    pub fn manager_with(&self, config: EngineConfig, store: Arc<dyn StateStore>) -> JobManager {
        JobManager::new(config, store, self.fetcher.clone()).expect("Failed to build manager")
    }

    pub fn json_store(&self) -> Arc<JsonFileStore> {
        Arc::new(JsonFileStore::in_directory(self.temp_dir.path()))
    }

    pub fn sqlite_store(&self) -> Arc<SqliteStore> {
        Arc::new(
            SqliteStore::open_in_directory(self.temp_dir.path())
                .expect("Failed to open SQLite store"),
        )
    }

    /// Executes `job_id` and waits for the execution to be finalized.
    pub async fn run(&self, manager: &JobManager, job_id: &str) -> Execution {
        let execution_id = manager.execute_job(job_id).expect("Failed to start job");
        manager.wait_for(job_id).await;
        manager
            .get_execution(&execution_id)
            .expect("Execution was not recorded")
    }
}

/// Custom-kind job request over `targets`.
pub fn job(name: &str, targets: &[&str]) -> NewJob {
    NewJob::new(
        name,
        JobKind::Custom,
        targets.iter().map(|t| t.to_string()).collect(),
    )
}
