use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::JobConfiguration;

/// Engine configuration. Every field has a default, so an empty document is
/// a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Where the store lives.
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,
    #[serde(default)]
    pub store_backend: StoreBackend,
    /// Artifact root; `<data_directory>/output` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
    /// Seconds between scheduler ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// How long `Scheduler::stop` waits for the loop to exit.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    /// Executions reported in `JobStatistics::recent_executions`.
    #[serde(default = "default_recent_executions")]
    pub recent_executions: usize,
    /// Capacity of the job event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Configuration given to jobs created without one.
    #[serde(default)]
    pub defaults: JobConfiguration,
}

/// Durable store implementation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

fn default_data_directory() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".harvester"))
        .unwrap_or_else(|| PathBuf::from(".harvester"))
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_stop_timeout_secs() -> u64 {
    5
}

fn default_recent_executions() -> usize {
    10
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            store_backend: StoreBackend::default(),
            output_directory: None,
            tick_interval_secs: default_tick_interval_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
            recent_executions: default_recent_executions(),
            event_capacity: default_event_capacity(),
            defaults: JobConfiguration::default(),
        }
    }
}

impl EngineConfig {
    /// Configuration rooted at `data_directory`, everything else default.
    pub fn with_data_directory<P: Into<PathBuf>>(data_directory: P) -> Self {
        Self {
            data_directory: data_directory.into(),
            ..Self::default()
        }
    }

    pub fn output_directory(&self) -> PathBuf {
        self.output_directory
            .clone()
            .unwrap_or_else(|| self.data_directory.join("output"))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}
