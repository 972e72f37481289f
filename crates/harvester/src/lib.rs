//! Job execution and scheduling engine.
//!
//! A [`JobManager`] owns jobs and their execution history, runs at most one
//! execution per job on a Tokio runtime and persists everything through a
//! [`StateStore`]. A [`Scheduler`] triggers jobs on interval, daily, weekly
//! or cron schedules.

pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod job;
pub mod manager;
pub mod sanitize;
pub mod scheduler;
pub mod storage;
pub mod store;

pub use broadcast::{JobEvent, JobEventBroadcaster, JobEventKind};
pub use config::{load_config, load_or_default, EngineConfig, StoreBackend};
pub use error::{
    ConfigError, FetchError, HarvesterError, JobError, Result, StorageError, StoreError,
};
pub use fetch::{FetchOptions, Fetcher, HttpFetcher, Payload};
pub use job::{
    Execution, ExecutionStatus, Job, JobConfiguration, JobFilter, JobKind, JobPriority,
    JobStatus, NewJob, Performance, ScheduleDescriptor, ScheduleEntry, ScheduleKind,
    ScheduleSpec,
};
pub use manager::{JobManager, JobStatistics};
pub use scheduler::{Clock, ManualClock, Scheduler, SystemClock};
pub use storage::ArtifactWriter;
pub use store::{DataDirLock, JsonFileStore, MemoryStore, Snapshot, SqliteStore, StateStore};
