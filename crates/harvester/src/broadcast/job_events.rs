//! Job event broadcaster for real-time execution streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::ExecutionStatus;

/// What happened to an execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    /// The execution task was spawned.
    Started { total: u64 },
    /// One target finished, successfully or not.
    ItemProcessed {
        processed: u64,
        total: u64,
        succeeded: u64,
        failed: u64,
    },
    /// The execution was finalized.
    Finished {
        status: ExecutionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Event emitted by the execution runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

impl JobEvent {
    pub fn new(job_id: &str, execution_id: &str, kind: JobEventKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            execution_id: execution_id.to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.kind, JobEventKind::Finished { .. })
    }
}

/// Broadcasts job events to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Returns a sender scoped to one execution.
    pub fn tracker(&self, job_id: &str, execution_id: &str) -> ExecutionTracker {
        ExecutionTracker {
            job_id: job_id.to_string(),
            execution_id: execution_id.to_string(),
            broadcaster: self.clone(),
        }
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Emits events for a single execution.
pub struct ExecutionTracker {
    job_id: String,
    execution_id: String,
    broadcaster: JobEventBroadcaster,
}

impl ExecutionTracker {
    fn emit(&self, kind: JobEventKind) {
        self.broadcaster
            .send(JobEvent::new(&self.job_id, &self.execution_id, kind));
    }

    pub fn started(&self, total: u64) {
        self.emit(JobEventKind::Started { total });
    }

    pub fn item_processed(&self, processed: u64, total: u64, succeeded: u64, failed: u64) {
        self.emit(JobEventKind::ItemProcessed {
            processed,
            total,
            succeeded,
            failed,
        });
    }

    pub fn finished(&self, status: ExecutionStatus, error: Option<String>) {
        self.emit(JobEventKind::Finished { status, error });
    }
}
