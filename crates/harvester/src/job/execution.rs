//! Execution records: one concrete run of a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::generate_id;

/// Status of a single execution. Single-shot: once terminal it never changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Throughput summary computed once when an execution is finalized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Performance {
    pub duration_secs: f64,
    pub items_per_second: f64,
    /// Percentage of processed items that succeeded.
    pub success_rate: f64,
}

impl Performance {
    pub fn compute(
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        processed: u64,
        succeeded: u64,
    ) -> Self {
        let duration_secs =
            ((completed_at - started_at).num_milliseconds().max(0) as f64) / 1000.0;
        let items_per_second = if duration_secs > 0.0 {
            processed as f64 / duration_secs
        } else {
            0.0
        };
        let success_rate = if processed > 0 {
            succeeded as f64 / processed as f64 * 100.0
        } else {
            0.0
        };
        Self {
            duration_secs,
            items_per_second,
            success_rate,
        }
    }
}

/// One run of a job with its own counters, errors and artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Execution {
    pub id: String,
    pub job_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub extracted_count: u64,

    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub output_artifacts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<Performance>,
}

impl Execution {
    /// Creates a running execution for `job_id`.
    pub(crate) fn start(job_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id("exec"),
            job_id: job_id.to_string(),
            status: ExecutionStatus::Running,
            started_at: now,
            completed_at: None,
            processed: 0,
            succeeded: 0,
            failed: 0,
            extracted_count: 0,
            errors: Vec::new(),
            output_artifacts: Vec::new(),
            error_message: None,
            performance: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }

    pub(crate) fn record_success(&mut self, artifact: String, item_count: u64) {
        if self.is_finalized() {
            return;
        }
        self.processed += 1;
        self.succeeded += 1;
        self.extracted_count += item_count;
        self.output_artifacts.push(artifact);
    }

    pub(crate) fn record_failure(&mut self, diagnostic: String) {
        if self.is_finalized() {
            return;
        }
        self.processed += 1;
        self.failed += 1;
        self.errors.push(diagnostic);
    }

    /// Seals the execution. Later calls are ignored.
    pub(crate) fn finalize(
        &mut self,
        status: ExecutionStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) {
        if self.is_finalized() {
            return;
        }
        self.status = status;
        self.completed_at = Some(now);
        self.error_message = error;
        self.performance = Some(Performance::compute(
            self.started_at,
            now,
            self.processed,
            self.succeeded,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_running() {
        let exec = Execution::start("job-1", Utc::now());
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(exec.id.starts_with("exec_"));
        assert!(!exec.is_finalized());
    }

    #[test]
    fn test_counters() {
        let mut exec = Execution::start("job-1", Utc::now());
        exec.record_success("/out/a.json".into(), 3);
        exec.record_failure("b: timeout".into());

        assert_eq!(exec.processed, 2);
        assert_eq!(exec.succeeded + exec.failed, exec.processed);
        assert_eq!(exec.extracted_count, 3);
        assert_eq!(exec.errors, vec!["b: timeout".to_string()]);
    }

    #[test]
    fn test_finalize_is_sealed() {
        let started = Utc::now();
        let mut exec = Execution::start("job-1", started);
        exec.record_success("/out/a.json".into(), 1);

        let done = started + chrono::Duration::seconds(2);
        exec.finalize(ExecutionStatus::Completed, None, done);
        exec.record_failure("late".into());
        exec.finalize(ExecutionStatus::Failed, Some("late".into()), done);

        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.processed, 1);
        assert!(exec.errors.is_empty());

        let perf = exec.performance.unwrap();
        assert_eq!(perf.duration_secs, 2.0);
        assert_eq!(perf.items_per_second, 0.5);
        assert_eq!(perf.success_rate, 100.0);
    }

    #[test]
    fn test_performance_with_nothing_processed() {
        let now = Utc::now();
        let perf = Performance::compute(now, now, 0, 0);
        assert_eq!(perf.items_per_second, 0.0);
        assert_eq!(perf.success_rate, 0.0);
    }

    #[test]
    fn test_performance_survives_json_exactly() {
        let start = Utc::now();
        for millis in 1..200 {
            let end = start + chrono::Duration::milliseconds(millis);
            for processed in 1..200 {
                let perf = Performance::compute(start, end, processed, processed / 3);
                let json = serde_json::to_string(&perf).unwrap();
                let parsed: Performance = serde_json::from_str(&json).unwrap();
                assert_eq!(parsed, perf, "{}", json);
            }
        }
    }
}
