use std::collections::BTreeMap;

use serde::Serialize;

use crate::job::{Execution, JobKind, JobPriority, JobStatus};
use crate::store::Snapshot;

/// Aggregate counts over all jobs and executions.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatistics {
    pub total_jobs: usize,
    pub running_jobs: usize,
    /// Every status is present, zero when unused.
    pub by_status: BTreeMap<JobStatus, usize>,
    pub by_kind: BTreeMap<JobKind, usize>,
    pub by_priority: BTreeMap<JobPriority, usize>,
    pub total_executions: usize,
    /// Newest first.
    pub recent_executions: Vec<Execution>,
}

impl JobStatistics {
    pub(crate) fn collect(snapshot: &Snapshot, recent: usize) -> Self {
        let mut by_status: BTreeMap<JobStatus, usize> =
            JobStatus::ALL.iter().map(|status| (*status, 0)).collect();
        let mut by_kind: BTreeMap<JobKind, usize> =
            JobKind::ALL.iter().map(|kind| (*kind, 0)).collect();
        let mut by_priority: BTreeMap<JobPriority, usize> =
            JobPriority::ALL.iter().map(|priority| (*priority, 0)).collect();

        for job in snapshot.jobs.values() {
            *by_status.entry(job.status).or_default() += 1;
            *by_kind.entry(job.kind).or_default() += 1;
            *by_priority.entry(job.priority).or_default() += 1;
        }

        Self {
            total_jobs: snapshot.jobs.len(),
            running_jobs: by_status.get(&JobStatus::Running).copied().unwrap_or(0),
            by_status,
            by_kind,
            by_priority,
            total_executions: snapshot.executions.len(),
            recent_executions: snapshot
                .executions
                .iter()
                .rev()
                .take(recent)
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::populated_snapshot;

    #[test]
    fn test_collect() {
        let mut snapshot = populated_snapshot();
        let job_id = snapshot.jobs.keys().next().cloned().unwrap();
        for _ in 0..4 {
            snapshot
                .executions
                .push(Execution::start(&job_id, chrono::Utc::now()));
        }

        let stats = JobStatistics::collect(&snapshot, 3);
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.running_jobs, 0);
        assert_eq!(stats.by_status[&JobStatus::Pending], 1);
        assert_eq!(stats.by_status[&JobStatus::Failed], 0);
        assert_eq!(stats.by_kind[&JobKind::SanctionsList], 1);
        assert_eq!(stats.by_priority[&JobPriority::Medium], 1);
        assert_eq!(stats.total_executions, 5);
        assert_eq!(stats.recent_executions.len(), 3);
        assert_eq!(stats.recent_executions[0].id, snapshot.executions[4].id);
    }

    #[test]
    fn test_serializes_enum_keys() {
        let stats = JobStatistics::collect(&populated_snapshot(), 10);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_status"]["pending"], 1);
        assert_eq!(json["by_kind"]["sanctions_list"], 1);
    }
}
