//! Schedule entries registered with the scheduler.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Recurrence family of a schedule entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Interval,
    Daily,
    Weekly,
    Cron,
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleKind::Interval => write!(f, "interval"),
            ScheduleKind::Daily => write!(f, "daily"),
            ScheduleKind::Weekly => write!(f, "weekly"),
            ScheduleKind::Cron => write!(f, "cron"),
        }
    }
}

/// Kind plus its parameters. Times are UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleSpec {
    Interval { minutes: u32 },
    Daily { time: NaiveTime },
    Weekly { weekday: Weekday, time: NaiveTime },
    Cron { expression: String },
}

impl ScheduleSpec {
    pub fn kind(&self) -> ScheduleKind {
        match self {
            ScheduleSpec::Interval { .. } => ScheduleKind::Interval,
            ScheduleSpec::Daily { .. } => ScheduleKind::Daily,
            ScheduleSpec::Weekly { .. } => ScheduleKind::Weekly,
            ScheduleSpec::Cron { .. } => ScheduleKind::Cron,
        }
    }

    /// Human-readable recurrence, e.g. `every 5 minutes`.
    pub fn describe(&self) -> String {
        match self {
            ScheduleSpec::Interval { minutes: 1 } => "every minute".to_string(),
            ScheduleSpec::Interval { minutes } => format!("every {} minutes", minutes),
            ScheduleSpec::Daily { time } => format!("daily at {}", time.format("%H:%M")),
            ScheduleSpec::Weekly { weekday, time } => {
                format!("every {} at {}", weekday, time.format("%H:%M"))
            }
            ScheduleSpec::Cron { expression } => format!("cron '{}'", expression),
        }
    }
}

/// A periodic trigger for one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub job_id: String,
    pub spec: ScheduleSpec,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    pub fn kind(&self) -> ScheduleKind {
        self.spec.kind()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run.is_some_and(|next| next <= now)
    }
}

/// What [`crate::Scheduler::get_scheduled_jobs`] reports per job.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScheduleDescriptor {
    pub kind: ScheduleKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}
