//! Job record and its enumerations.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates an opaque id of the form `<prefix>_<yyyymmddHHMMSS>_<8 hex>`.
pub(crate) fn generate_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        prefix,
        Utc::now().format("%Y%m%d%H%M%S"),
        &suffix[..8]
    )
}

/// Semantic category of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SanctionsList,
    NewsMedia,
    CorporateRecords,
    GovernmentData,
    CourtRecords,
    PepList,
    AdverseMedia,
    Custom,
}

impl JobKind {
    pub const ALL: [JobKind; 8] = [
        JobKind::SanctionsList,
        JobKind::NewsMedia,
        JobKind::CorporateRecords,
        JobKind::GovernmentData,
        JobKind::CourtRecords,
        JobKind::PepList,
        JobKind::AdverseMedia,
        JobKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SanctionsList => "sanctions_list",
            JobKind::NewsMedia => "news_media",
            JobKind::CorporateRecords => "corporate_records",
            JobKind::GovernmentData => "government_data",
            JobKind::CourtRecords => "court_records",
            JobKind::PepList => "pep_list",
            JobKind::AdverseMedia => "adverse_media",
            JobKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown job kind '{}'", s))
    }
}

/// Lifecycle status of a job.
///
/// `Paused` is reserved: it can be stored and read back, but no manager
/// operation moves a job into or out of it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal for the current run; the job itself may be executed again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether a job may be moved from `self` to `next` outside of an
    /// execution. RUNNING is only entered by executing the job, a running
    /// job only leaves it through its runner or cancellation, and PAUSED is
    /// never entered or left.
    pub fn can_set(self, next: JobStatus) -> bool {
        match self {
            JobStatus::Running | JobStatus::Paused => false,
            _ => next.is_terminal(),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

/// Display priority. Ordered so that `Critical` sorts highest.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl JobPriority {
    pub const ALL: [JobPriority; 4] = [
        JobPriority::Low,
        JobPriority::Medium,
        JobPriority::High,
        JobPriority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Low => "low",
            JobPriority::Medium => "medium",
            JobPriority::High => "high",
            JobPriority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobPriority::ALL
            .iter()
            .copied()
            .find(|priority| priority.as_str() == s)
            .ok_or_else(|| format!("unknown job priority '{}'", s))
    }
}

/// Per-job collection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobConfiguration {
    /// Pause after each target, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Per-target timeout, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Largest payload accepted for a single target.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    /// Stored with the job but not consulted by the execution loop.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_delay_ms() -> u64 {
    1_000
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_payload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for JobConfiguration {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            timeout_ms: default_timeout_ms(),
            max_payload_bytes: default_max_payload_bytes(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

impl JobConfiguration {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Request to create a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub kind: JobKind,
    pub targets: Vec<String>,
    pub priority: JobPriority,
    /// Falls back to the engine defaults when `None`.
    pub configuration: Option<JobConfiguration>,
    /// Cron expression, stored on the job.
    pub schedule: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl NewJob {
    pub fn new(name: impl Into<String>, kind: JobKind, targets: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            targets,
            priority: JobPriority::default(),
            configuration: None,
            schedule: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_configuration(mut self, configuration: JobConfiguration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn with_schedule(mut self, expression: impl Into<String>) -> Self {
        self.schedule = Some(expression.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A user-defined unit of collection work over an ordered list of targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub targets: Vec<String>,

    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub extracted_count: u64,

    pub configuration: JobConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_expression: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_location: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Job {
    /// Builds a pending job from a creation request. Validation is the
    /// manager's job.
    pub(crate) fn from_request(request: NewJob, defaults: &JobConfiguration) -> Self {
        let total = request.targets.len() as u64;
        Self {
            id: generate_id("job"),
            name: request.name.trim().to_string(),
            kind: request.kind,
            status: JobStatus::Pending,
            priority: request.priority,
            targets: request.targets,
            total,
            processed: 0,
            succeeded: 0,
            failed: 0,
            extracted_count: 0,
            configuration: request.configuration.unwrap_or_else(|| defaults.clone()),
            schedule_expression: request.schedule,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_run: None,
            next_run: None,
            error_message: None,
            output_location: None,
            metadata: request.metadata,
        }
    }

    /// Percentage of targets processed in the current run.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.processed as f64 / self.total as f64 * 100.0
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    /// Applies a status transition, stamping `started_at` on the first entry
    /// into `Running` and `completed_at` on the first terminal status.
    pub(crate) fn apply_status(
        &mut self,
        status: JobStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        if status == JobStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        if error.is_some() {
            self.error_message = error;
        }
    }

    /// Zeroes the per-run counters before a new execution.
    pub(crate) fn reset_counters(&mut self) {
        self.total = self.targets.len() as u64;
        self.processed = 0;
        self.succeeded = 0;
        self.failed = 0;
        self.extracted_count = 0;
        self.error_message = None;
    }
}

/// Conjunctive filter for [`crate::JobManager::list_jobs`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
    pub priority: Option<JobPriority>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.status.map_or(true, |status| job.status == status)
            && self.kind.map_or(true, |kind| job.kind == kind)
            && self.priority.map_or(true, |priority| job.priority == priority)
    }
}
