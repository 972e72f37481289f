//! Data model mutated by the manager: jobs, executions and schedule entries.

pub mod execution;
pub mod model;
pub mod schedule;

pub use execution::{Execution, ExecutionStatus, Performance};
pub use model::{Job, JobConfiguration, JobFilter, JobKind, JobPriority, JobStatus, NewJob};
pub use schedule::{ScheduleDescriptor, ScheduleEntry, ScheduleKind, ScheduleSpec};
