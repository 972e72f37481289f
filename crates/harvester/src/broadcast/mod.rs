//! Broadcasting of execution events for live consumers (CLI, embedding apps).

pub mod job_events;

pub use job_events::{ExecutionTracker, JobEvent, JobEventBroadcaster, JobEventKind};
