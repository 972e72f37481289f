//! Shared test utilities for harvester integration tests.
//!
//! - `TestHarness` builds managers over an isolated temp data directory
//! - `ScriptedFetcher` returns per-target canned outcomes
//! - `RecordingStore` keeps the last snapshot handed to a durable store

#![allow(unused_imports)]

pub mod fetcher;
pub mod harness;
pub mod store;

pub use fetcher::{Script, ScriptedFetcher};
pub use harness::{job, TestHarness};
pub use store::RecordingStore;
