//! Content fetching.
//!
//! The engine only depends on the [`Fetcher`] trait; [`HttpFetcher`] is the
//! default transport.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::job::JobConfiguration;

mod http;

pub use http::HttpFetcher;

/// Limits applied to a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_payload_bytes: u64,
}

impl From<&JobConfiguration> for FetchOptions {
    fn from(config: &JobConfiguration) -> Self {
        Self {
            timeout: config.timeout(),
            max_payload_bytes: config.max_payload_bytes,
        }
    }
}

/// Bytes retrieved from one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Number of records in the payload; added to the extracted count.
    pub item_count: u64,
}

impl Payload {
    /// Builds a payload, deriving the item count from the bytes.
    pub fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        let item_count = count_items(&bytes);
        Self {
            bytes,
            content_type,
            item_count,
        }
    }
}

/// Retrieves the content behind a target locator.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, target: &str, options: &FetchOptions) -> Result<Payload, FetchError>;
}

/// Length of a top-level JSON array, otherwise 1.
pub fn count_items(bytes: &[u8]) -> u64 {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Array(items)) => items.len() as u64,
        _ => 1,
    }
}
