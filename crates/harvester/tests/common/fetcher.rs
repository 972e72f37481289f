//! Fetcher whose behavior is scripted per target.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use harvester::{FetchError, FetchOptions, Fetcher, Payload};

/// Canned outcome for one target.
#[derive(Debug, Clone)]
pub enum Script {
    /// Plain-text body.
    Text(&'static str),
    /// JSON body; a top-level array counts one item per element.
    Json(&'static str),
    /// Upstream answered with this status code.
    Status(u16),
    /// Sleeps, then answers with the target as a text body.
    Slow(Duration),
    /// Never answers.
    Hang,
    /// Panics inside the fetch.
    Panic,
}

#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, target: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(target.to_string(), script);
    }

    /// Targets fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, target: &str, _options: &FetchOptions) -> Result<Payload, FetchError> {
        self.calls.lock().unwrap().push(target.to_string());
        let script = self.scripts.lock().unwrap().get(target).cloned();

        match script {
            None => Ok(Payload::new(target.as_bytes().to_vec(), Some("text/plain".into()))),
            Some(Script::Text(body)) => {
                Ok(Payload::new(body.as_bytes().to_vec(), Some("text/plain".into())))
            }
            Some(Script::Json(body)) => Ok(Payload::new(
                body.as_bytes().to_vec(),
                Some("application/json".into()),
            )),
            Some(Script::Status(code)) => Err(FetchError::Status(code)),
            Some(Script::Slow(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(Payload::new(target.as_bytes().to_vec(), Some("text/plain".into())))
            }
            Some(Script::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(Script::Panic) => panic!("scripted panic for {}", target),
        }
    }
}
