//! Store wrapper that remembers the last snapshot it was asked to save.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use harvester::{Snapshot, StateStore, StoreError};

pub struct RecordingStore {
    inner: Arc<dyn StateStore>,
    last_saved: Mutex<Option<Snapshot>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self {
            inner,
            last_saved: Mutex::new(None),
        }
    }

    /// The manager's in-memory state as of its latest persist.
    pub fn last_saved(&self) -> Snapshot {
        self.last_saved
            .lock()
            .unwrap()
            .clone()
            .expect("Nothing was saved")
    }
}

impl StateStore for RecordingStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        self.inner.load()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.inner.save(snapshot)?;
        *self.last_saved.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("recording {}", self.inner.describe())
    }
}
