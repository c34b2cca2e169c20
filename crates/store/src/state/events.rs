//! Append-only audit trail of unit creations and deletions.
//!
//! One JSON object per line. Pool tasks may run concurrently, so appends
//! are serialized through a mutex to keep lines whole.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tierkeep_core::types::Timestamp;
use tokio::sync::Mutex;

use crate::blocking::run_with_timeout;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub at: Timestamp,
    pub pool_id: String,
    pub unit_id: String,
    pub action: EventAction,
    pub success: bool,
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    timeout: Duration,
    guard: Mutex<()>,
}

impl EventLog {
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self {
            path,
            timeout,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &EventRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _held = self.guard.lock().await;
        let path = self.path.clone();
        run_with_timeout("append event", self.timeout, move || {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| StoreError::io(&path, e))?;
            file.write_all(&line).map_err(|e| StoreError::io(&path, e))
        })
        .await
    }

    /// All records in append order. Unparseable lines are skipped.
    pub async fn read_all(&self) -> Result<Vec<EventRecord>, StoreError> {
        let path = self.path.clone();
        let text = run_with_timeout("read events", self.timeout, move || {
            match std::fs::read_to_string(&path) {
                Ok(text) => Ok(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
                Err(e) => Err(StoreError::io(path, e)),
            }
        })
        .await?;
        Ok(text
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}
