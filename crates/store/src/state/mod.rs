//! The engine's own state directory.
//!
//! ```text
//! <state_dir>/
//!   markers/<pool>.period   last period key archived per pool
//!   events.jsonl            append-only create/delete audit trail
//!   reports/<pool>.json     most recent outcome per pool
//!   locks/<pool>.lock       advisory per-pool lock
//! ```
//!
//! Every read and write is bounded by the directory's I/O timeout.

mod events;
mod lock;
mod markers;
mod reports;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use events::{EventAction, EventLog, EventRecord};
pub use lock::{PoolLock, LOCK_RETRY_INTERVAL};

use crate::blocking::run_with_timeout;
use crate::error::StoreError;

/// Default bound on one state file operation.
pub const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
    timeout: Duration,
    events: Arc<EventLog>,
}

impl StateDir {
    /// Open (creating if needed) the state directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for sub in ["markers", "reports", "locks"] {
            let dir = root.join(sub);
            std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(dir, e))?;
        }
        let events = Arc::new(EventLog::new(root.join("events.jsonl"), DEFAULT_STATE_TIMEOUT));
        Ok(Self {
            root,
            timeout: DEFAULT_STATE_TIMEOUT,
            events,
        })
    }

    /// Replace the I/O timeout, including the event log's.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let events = Arc::new(EventLog::new(self.events.path().to_path_buf(), timeout));
        Self {
            root: self.root,
            timeout,
            events,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    fn marker_path(&self, pool_id: &str) -> PathBuf {
        self.root.join("markers").join(format!("{pool_id}.period"))
    }

    fn report_path(&self, pool_id: &str) -> PathBuf {
        self.root.join("reports").join(format!("{pool_id}.json"))
    }

    fn lock_path(&self, pool_id: &str) -> PathBuf {
        self.root.join("locks").join(format!("{pool_id}.lock"))
    }
}

impl StateDir {
    /// Write `bytes` to `path` through a sibling temp file and a rename, so
    /// readers never see a half-written file.
    pub(crate) async fn write_atomic(
        &self,
        path: PathBuf,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError> {
        run_with_timeout("write state file", self.timeout, move || {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let tmp = path.with_file_name(format!(".{file_name}.tmp"));
            fs::write(&tmp, &bytes).map_err(|e| StoreError::io(&tmp, e))?;
            fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))
        })
        .await
    }

    /// Contents of `path`, or `None` when it does not exist.
    pub(crate) async fn read_optional(
        &self,
        path: PathBuf,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        run_with_timeout("read state file", self.timeout, move || match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
