use std::path::PathBuf;

/// Errors from measuring, listing, or mutating durable storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Pool '{pool}' is unavailable: {reason}")]
    PoolUnavailable { pool: String, reason: String },

    #[error("Measuring pool '{pool}' failed: {reason}")]
    MeasurementFailed { pool: String, reason: String },

    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Lock for pool '{pool}' is held by another run")]
    LockTimeout { pool: String },

    #[error("Invalid unit id '{0}'")]
    InvalidUnitId(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
