//! External tools the engine drives: the delta copier, the archiver and the
//! VCS probe. Each sits behind a narrow trait so the engine can be tested
//! without spawning anything.

pub mod git;
pub mod rsync;
pub mod subprocess;
pub mod tar;

use std::path::PathBuf;

pub use subprocess::{run_command, CommandOutput};

/// Errors from invoking an external tool.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {elapsed_ms}ms")]
    Timeout { program: String, elapsed_ms: u64 },

    #[error("{program} exited with code {exit_code}: {stderr}")]
    Failed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Verification of {} failed: {reason}", path.display())]
    Verification { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CollaboratorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
