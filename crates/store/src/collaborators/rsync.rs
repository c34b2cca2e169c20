//! Delta copier backed by `rsync`.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::subprocess::{require_exit, run_command};
use super::CollaboratorError;

/// Default bound on one copy. A first full snapshot of a large tree can
/// take a long time.
pub const DEFAULT_COPY_TIMEOUT: Duration = Duration::from_secs(6 * 3600);

/// `rsync` exit code for "some files vanished before they could be
/// transferred". Normal on a live source tree.
const EXIT_VANISHED_SOURCE_FILES: i32 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: PathBuf,
    pub dest: PathBuf,
    /// Unchanged files are hard-linked from here instead of copied.
    pub link_dest: Option<PathBuf>,
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyResult {
    /// `None` when the tool did not report it.
    pub bytes_transferred: Option<u64>,
    pub duration_ms: u64,
}

#[async_trait]
pub trait DeltaCopier: Send + Sync {
    async fn copy(&self, request: &CopyRequest) -> Result<CopyResult, CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct RsyncCopier {
    program: PathBuf,
    timeout: Duration,
}

impl Default for RsyncCopier {
    fn default() -> Self {
        Self::new("rsync", DEFAULT_COPY_TIMEOUT)
    }
}

impl RsyncCopier {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DeltaCopier for RsyncCopier {
    async fn copy(&self, request: &CopyRequest) -> Result<CopyResult, CollaboratorError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(rsync_args(request));

        tracing::debug!(
            source = %request.source.display(),
            dest = %request.dest.display(),
            link_dest = ?request.link_dest,
            "Running rsync"
        );
        let output = run_command("rsync", &mut cmd, self.timeout).await?;
        if output.exit_code == EXIT_VANISHED_SOURCE_FILES {
            tracing::warn!(
                source = %request.source.display(),
                "Some source files vanished during copy"
            );
        }
        let output = require_exit("rsync", output, &[0, EXIT_VANISHED_SOURCE_FILES])?;

        Ok(CopyResult {
            bytes_transferred: parse_transferred_bytes(&output.stdout),
            duration_ms: output.duration_ms,
        })
    }
}

/// `-a --delete --stats [--link-dest=<base>] [--exclude=<p>]... <src>/ <dest>/`
fn rsync_args(request: &CopyRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-a".into(), "--delete".into(), "--stats".into()];
    if let Some(base) = &request.link_dest {
        let mut arg = OsString::from("--link-dest=");
        arg.push(base);
        args.push(arg);
    }
    for pattern in &request.excludes {
        args.push(format!("--exclude={pattern}").into());
    }
    args.push(with_trailing_slash(&request.source));
    args.push(with_trailing_slash(&request.dest));
    args
}

/// rsync copies the *contents* of a directory only when it ends in `/`.
fn with_trailing_slash(path: &std::path::Path) -> OsString {
    let mut s = path.as_os_str().to_os_string();
    if !s.to_string_lossy().ends_with('/') {
        s.push("/");
    }
    s
}

/// Read `Total transferred file size: 1,234 bytes` from `--stats` output.
fn parse_transferred_bytes(stdout: &str) -> Option<u64> {
    stdout.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Total transferred file size:")?;
        let digits: String = rest
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
            .filter(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    })
}
