//! Archiver backed by `tar`.
//!
//! The archive is written under a hidden temporary name next to its final
//! destination, listed back with `tar -tzf`, and only renamed into place once
//! that listing succeeds. A failed or unverifiable archive never shows up in
//! the catalog.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::subprocess::{require_exit, run_command};
use super::CollaboratorError;

pub const DEFAULT_ARCHIVE_TIMEOUT: Duration = Duration::from_secs(4 * 3600);

/// Bound on the rename, stat and cleanup around a written archive.
const FS_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveResult {
    pub size_bytes: u64,
    /// Entries listed during verification.
    pub entries: usize,
}

#[async_trait]
pub trait Archiver: Send + Sync {
    /// Create, verify and publish the archive at `request.dest`.
    async fn create(&self, request: &ArchiveRequest) -> Result<ArchiveResult, CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct TarArchiver {
    program: PathBuf,
    timeout: Duration,
}

impl Default for TarArchiver {
    fn default() -> Self {
        Self::new("tar", DEFAULT_ARCHIVE_TIMEOUT)
    }
}

impl TarArchiver {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn write(
        &self,
        request: &ArchiveRequest,
        partial: &Path,
    ) -> Result<(), CollaboratorError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-czf").arg(partial);
        for pattern in &request.excludes {
            cmd.arg(format!("--exclude={pattern}"));
        }
        cmd.arg("-C").arg(&request.source).arg(".");

        let output = run_command("tar", &mut cmd, self.timeout).await?;
        require_exit("tar", output, &[0])?;
        Ok(())
    }

    /// Number of entries in the archive; zero entries fails verification.
    async fn verify(&self, path: &Path) -> Result<usize, CollaboratorError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-tzf").arg(path);

        let output = run_command("tar", &mut cmd, self.timeout).await?;
        let output = require_exit("tar", output, &[0]).map_err(|e| CollaboratorError::Verification {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let entries = output.stdout.lines().filter(|l| !l.trim().is_empty()).count();
        if entries == 0 {
            return Err(CollaboratorError::Verification {
                path: path.to_path_buf(),
                reason: "archive is empty".into(),
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    async fn create(&self, request: &ArchiveRequest) -> Result<ArchiveResult, CollaboratorError> {
        let partial = partial_path(&request.dest);

        let result = async {
            self.write(request, &partial).await?;
            let entries = self.verify(&partial).await?;
            let size_bytes = bounded(async {
                tokio::fs::rename(&partial, &request.dest).await?;
                Ok(tokio::fs::metadata(&request.dest).await?.len())
            })
            .await
            .map_err(|e| CollaboratorError::io(&request.dest, e))?;
            Ok::<_, CollaboratorError>(ArchiveResult { size_bytes, entries })
        }
        .await;

        if result.is_err() {
            match bounded(tokio::fs::remove_file(&partial)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        path = %partial.display(),
                        error = %e,
                        "Failed to remove partial archive"
                    );
                }
            }
        }
        result
    }
}

/// Give up on a filesystem step that hangs (unplugged or stalled volume).
async fn bounded<T>(
    step: impl std::future::Future<Output = std::io::Result<T>>,
) -> std::io::Result<T> {
    match tokio::time::timeout(FS_TIMEOUT, step).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no response after {}s", FS_TIMEOUT.as_secs()),
        )),
    }
}

/// `<dir>/.<name>.partial`, hidden from the catalog.
fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".into());
    dest.with_file_name(format!(".{name}.partial"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn partial_name_is_hidden() {
        assert_eq!(
            partial_path(Path::new("/backup/weekly-20261012T020000Z.tar.gz")),
            PathBuf::from("/backup/.weekly-20261012T020000Z.tar.gz.partial")
        );
    }

    #[tokio::test]
    async fn creates_and_verifies_archive() {
        let src = tempfile::tempdir().expect("src");
        std::fs::write(src.path().join("thesis.tex"), "\\documentclass{article}").expect("write");
        std::fs::create_dir(src.path().join(".cache")).expect("mkdir");
        std::fs::write(src.path().join(".cache/junk"), "x").expect("write");
        let out = tempfile::tempdir().expect("out");
        let dest = out.path().join("weekly-20261012T020000Z.tar.gz");

        let result = TarArchiver::default()
            .create(&ArchiveRequest {
                source: src.path().to_path_buf(),
                dest: dest.clone(),
                excludes: vec!["./.cache".into()],
            })
            .await
            .expect("archive");

        assert!(dest.exists());
        assert!(result.size_bytes > 0);
        assert!(result.entries >= 2);
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn missing_source_leaves_nothing_behind() {
        let out = tempfile::tempdir().expect("out");
        let dest = out.path().join("weekly-20261012T020000Z.tar.gz");

        let result = TarArchiver::default()
            .create(&ArchiveRequest {
                source: out.path().join("does-not-exist"),
                dest: dest.clone(),
                excludes: vec![],
            })
            .await;

        assert_matches!(result, Err(CollaboratorError::Failed { .. }));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }
}
