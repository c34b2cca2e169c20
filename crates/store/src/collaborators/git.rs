//! Pending-changes probe for the working copies listed in the config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::subprocess::{require_exit, run_command};
use super::CollaboratorError;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait RepoProbe: Send + Sync {
    /// Whether `repo` has uncommitted or unpushed changes.
    async fn has_pending(&self, repo: &Path) -> Result<bool, CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct GitProbe {
    program: PathBuf,
    timeout: Duration,
}

impl Default for GitProbe {
    fn default() -> Self {
        Self::new("git", DEFAULT_PROBE_TIMEOUT)
    }
}

impl GitProbe {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl RepoProbe for GitProbe {
    async fn has_pending(&self, repo: &Path) -> Result<bool, CollaboratorError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-C")
            .arg(repo)
            .args(["status", "--porcelain", "--branch"]);
        let output = run_command("git", &mut cmd, self.timeout).await?;
        let output = require_exit("git", output, &[0])?;
        Ok(porcelain_has_pending(&output.stdout))
    }
}

/// Any file entry, or a branch header reporting local commits ahead of
/// upstream.
fn porcelain_has_pending(stdout: &str) -> bool {
    stdout.lines().any(|line| match line.strip_prefix("## ") {
        Some(branch) => branch.contains("[ahead "),
        None => !line.trim().is_empty(),
    })
}

/// Number of repositories with pending changes. Repositories that cannot be
/// probed are logged and not counted.
pub async fn count_pending(probe: &dyn RepoProbe, repos: &[PathBuf]) -> usize {
    let mut pending = 0;
    for repo in repos {
        match probe.has_pending(repo).await {
            Ok(true) => {
                tracing::info!(repo = %repo.display(), "Repository has pending changes");
                pending += 1;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(repo = %repo.display(), error = %e, "Could not probe repository");
            }
        }
    }
    pending
}
