//! Shared subprocess execution for the collaborators.
//!
//! The caller builds the [`Command`]; [`run_command`] owns spawning, output
//! capture and the timeout.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::CollaboratorError;

/// Maximum stdout or stderr captured per stream (1 MiB). `rsync --stats`
/// and `tar -t` on a large tree stay well under this; anything beyond is
/// dropped.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Spawn `cmd`, capture stdout/stderr and enforce `timeout`.
///
/// A non-zero exit is *not* an error here; callers decide which codes are
/// acceptable.
pub async fn run_command(
    program: &str,
    cmd: &mut Command,
    timeout: Duration,
) -> Result<CommandOutput, CollaboratorError> {
    // `kill_on_drop(true)` kills the child when it is dropped on timeout.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| CollaboratorError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                duration_ms: start.elapsed().as_millis() as u64,
            })
        }
        Ok(Err(source)) => Err(CollaboratorError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_elapsed) => Err(CollaboratorError::Timeout {
            program: program.to_string(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        }),
    }
}

/// Turn a non-accepted exit code into [`CollaboratorError::Failed`].
pub(crate) fn require_exit(
    program: &str,
    output: CommandOutput,
    accepted: &[i32],
) -> Result<CommandOutput, CollaboratorError> {
    if accepted.contains(&output.exit_code) {
        Ok(output)
    } else {
        Err(CollaboratorError::Failed {
            program: program.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = run_command("sh", &mut cmd, Duration::from_secs(10))
            .await
            .expect("run");
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.exit_code, 3);

        let err = require_exit("sh", output, &[0]).unwrap_err();
        assert_matches!(err, CollaboratorError::Failed { exit_code: 3, .. });
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let result = run_command("sleep", &mut cmd, Duration::from_millis(100)).await;
        assert_matches!(result, Err(CollaboratorError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let mut cmd = Command::new("tierkeep-definitely-not-installed");
        let result = run_command("missing", &mut cmd, Duration::from_secs(1)).await;
        assert_matches!(result, Err(CollaboratorError::Spawn { .. }));
    }
}
