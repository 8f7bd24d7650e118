//! Shell command execution shared by the default launcher, probe and executor.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// How much of stderr is kept for error messages.
const STDERR_TAIL: usize = 512;

/// Result of a finished shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// Trailing part of stderr, trimmed.
    pub stderr: String,
}

impl ShellOutput {
    /// One-line description of a failed command, for error reasons.
    pub fn describe_failure(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        };
        if self.stderr.is_empty() {
            status
        } else {
            format!("{status}: {}", self.stderr)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("failed to spawn `sh`: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("command did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Runs `command` through `sh -c`, killing it if it outlives `timeout`.
pub async fn run_shell(command: &str, timeout: Duration) -> Result<ShellOutput, ShellError> {
    debug!(command, "Running shell command");
    let mut child = Command::new("sh");
    child
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, child.output())
        .await
        .map_err(|_| ShellError::TimedOut(timeout))??;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let tail_start = stderr
        .char_indices()
        .rev()
        .nth(STDERR_TAIL.saturating_sub(1))
        .map(|(index, _)| index)
        .unwrap_or(0);

    Ok(ShellOutput {
        success: output.status.success(),
        code: output.status.code(),
        stderr: stderr[tail_start..].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_exit_status_and_stderr() {
        let ok = run_shell("exit 0", Duration::from_secs(5)).await.unwrap();
        assert!(ok.success);

        let failed = run_shell("echo boom >&2; exit 3", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.code, Some(3));
        assert_eq!(failed.describe_failure(), "exited with status 3: boom");
    }

    #[tokio::test]
    async fn slow_commands_time_out() {
        let err = run_shell("sleep 5", Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ShellError::TimedOut(_)));
    }
}
