use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use pdk_core::cancel::CancellationToken;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::ProcessError;
use crate::platform::Platform;

/// Input to [`ProcessExecutor::run`].
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    /// `None` for a variable means "inherit from this process' environment".
    pub env: HashMap<String, Option<String>>,
    pub timeout: Option<Duration>,
}

/// Output of a completed (or killed) process.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Launches a single external command with streaming capture, timeout, and
/// cooperative cancellation (SPEC_FULL.md §4.1).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }

    pub fn platform(&self) -> Platform {
        Platform::current()
    }

    pub async fn run(
        &self,
        options: ProcessOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, ProcessError> {
        if options.command.is_empty() || options.command[0].trim().is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        if options.working_dir.as_os_str().is_empty() {
            return Err(ProcessError::EmptyWorkingDirectory);
        }

        tracing::debug!(command = ?options.command, working_dir = %options.working_dir.display(), "spawning process");

        let started = std::time::Instant::now();
        let mut cmd = self.build_command(&options);
        cmd.current_dir(&options.working_dir);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

        let stdout_pipe = child.stdout.take().expect("stdout was piped");
        let stderr_pipe = child.stderr.take().expect("stderr was piped");

        // Drain both streams concurrently so a full OS pipe buffer on one
        // stream can never stall the other (SPEC_FULL.md §4.1).
        let stdout_task = tokio::spawn(drain_lines(stdout_pipe));
        let stderr_task = tokio::spawn(drain_lines(stderr_pipe));

        let wait_fut = child.wait();
        tokio::pin!(wait_fut);

        let outcome = if let Some(timeout) = options.timeout {
            tokio::select! {
                status = &mut wait_fut => Outcome::Exited(status),
                _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
                _ = cancel.cancelled() => Outcome::Cancelled,
            }
        } else {
            tokio::select! {
                status = &mut wait_fut => Outcome::Exited(status),
                _ = cancel.cancelled() => Outcome::Cancelled,
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let duration = started.elapsed();

        match outcome {
            Outcome::Exited(status) => {
                let status = status.map_err(ProcessError::Io)?;
                Ok(ProcessResult {
                    exit_code: status.code().unwrap_or(-1),
                    stdout,
                    stderr,
                    duration,
                })
            }
            Outcome::TimedOut => {
                let _ = child.start_kill();
                Ok(ProcessResult {
                    exit_code: -1,
                    stdout,
                    stderr: format!("{stderr}\nprocess timed out after {timeout:?}", timeout = options.timeout),
                    duration,
                })
            }
            Outcome::Cancelled => {
                let _ = child.start_kill();
                Ok(ProcessResult {
                    exit_code: -2,
                    stdout,
                    stderr: format!("{stderr}\nprocess cancelled"),
                    duration,
                })
            }
        }
    }

    fn build_command(&self, options: &ProcessOptions) -> Command {
        let platform = Platform::current();
        let mut parts = options.command.clone();

        if platform == Platform::Windows && !parts[0].eq_ignore_ascii_case("cmd") {
            let joined = shell_join(&parts);
            parts = vec!["cmd".to_string(), "/c".to_string(), joined];
        }

        let mut cmd = Command::new(&parts[0]);
        cmd.args(&parts[1..]);

        for (key, value) in &options.env {
            match value {
                Some(v) => {
                    cmd.env(key, v);
                }
                None => {
                    // `None` means inherit: the child already inherits the
                    // parent's environment unless we remove it explicitly,
                    // so there is nothing to do here.
                }
            }
        }

        cmd
    }
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| {
            if p.contains(' ') {
                format!("\"{p}\"")
            } else {
                p.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn drain_lines<R>(reader: R) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut out = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(command: &[&str]) -> ProcessOptions {
        ProcessOptions {
            command: command.iter().map(|s| s.to_string()).collect(),
            working_dir: std::env::temp_dir(),
            env: HashMap::new(),
            timeout: None,
        }
    }

    #[tokio::test]
    async fn rejects_empty_command() {
        let executor = ProcessExecutor::new();
        let result = executor
            .run(opts(&[]), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ProcessError::EmptyCommand)));
    }

    #[tokio::test]
    async fn runs_echo_and_captures_stdout() {
        let executor = ProcessExecutor::new();
        let result = executor
            .run(opts(&["echo", "hello world"]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello world"));
    }

    #[tokio::test]
    async fn cancellation_kills_process_and_reports_exit_code_minus_two() {
        let executor = ProcessExecutor::new();
        let token = CancellationToken::new();
        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token_clone.cancel();
        });
        let result = executor
            .run(opts(&["sleep", "5"]), &token)
            .await
            .unwrap();
        assert_eq!(result.exit_code, -2);
        assert!(result.stderr.contains("cancelled"));
    }

    #[tokio::test]
    async fn timeout_reports_exit_code_minus_one() {
        let executor = ProcessExecutor::new();
        let mut options = opts(&["sleep", "5"]);
        options.timeout = Some(Duration::from_millis(20));
        let result = executor
            .run(options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.exit_code, -1);
        assert!(result.stderr.contains("timed out"));
    }
}
