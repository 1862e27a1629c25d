//! Execution contexts and results (SPEC_FULL.md §3), and the container
//! manager contract (SPEC_FULL.md §4.2).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::Result;

/// Metadata about the job a step is running within, available to every
/// executor regardless of family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_name: String,
    pub job_id: String,
    pub runner_label: String,
}

/// Execution context for a container-targeted step executor.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub container_id: String,
    pub host_workspace: PathBuf,
    /// In-container workspace path. Defaults to `/workspace`.
    pub container_workspace: String,
    /// Working directory relative to the container workspace. Defaults to `.`.
    pub working_directory: String,
    pub env: HashMap<String, String>,
    pub job: JobMetadata,
}

/// Host-targeted platform tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    Unknown,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Unknown
        }
    }
}

/// Execution context for a host-targeted step executor.
#[derive(Debug, Clone)]
pub struct HostExecutionContext {
    pub workspace: PathBuf,
    pub platform: Platform,
    pub working_directory: String,
    pub env: HashMap<String, String>,
    pub job: JobMetadata,
}

impl HostExecutionContext {
    /// Absolute stays absolute; relative joins onto the workspace and
    /// normalizes. `..` traversal checks are a validator's concern, not
    /// the executor's (SPEC_FULL.md §9).
    pub fn resolve_working_directory(&self) -> PathBuf {
        let dir = std::path::Path::new(&self.working_directory);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.workspace.join(dir)
        }
    }
}

/// Normalize a container path: collapse `//` to `/` and drop a leading `./`.
/// Container paths are always treated as POSIX regardless of host OS.
pub fn normalize_container_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut last_was_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        normalized.push(ch);
    }
    normalized
        .strip_prefix("./")
        .map(|s| s.to_string())
        .unwrap_or(normalized)
}

/// Result of running a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub step_name: String,
    pub success: bool,
    pub exit_code: i32,
    /// Already passed through the masker.
    pub output: String,
    /// Already passed through the masker.
    pub error_output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepExecutionResult {
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub const EXIT_INTERNAL_FAILURE: i32 = -1;
    pub const EXIT_CANCELLED: i32 = -2;
    /// Matches the process-level "unsupported/missing tool" exit code
    /// (SPEC_FULL.md §6) so a missing-tool step failure surfaces the same
    /// code at both the step and process level.
    pub const EXIT_TOOL_NOT_FOUND: i32 = 2;
}

/// Result of running every step of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionResult {
    pub job_name: String,
    /// True iff every non-`continue_on_error` step succeeded.
    pub success: bool,
    pub steps: Vec<StepExecutionResult>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobExecutionResult {
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// Daemon availability error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaemonErrorKind {
    NotInstalled,
    NotRunning,
    PermissionDenied,
    Other,
}

/// Result of probing whether the container daemon is reachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub available: bool,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub error_kind: Option<DaemonErrorKind>,
}

/// Options for creating a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateContainerOptions {
    /// Host path -> in-container path, read-write.
    pub mounts: Vec<(PathBuf, String)>,
    pub env: HashMap<String, String>,
    pub memory_limit_mb: Option<u64>,
    pub cpu_limit: Option<f64>,
    pub network_mode: Option<String>,
}

/// Result of running a command inside a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// One line of image-pull progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullProgress {
    pub message: String,
}

/// Abstraction over a container runtime (SPEC_FULL.md §4.2). Concrete
/// implementation lives in `pdk-executor` (bollard-backed).
#[async_trait]
pub trait ContainerManager: Send + Sync {
    async fn is_daemon_available(&self) -> DaemonStatus;

    async fn pull_image_if_needed(
        &self,
        image: &str,
        progress: Option<tokio::sync::mpsc::Sender<PullProgress>>,
    ) -> Result<()>;

    async fn create_container(
        &self,
        image: &str,
        options: CreateContainerOptions,
    ) -> Result<String>;

    async fn execute_command(
        &self,
        container_id: &str,
        command: &[String],
        working_dir: Option<&str>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<ContainerExecResult>;

    async fn get_archive_from_container(
        &self,
        container_id: &str,
        path: &str,
    ) -> Result<BoxStream<'static, std::result::Result<Bytes, std::io::Error>>>;

    async fn put_archive_to_container(
        &self,
        container_id: &str,
        target_path: &str,
        tar_stream: Bytes,
    ) -> Result<()>;

    /// Idempotent: removing an already-removed container is not an error.
    async fn remove_container(&self, container_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_double_slashes_and_leading_dot_slash() {
        assert_eq!(normalize_container_path("./a//b///c"), "a/b/c");
        assert_eq!(normalize_container_path("/workspace//sub"), "/workspace/sub");
    }

    #[test]
    fn host_context_resolves_relative_against_workspace() {
        let ctx = HostExecutionContext {
            workspace: PathBuf::from("/home/user/work"),
            platform: Platform::Linux,
            working_directory: "sub/dir".to_string(),
            env: HashMap::new(),
            job: JobMetadata {
                job_name: "build".into(),
                job_id: "build".into(),
                runner_label: "ubuntu-latest".into(),
            },
        };
        assert_eq!(
            ctx.resolve_working_directory(),
            PathBuf::from("/home/user/work/sub/dir")
        );
    }

    #[test]
    fn host_context_keeps_absolute_working_directory() {
        let ctx = HostExecutionContext {
            workspace: PathBuf::from("/home/user/work"),
            platform: Platform::Linux,
            working_directory: "/etc".to_string(),
            env: HashMap::new(),
            job: JobMetadata {
                job_name: "build".into(),
                job_id: "build".into(),
                runner_label: "ubuntu-latest".into(),
            },
        };
        assert_eq!(ctx.resolve_working_directory(), PathBuf::from("/etc"));
    }
}
