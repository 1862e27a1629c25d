//! Step-executor strategy layer (SPEC_FULL.md §4.3): one trait per family
//! (container, host), a factory per family keyed by the same `StepKind`,
//! and shared pure command-building logic in [`commands`].

pub mod commands;
pub mod container;
pub mod host;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pdk_core::artifact::ArtifactEngine;
use pdk_core::cancel::CancellationToken;
use pdk_core::execution::{ContainerManager, ExecutionContext, HostExecutionContext, StepExecutionResult};
use pdk_core::pipeline::{Step, StepKind};
use pdk_core::{Error, Result};
use pdk_process::ProcessExecutor;

/// A step executor that drives work through a [`ContainerManager`].
#[async_trait]
pub trait ContainerStepExecutor: Send + Sync {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        container: &dyn ContainerManager,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult>;
}

/// A step executor that drives work through a [`ProcessExecutor`] on the
/// host. Shares the same `StepKind` tag set as [`ContainerStepExecutor`]
/// but never talks to a container daemon (SPEC_FULL.md §4.3 "host-family
/// note").
#[async_trait]
pub trait HostStepExecutor: Send + Sync {
    async fn execute(
        &self,
        step: &Step,
        ctx: &HostExecutionContext,
        process: &ProcessExecutor,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult>;
}

pub struct ContainerStepFactory;

impl ContainerStepFactory {
    pub fn resolve(
        kind: StepKind,
        artifacts: Arc<dyn ArtifactEngine>,
    ) -> Option<Arc<dyn ContainerStepExecutor>> {
        match kind {
            StepKind::Checkout => Some(Arc::new(container::CheckoutExecutor)),
            StepKind::Script => Some(Arc::new(container::ScriptExecutor)),
            StepKind::DotNet => Some(Arc::new(container::DotNetExecutor)),
            StepKind::Npm => Some(Arc::new(container::NpmExecutor)),
            StepKind::Docker => Some(Arc::new(container::DockerStepExecutor)),
            StepKind::UploadArtifact => Some(Arc::new(container::UploadArtifactExecutor::new(artifacts))),
            StepKind::DownloadArtifact => Some(Arc::new(container::DownloadArtifactExecutor::new(artifacts))),
        }
    }
}

pub struct HostStepFactory;

impl HostStepFactory {
    pub fn resolve(kind: StepKind, artifacts: Arc<dyn ArtifactEngine>) -> Option<Arc<dyn HostStepExecutor>> {
        match kind {
            StepKind::Checkout => Some(Arc::new(host::CheckoutExecutor)),
            StepKind::Script => Some(Arc::new(host::ScriptExecutor)),
            StepKind::DotNet => Some(Arc::new(host::DotNetExecutor)),
            StepKind::Npm => Some(Arc::new(host::NpmExecutor)),
            StepKind::Docker => Some(Arc::new(host::DockerStepExecutor)),
            StepKind::UploadArtifact => Some(Arc::new(host::UploadArtifactExecutor::new(artifacts))),
            StepKind::DownloadArtifact => Some(Arc::new(host::DownloadArtifactExecutor::new(artifacts))),
        }
    }
}

pub(crate) fn unsupported_step_kind(kind: StepKind) -> Error {
    Error::UnsupportedStepKind(format!("{kind:?}"))
}

/// Turns a "known" step-level error kind into a failed [`StepExecutionResult`]
/// instead of letting it propagate as `Err` (SPEC_FULL.md §7: known error
/// kinds are caught and reported through `continueOnError`, not bubbled
/// past the step). Anything else passes back through unchanged so the job
/// runner can treat it as the genuinely exceptional cross-job-boundary case.
pub(crate) fn classify_error(step_name: &str, started_at: chrono::DateTime<Utc>, err: Error) -> Result<StepExecutionResult> {
    let exit_code = match &err {
        Error::ToolNotFound(_) => StepExecutionResult::EXIT_TOOL_NOT_FOUND,
        Error::Artifact(_) | Error::InvalidInput(_) | Error::Variable(_) => StepExecutionResult::EXIT_INTERNAL_FAILURE,
        _ => return Err(err),
    };
    Ok(StepExecutionResult {
        step_name: step_name.to_string(),
        success: false,
        exit_code,
        output: String::new(),
        error_output: err.to_string(),
        started_at,
        finished_at: Utc::now(),
    })
}

/// Last line of defense at the job-runner boundary: a step executor call
/// that still returned `Err` (container I/O, process spawn failure, an
/// outright cancellation) is turned into a failed result here so
/// `continueOnError` is always consulted before the job aborts (SPEC_FULL.md
/// §7's "propagates to the job runner which aborts the job (except when
/// continueOnError is set)").
pub(crate) fn job_boundary_error_result(step_name: &str, err: Error) -> StepExecutionResult {
    let exit_code = if matches!(err, Error::Cancelled) {
        StepExecutionResult::EXIT_CANCELLED
    } else {
        StepExecutionResult::EXIT_INTERNAL_FAILURE
    };
    StepExecutionResult {
        step_name: step_name.to_string(),
        success: false,
        exit_code,
        output: String::new(),
        error_output: err.to_string(),
        started_at: Utc::now(),
        finished_at: Utc::now(),
    }
}

pub(crate) fn start_result(step_name: &str, exit_code: i32, output: String, error_output: String, started_at: chrono::DateTime<Utc>) -> StepExecutionResult {
    StepExecutionResult {
        step_name: step_name.to_string(),
        success: exit_code == 0,
        exit_code,
        output,
        error_output,
        started_at,
        finished_at: Utc::now(),
    }
}

/// Container paths are always POSIX; joins and normalizes per SPEC_FULL.md
/// §4.3/§9.
pub(crate) fn resolve_container_working_dir(ctx: &ExecutionContext, step_working_dir: Option<&str>) -> String {
    let base = step_working_dir.unwrap_or(&ctx.working_directory);
    let joined = if base.starts_with('/') {
        base.to_string()
    } else {
        format!("{}/{}", ctx.container_workspace.trim_end_matches('/'), base)
    };
    pdk_core::execution::normalize_container_path(&joined)
}

/// Merges job-level and step-level environments; the step wins on
/// conflicts (SPEC_FULL.md §4.5 step 4).
pub(crate) fn merged_env(
    job_env: &std::collections::HashMap<String, String>,
    step_env: &std::collections::HashMap<String, String>,
) -> std::collections::HashMap<String, String> {
    let mut merged = job_env.clone();
    merged.extend(step_env.clone());
    merged
}

/// Builds the single-quoted here-doc write used to deliver a script into a
/// target shell without triggering variable expansion at write time
/// (SPEC_FULL.md §9, "load-bearing, reproduce it exactly").
pub(crate) fn heredoc_write(path: &str, script: &str) -> String {
    const DELIMITER: &str = "PDK_SCRIPT_EOF";
    format!("cat > {path} <<'{DELIMITER}'\n{script}\n{DELIMITER}\n")
}

pub(crate) fn random_script_path(extension: &str) -> String {
    format!("/tmp/pdk-script-{}.{}", uuid::Uuid::new_v4(), extension)
}
