//! Container-family step executors (SPEC_FULL.md §4.3). Each member drives
//! work through [`ContainerManager::execute_command`] and, for artifact
//! steps, [`ContainerManager::get_archive_from_container`]/
//! `put_archive_to_container`.
//!
//! Variable expansion inside container scripts is deferred to the
//! container's own shell (SPEC_FULL.md §9): `step.script` is written into
//! the here-doc verbatim, unlike the host family which pre-expands it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use pdk_core::artifact::ArtifactEngine;
use pdk_core::cancel::CancellationToken;
use pdk_core::error::{ArtifactError, ToolNotFoundError};
use pdk_core::execution::{ContainerManager, ExecutionContext, StepExecutionResult};
use pdk_core::pipeline::{ArtifactOperation, IfNoFilesFound, ShellKind, Step};
use pdk_core::{Error, Result};

use crate::guard::TempDirGuard;
use super::commands::{checkout_commands, docker_command, dotnet_command, npm_command};
use super::{classify_error, heredoc_write, merged_env, random_script_path, resolve_container_working_dir, start_result};

async fn tool_available(container: &dyn ContainerManager, container_id: &str, tool: &str) -> Result<bool> {
    let result = container
        .execute_command(container_id, &["which".to_string(), tool.to_string()], None, None)
        .await?;
    Ok(result.exit_code == 0)
}

async fn require_tool(container: &dyn ContainerManager, container_id: &str, tool: &str) -> Result<()> {
    if !tool_available(container, container_id, tool).await? {
        return Err(Error::ToolNotFound(ToolNotFoundError::new(tool, None)));
    }
    Ok(())
}

async fn run_sequence(
    container: &dyn ContainerManager,
    ctx: &ExecutionContext,
    step: &Step,
    commands: Vec<Vec<String>>,
    started_at: chrono::DateTime<Utc>,
) -> Result<StepExecutionResult> {
    let working_dir = resolve_container_working_dir(ctx, step.working_directory.as_deref());
    let env = merged_env(&ctx.env, &step.env);
    let mut output = String::new();
    let mut error_output = String::new();

    for argv in commands {
        let result = container
            .execute_command(&ctx.container_id, &argv, Some(&working_dir), Some(&env))
            .await?;
        append(&mut output, &result.stdout);
        append(&mut error_output, &result.stderr);
        if result.exit_code != 0 {
            return Ok(start_result(&step.name, result.exit_code, output, error_output, started_at));
        }
    }
    Ok(start_result(&step.name, 0, output, error_output, started_at))
}

fn append(buf: &mut String, piece: &str) {
    if piece.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(piece);
}

pub struct CheckoutExecutor;

#[async_trait]
impl super::ContainerStepExecutor for CheckoutExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        container: &dyn ContainerManager,
        _cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        if let Err(err) = require_tool(container, &ctx.container_id, "git").await {
            return classify_error(&step.name, started_at, err);
        }

        let git_dir = format!("{}/.git", ctx.container_workspace.trim_end_matches('/'));
        let probe = container
            .execute_command(&ctx.container_id, &["test".to_string(), "-d".to_string(), git_dir], None, None)
            .await?;
        let workspace_has_repo = probe.exit_code == 0;

        let commands = checkout_commands(step, workspace_has_repo);
        run_sequence(container, ctx, step, commands, started_at).await
    }
}

pub struct ScriptExecutor;

#[async_trait]
impl super::ContainerStepExecutor for ScriptExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        container: &dyn ContainerManager,
        _cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        let shell = step.shell.unwrap_or(ShellKind::Bash);
        let script = step.script.as_deref().unwrap_or_default();

        if !(shell.is_posix() || shell.is_powershell()) {
            let err = Error::InvalidInput(format!(
                "script step targets container but requested shell {shell:?}; use bash, sh, pwsh, or powershell"
            ));
            return classify_error(&step.name, started_at, err);
        }
        if let Err(err) = require_tool(container, &ctx.container_id, shell.binary_name()).await {
            return classify_error(&step.name, started_at, err);
        }

        let path = random_script_path(shell.script_extension());
        let write_command = heredoc_write(&path, script);
        let working_dir = resolve_container_working_dir(ctx, step.working_directory.as_deref());
        let env = merged_env(&ctx.env, &step.env);

        let write_result = container
            .execute_command(&ctx.container_id, &["sh".to_string(), "-c".to_string(), write_command], Some(&working_dir), Some(&env))
            .await?;
        if write_result.exit_code != 0 {
            return Ok(start_result(&step.name, write_result.exit_code, write_result.stdout, write_result.stderr, started_at));
        }

        let run_argv = if shell.is_powershell() {
            vec![shell.binary_name().to_string(), "-File".to_string(), path.clone()]
        } else {
            container
                .execute_command(&ctx.container_id, &["chmod".to_string(), "+x".to_string(), path.clone()], Some(&working_dir), None)
                .await?;
            vec![shell.binary_name().to_string(), path.clone()]
        };

        let result = container
            .execute_command(&ctx.container_id, &run_argv, Some(&working_dir), Some(&env))
            .await?;

        let _ = container
            .execute_command(&ctx.container_id, &["rm".to_string(), "-f".to_string(), path], None, None)
            .await;

        Ok(start_result(&step.name, result.exit_code, result.stdout, result.stderr, started_at))
    }
}

pub struct DotNetExecutor;

#[async_trait]
impl super::ContainerStepExecutor for DotNetExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        container: &dyn ContainerManager,
        _cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        if let Err(err) = require_tool(container, &ctx.container_id, "dotnet").await {
            return classify_error(&step.name, started_at, err);
        }

        let working_dir = resolve_container_working_dir(ctx, step.working_directory.as_deref());
        let projects = match step.with_input("projects").filter(|p| !p.is_empty()) {
            Some(pattern) if pattern.contains('*') || pattern.contains('?') => {
                let find = container
                    .execute_command(
                        &ctx.container_id,
                        &["find".to_string(), ".".to_string(), "-name".to_string(), pattern.to_string(), "-type".to_string(), "f".to_string()],
                        Some(&working_dir),
                        None,
                    )
                    .await?;
                let expanded: Vec<String> = find.stdout.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect();
                if expanded.is_empty() {
                    let err = Error::Artifact(ArtifactError::PatternEmpty(pattern.to_string()));
                    return classify_error(&step.name, started_at, err);
                }
                expanded
            }
            Some(explicit) => vec![explicit.to_string()],
            None => Vec::new(),
        };

        let argv = match dotnet_command(step, &projects) {
            Ok(argv) => argv,
            Err(err) => return classify_error(&step.name, started_at, err.into()),
        };
        run_sequence(container, ctx, step, vec![argv], started_at).await
    }
}

pub struct NpmExecutor;

#[async_trait]
impl super::ContainerStepExecutor for NpmExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        container: &dyn ContainerManager,
        _cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        for tool in ["node", "npm"] {
            if let Err(err) = require_tool(container, &ctx.container_id, tool).await {
                return classify_error(&step.name, started_at, err);
            }
        }

        let argv = match npm_command(step) {
            Ok(argv) => argv,
            Err(err) => return classify_error(&step.name, started_at, err.into()),
        };
        run_sequence(container, ctx, step, vec![argv], started_at).await
    }
}

pub struct DockerStepExecutor;

#[async_trait]
impl super::ContainerStepExecutor for DockerStepExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        container: &dyn ContainerManager,
        _cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        if let Err(err) = require_tool(container, &ctx.container_id, "docker").await {
            return classify_error(&step.name, started_at, err);
        }

        let argv = match docker_command(step) {
            Ok(argv) => argv,
            Err(err) => return classify_error(&step.name, started_at, err.into()),
        };
        let working_dir = resolve_container_working_dir(ctx, step.working_directory.as_deref());
        let env = merged_env(&ctx.env, &step.env);
        let result = container
            .execute_command(&ctx.container_id, &argv, Some(&working_dir), Some(&env))
            .await?;

        // Docker writes progress to stderr even on success; merge into the
        // displayed output while keeping the raw stderr field (SPEC_FULL.md §9).
        let mut output = result.stdout;
        if !result.stderr.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&result.stderr);
        }
        Ok(start_result(&step.name, result.exit_code, output, result.stderr, started_at))
    }
}

pub struct UploadArtifactExecutor {
    artifacts: Arc<dyn ArtifactEngine>,
}

impl UploadArtifactExecutor {
    pub fn new(artifacts: Arc<dyn ArtifactEngine>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl super::ContainerStepExecutor for UploadArtifactExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        container: &dyn ContainerManager,
        _cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        let definition = match step.artifact.as_ref() {
            Some(definition) => definition,
            None => {
                let err = Error::InvalidInput("uploadartifact step is missing its artifact definition".to_string());
                return classify_error(&step.name, started_at, err);
            }
        };
        if definition.operation != ArtifactOperation::Upload {
            let err = Error::InvalidInput("uploadartifact step's artifact.operation must be 'upload'".to_string());
            return classify_error(&step.name, started_at, err);
        }

        let source_path = step
            .with_input("targetPath")
            .map(|p| resolve_container_working_dir(ctx, Some(p)))
            .unwrap_or_else(|| ctx.container_workspace.clone());

        let temp_dir = std::env::temp_dir().join(format!("pdk-upload-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&temp_dir)?;
        let guard = TempDirGuard::new(temp_dir.clone());

        let mut stream = container.get_archive_from_container(&ctx.container_id, &source_path).await?;
        let mut archive_bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            archive_bytes.extend_from_slice(&chunk?);
        }
        tar::Archive::new(std::io::Cursor::new(archive_bytes)).unpack(guard.path())?;

        let selected = pdk_artifact::select_files(guard.path(), &definition.patterns)?;
        if selected.is_empty() {
            return match definition.options.if_no_files_found {
                IfNoFilesFound::Error => {
                    let err = Error::Artifact(ArtifactError::PatternEmpty(definition.patterns.join(",")));
                    classify_error(&step.name, started_at, err)
                }
                IfNoFilesFound::Warn => Ok(start_result(
                    &step.name,
                    0,
                    format!("warning: no files matched patterns {:?}", definition.patterns),
                    String::new(),
                    started_at,
                )),
                IfNoFilesFound::Ignore => Ok(start_result(&step.name, 0, String::new(), String::new(), started_at)),
            };
        }

        let result = self.artifacts.upload(&definition.name, &selected, &definition.options).await?;
        Ok(start_result(
            &step.name,
            0,
            format!("uploaded {} file(s) to {}", result.file_count, result.storage_path.display()),
            String::new(),
            started_at,
        ))
    }
}

pub struct DownloadArtifactExecutor {
    artifacts: Arc<dyn ArtifactEngine>,
}

impl DownloadArtifactExecutor {
    pub fn new(artifacts: Arc<dyn ArtifactEngine>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl super::ContainerStepExecutor for DownloadArtifactExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        container: &dyn ContainerManager,
        _cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        let definition = match step.artifact.as_ref() {
            Some(definition) => definition,
            None => {
                let err = Error::InvalidInput("downloadartifact step is missing its artifact definition".to_string());
                return classify_error(&step.name, started_at, err);
            }
        };
        if definition.operation != ArtifactOperation::Download {
            let err = Error::InvalidInput("downloadartifact step's artifact.operation must be 'download'".to_string());
            return classify_error(&step.name, started_at, err);
        }

        if !self.artifacts.exists(&definition.name).await? {
            let err = Error::Artifact(ArtifactError::NotFound(format!(
                "{} (did you upload it in an earlier step?)",
                definition.name
            )));
            return classify_error(&step.name, started_at, err);
        }

        let temp_dir = std::env::temp_dir().join(format!("pdk-download-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&temp_dir)?;
        let guard = TempDirGuard::new(temp_dir.clone());

        let manifest = self.artifacts.download(&definition.name, guard.path()).await?;

        let target_path = step
            .with_input("targetPath")
            .map(|p| resolve_container_working_dir(ctx, Some(p)))
            .unwrap_or_else(|| ctx.container_workspace.clone());

        container
            .execute_command(&ctx.container_id, &["mkdir".to_string(), "-p".to_string(), target_path.clone()], None, None)
            .await?;

        let tar_bytes = tar_directory(guard.path())?;
        container
            .put_archive_to_container(&ctx.container_id, &target_path, Bytes::from(tar_bytes))
            .await?;

        Ok(start_result(
            &step.name,
            0,
            format!("downloaded {} file(s) for artifact '{}'", manifest.files.len(), definition.name),
            String::new(),
            started_at,
        ))
    }
}

pub(crate) fn tar_directory(dir: &Path) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", dir)?;
    builder.into_inner().map_err(Error::Io)
}
