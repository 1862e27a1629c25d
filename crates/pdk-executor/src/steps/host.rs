//! Host-family step executors (SPEC_FULL.md §4.3, §4.6). Each member drives
//! work through [`ProcessExecutor`] instead of a [`ContainerManager`].
//!
//! Unlike the container family, host-mode pre-expands `step.script` through
//! `pdk_config::expand` before execution (SPEC_FULL.md §9's documented
//! container/host asymmetry).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pdk_core::artifact::ArtifactEngine;
use pdk_core::cancel::CancellationToken;
use pdk_core::error::{ArtifactError, ToolNotFoundError};
use pdk_core::execution::{HostExecutionContext, StepExecutionResult};
use pdk_core::pipeline::{ArtifactOperation, IfNoFilesFound, ShellKind, Step};
use pdk_core::{Error, Result};
use pdk_process::{is_tool_available, ProcessExecutor, ProcessOptions};

use crate::guard::TempDirGuard;
use super::commands::{checkout_commands, docker_command, dotnet_command, npm_command};
use super::{classify_error, merged_env, start_result};

fn require_tool(tool: &str) -> Result<()> {
    if !is_tool_available(tool) {
        return Err(Error::ToolNotFound(ToolNotFoundError::new(tool, None)));
    }
    Ok(())
}

async fn run_sequence(
    process: &ProcessExecutor,
    ctx: &HostExecutionContext,
    step: &Step,
    commands: Vec<Vec<String>>,
    cancel: &CancellationToken,
    started_at: chrono::DateTime<Utc>,
) -> Result<StepExecutionResult> {
    let working_dir = resolve_host_working_dir(ctx, step.working_directory.as_deref());
    let env = env_for_process(ctx, step);
    let mut output = String::new();
    let mut error_output = String::new();

    for argv in commands {
        let result = process
            .run(
                ProcessOptions {
                    command: argv,
                    working_dir: working_dir.clone(),
                    env: env.clone(),
                    timeout: None,
                },
                cancel,
            )
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
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

fn resolve_host_working_dir(ctx: &HostExecutionContext, step_working_dir: Option<&str>) -> PathBuf {
    match step_working_dir {
        Some(dir) => {
            let path = std::path::Path::new(dir);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                ctx.workspace.join(path)
            }
        }
        None => ctx.resolve_working_directory(),
    }
}

fn env_for_process(ctx: &HostExecutionContext, step: &Step) -> std::collections::HashMap<String, Option<String>> {
    merged_env(&ctx.env, &step.env)
        .into_iter()
        .map(|(k, v)| (k, Some(v)))
        .collect()
}

pub struct CheckoutExecutor;

#[async_trait]
impl super::HostStepExecutor for CheckoutExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &HostExecutionContext,
        process: &ProcessExecutor,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        if let Err(err) = require_tool("git") {
            return classify_error(&step.name, started_at, err);
        }

        let workspace_has_repo = ctx.workspace.join(".git").is_dir();
        let commands = checkout_commands(step, workspace_has_repo);
        run_sequence(process, ctx, step, commands, cancel, started_at).await
    }
}

pub struct ScriptExecutor;

#[async_trait]
impl super::HostStepExecutor for ScriptExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &HostExecutionContext,
        process: &ProcessExecutor,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        let shell = step.shell.unwrap_or_else(|| match ctx.platform {
            pdk_core::execution::Platform::Windows => ShellKind::Cmd,
            _ => ShellKind::Bash,
        });
        if let Err(err) = require_tool(shell.binary_name()) {
            return classify_error(&step.name, started_at, err);
        }

        let raw_script = step.script.as_deref().unwrap_or_default();
        let resolver = pdk_config::VariableResolver::new().with_configuration(&env_strings(ctx, step));
        let expanded = match pdk_config::expander::expand(raw_script, &resolver) {
            Ok(expanded) => expanded,
            Err(err) => return classify_error(&step.name, started_at, err.into()),
        };

        let working_dir = resolve_host_working_dir(ctx, step.working_directory.as_deref());
        let temp_dir = std::env::temp_dir().join(format!("pdk-script-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&temp_dir)?;
        let guard = TempDirGuard::new(temp_dir);
        let script_path = guard.path().join(format!("step.{}", shell.script_extension()));

        let body = if shell.is_posix() {
            format!("#!{}\nset -e\n{expanded}", format!("/bin/{}", shell.binary_name()))
        } else {
            expanded
        };
        std::fs::write(&script_path, body)?;
        set_executable(&script_path)?;

        let argv = if shell.is_powershell() {
            vec![shell.binary_name().to_string(), "-File".to_string(), script_path.display().to_string()]
        } else if shell == ShellKind::Cmd {
            vec!["cmd".to_string(), "/c".to_string(), script_path.display().to_string()]
        } else {
            vec![shell.binary_name().to_string(), script_path.display().to_string()]
        };

        let env = env_for_process(ctx, step);
        let result = process
            .run(
                ProcessOptions {
                    command: argv,
                    working_dir,
                    env,
                    timeout: None,
                },
                cancel,
            )
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(start_result(&step.name, result.exit_code, result.stdout, result.stderr, started_at))
    }
}

#[cfg(unix)]
fn set_executable(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o700);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &std::path::Path) -> Result<()> {
    Ok(())
}

fn env_strings(ctx: &HostExecutionContext, step: &Step) -> std::collections::HashMap<String, String> {
    merged_env(&ctx.env, &step.env)
}

pub struct DotNetExecutor;

#[async_trait]
impl super::HostStepExecutor for DotNetExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &HostExecutionContext,
        process: &ProcessExecutor,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        if let Err(err) = require_tool("dotnet") {
            return classify_error(&step.name, started_at, err);
        }

        let working_dir = resolve_host_working_dir(ctx, step.working_directory.as_deref());
        let projects = match step.with_input("projects").filter(|p| !p.is_empty()) {
            Some(pattern) if pattern.contains('*') || pattern.contains('?') => {
                let matches = pdk_artifact::select_files(&working_dir, &[pattern.to_string()])?;
                if matches.is_empty() {
                    let err = Error::Artifact(ArtifactError::PatternEmpty(pattern.to_string()));
                    return classify_error(&step.name, started_at, err);
                }
                matches.into_iter().map(|f| f.relative_path).collect()
            }
            Some(explicit) => vec![explicit.to_string()],
            None => Vec::new(),
        };

        let argv = match dotnet_command(step, &projects) {
            Ok(argv) => argv,
            Err(err) => return classify_error(&step.name, started_at, err.into()),
        };
        run_sequence(process, ctx, step, vec![argv], cancel, started_at).await
    }
}

pub struct NpmExecutor;

#[async_trait]
impl super::HostStepExecutor for NpmExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &HostExecutionContext,
        process: &ProcessExecutor,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        for tool in ["node", "npm"] {
            if let Err(err) = require_tool(tool) {
                return classify_error(&step.name, started_at, err);
            }
        }

        let argv = match npm_command(step) {
            Ok(argv) => argv,
            Err(err) => return classify_error(&step.name, started_at, err.into()),
        };
        run_sequence(process, ctx, step, vec![argv], cancel, started_at).await
    }
}

pub struct DockerStepExecutor;

#[async_trait]
impl super::HostStepExecutor for DockerStepExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &HostExecutionContext,
        process: &ProcessExecutor,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let started_at = Utc::now();
        if let Err(err) = require_tool("docker") {
            return classify_error(&step.name, started_at, err);
        }

        let argv = match docker_command(step) {
            Ok(argv) => argv,
            Err(err) => return classify_error(&step.name, started_at, err.into()),
        };
        let working_dir = resolve_host_working_dir(ctx, step.working_directory.as_deref());
        let env = env_for_process(ctx, step);
        let result = process
            .run(
                ProcessOptions {
                    command: argv,
                    working_dir,
                    env,
                    timeout: None,
                },
                cancel,
            )
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

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
impl super::HostStepExecutor for UploadArtifactExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &HostExecutionContext,
        _process: &ProcessExecutor,
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

        let source = step
            .with_input("targetPath")
            .map(|p| resolve_host_working_dir(ctx, Some(p)))
            .unwrap_or_else(|| ctx.workspace.clone());

        let selected = pdk_artifact::select_files(&source, &definition.patterns)?;
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
impl super::HostStepExecutor for DownloadArtifactExecutor {
    async fn execute(
        &self,
        step: &Step,
        ctx: &HostExecutionContext,
        _process: &ProcessExecutor,
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

        let destination = step
            .with_input("targetPath")
            .map(|p| resolve_host_working_dir(ctx, Some(p)))
            .unwrap_or_else(|| ctx.workspace.clone());
        std::fs::create_dir_all(&destination)?;

        let manifest = self.artifacts.download(&definition.name, &destination).await?;
        Ok(start_result(
            &step.name,
            0,
            format!("downloaded {} file(s) for artifact '{}'", manifest.files.len(), definition.name),
            String::new(),
            started_at,
        ))
    }
}
