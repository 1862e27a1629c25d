//! Job Runner, Container mode (SPEC_FULL.md §4.5): maps a runner label to a
//! base image, pulls it if missing, creates a container with the workspace
//! mounted, then drives each step through the step-executor strategy layer.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use pdk_core::artifact::ArtifactEngine;
use pdk_core::cancel::CancellationToken;
use pdk_core::execution::{
    ContainerManager, CreateContainerOptions, ExecutionContext, JobExecutionResult, JobMetadata,
};
use pdk_core::pipeline::{Job, RunnerLabel};
use pdk_core::secret::Masker;
use pdk_core::{Error, Result};
use pdk_config::system::ExecutorConfig;

use crate::guard::ContainerGuard;
use crate::steps::{job_boundary_error_result, unsupported_step_kind, ContainerStepFactory};

/// Resolves a job's declared runner label to a base image, consulting the
/// config's image table before falling back to the well-known defaults
/// (SPEC_FULL.md §4.5 step 1).
pub fn resolve_image(label: &RunnerLabel, images: &HashMap<String, String>) -> Result<String> {
    let key = match label {
        RunnerLabel::UbuntuLatest => "ubuntu-latest",
        RunnerLabel::WindowsLatest => "windows-latest",
        RunnerLabel::SelfHosted => "self-hosted",
        RunnerLabel::CustomImage(image) => return Ok(image.clone()),
    };
    if let Some(image) = images.get(key) {
        return Ok(image.clone());
    }
    match label {
        RunnerLabel::UbuntuLatest => Ok("buildpack-deps:jammy".to_string()),
        RunnerLabel::WindowsLatest => Ok("mcr.microsoft.com/windows/servercore:ltsc2022".to_string()),
        RunnerLabel::SelfHosted => Err(Error::InvalidInput(
            "runner label 'self-hosted' has no configured image".to_string(),
        )),
        RunnerLabel::CustomImage(_) => unreachable!(),
    }
}

/// Drives a single job to completion inside an ephemeral container.
pub struct ContainerJobRunner {
    container: Arc<dyn ContainerManager>,
    artifacts: Arc<dyn ArtifactEngine>,
    masker: Arc<dyn Masker>,
    executor_config: ExecutorConfig,
}

impl ContainerJobRunner {
    pub fn new(
        container: Arc<dyn ContainerManager>,
        artifacts: Arc<dyn ArtifactEngine>,
        masker: Arc<dyn Masker>,
        executor_config: ExecutorConfig,
    ) -> Self {
        Self {
            container,
            artifacts,
            masker,
            executor_config,
        }
    }

    pub async fn run(
        &self,
        job: &Job,
        job_id: &str,
        host_workspace: &Path,
        cancel: &CancellationToken,
    ) -> Result<JobExecutionResult> {
        let started_at = Utc::now();
        let image = resolve_image(&job.runner_label, &self.executor_config.images)?;

        self.container.pull_image_if_needed(&image, None).await?;

        let container_workspace = "/workspace".to_string();
        let mut env = job.env.clone();
        env.insert("WORKSPACE".to_string(), container_workspace.clone());
        env.insert("JOB_NAME".to_string(), job.name.clone());
        env.insert("RUNNER".to_string(), format!("{:?}", job.runner_label));

        let create_options = CreateContainerOptions {
            mounts: vec![(host_workspace.to_path_buf(), container_workspace.clone())],
            env: env.clone(),
            memory_limit_mb: self.executor_config.memory_limit_mb,
            cpu_limit: self.executor_config.cpu_limit,
            network_mode: if self.executor_config.network_mode.is_empty() {
                None
            } else {
                Some(self.executor_config.network_mode.clone())
            },
        };

        let container_id = self.container.create_container(&image, create_options).await?;
        let guard = ContainerGuard::new(container_id.clone(), self.container.clone());

        let job_meta = JobMetadata {
            job_name: job.name.clone(),
            job_id: job_id.to_string(),
            runner_label: format!("{:?}", job.runner_label),
        };

        let mut results = Vec::with_capacity(job.steps.len());
        let mut error_message = None;
        let mut job_failed = false;

        for step in &job.steps {
            if cancel.is_cancelled() {
                error_message = Some("job cancelled".to_string());
                break;
            }

            let Some(executor) = ContainerStepFactory::resolve(step.kind, self.artifacts.clone()) else {
                let result = job_boundary_error_result(&step.name, unsupported_step_kind(step.kind));
                let step_failed = !result.success;
                results.push(result);
                if step_failed && !step.continue_on_error {
                    job_failed = true;
                    error_message = Some(format!("step '{}' failed", step.name));
                    break;
                }
                continue;
            };

            let ctx = ExecutionContext {
                container_id: container_id.clone(),
                host_workspace: host_workspace.to_path_buf(),
                container_workspace: container_workspace.clone(),
                working_directory: step.working_directory.clone().unwrap_or_else(|| ".".to_string()),
                env: crate::steps::merged_env(&env, &step.env),
                job: job_meta.clone(),
            };

            let mut result = match executor.execute(step, &ctx, self.container.as_ref(), cancel).await {
                Ok(result) => result,
                Err(err) => job_boundary_error_result(&step.name, err),
            };
            result.output = self.masker.mask(&result.output);
            result.error_output = self.masker.mask(&result.error_output);

            let step_failed = !result.success;
            results.push(result);

            if step_failed && !step.continue_on_error {
                job_failed = true;
                error_message = Some(format!("step '{}' failed", step.name));
                break;
            }
        }

        guard.release().await;

        Ok(JobExecutionResult {
            job_name: job.name.clone(),
            success: !job_failed && error_message.is_none(),
            steps: results,
            error_message,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_image_prefers_config_table() {
        let mut images = HashMap::new();
        images.insert("ubuntu-latest".to_string(), "myregistry/ubuntu:custom".to_string());
        let resolved = resolve_image(&RunnerLabel::UbuntuLatest, &images).unwrap();
        assert_eq!(resolved, "myregistry/ubuntu:custom");
    }

    #[test]
    fn resolve_image_falls_back_to_default() {
        let resolved = resolve_image(&RunnerLabel::UbuntuLatest, &HashMap::new()).unwrap();
        assert_eq!(resolved, "buildpack-deps:jammy");
    }

    #[test]
    fn resolve_image_passes_custom_image_through() {
        let label = RunnerLabel::CustomImage("owner/image:1.0".to_string());
        let resolved = resolve_image(&label, &HashMap::new()).unwrap();
        assert_eq!(resolved, "owner/image:1.0");
    }

    #[test]
    fn resolve_image_rejects_unconfigured_self_hosted() {
        assert!(resolve_image(&RunnerLabel::SelfHosted, &HashMap::new()).is_err());
    }
}
