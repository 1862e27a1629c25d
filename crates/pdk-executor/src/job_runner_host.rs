//! Job Runner, Host mode (SPEC_FULL.md §4.6): same shape as the container
//! runner but drives steps directly through the Process Executor against a
//! real workspace directory, with PDK_* environment injection and a
//! one-time consent warning.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use pdk_core::artifact::ArtifactEngine;
use pdk_core::cancel::CancellationToken;
use pdk_core::execution::{HostExecutionContext, JobExecutionResult, JobMetadata, Platform};
use pdk_core::pipeline::Job;
use pdk_core::secret::Masker;
use pdk_core::Result;
use pdk_config::system::HostModeConfig;
use pdk_process::ProcessExecutor;
use tokio::sync::mpsc::Sender;

use crate::steps::{job_boundary_error_result, unsupported_step_kind, HostStepFactory};

/// Tracks whether the host-mode security banner has already been shown this
/// process (SPEC_FULL.md §4.6 "one-time security warning banner").
static WARNING_SHOWN: AtomicBool = AtomicBool::new(false);

/// Emitted for each step so an external renderer can show progress
/// (SPEC_FULL.md §4.6 "pluggable progress reporter"). Mirrors the shape of
/// the teacher's own `PipelineEvent` stream, scoped to a single job.
#[derive(Debug, Clone)]
pub enum StepProgressEvent {
    Started { step_name: String },
    Completed { step_name: String, success: bool },
}

/// Emits the one-time host-mode warning to the tracing log, unless the
/// config has already acknowledged it. Idempotent per process.
fn warn_host_mode_once(config: &HostModeConfig) {
    if config.warning_acknowledged {
        return;
    }
    if WARNING_SHOWN
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        tracing::warn!(
            "HOST MODE: steps will run with this user's privileges on the host filesystem. \
             Set host_mode.warning_acknowledged = true to suppress this warning."
        );
    }
}

/// Drives a single job to completion directly on the host.
pub struct HostJobRunner {
    process: Arc<ProcessExecutor>,
    artifacts: Arc<dyn ArtifactEngine>,
    masker: Arc<dyn Masker>,
    host_mode_config: HostModeConfig,
}

impl HostJobRunner {
    pub fn new(
        process: Arc<ProcessExecutor>,
        artifacts: Arc<dyn ArtifactEngine>,
        masker: Arc<dyn Masker>,
        host_mode_config: HostModeConfig,
    ) -> Self {
        Self {
            process,
            artifacts,
            masker,
            host_mode_config,
        }
    }

    pub async fn run(
        &self,
        job: &Job,
        job_id: &str,
        workspace: &Path,
        cancel: &CancellationToken,
        progress: Option<Sender<StepProgressEvent>>,
    ) -> Result<JobExecutionResult> {
        warn_host_mode_once(&self.host_mode_config);

        let started_at = Utc::now();
        let job_meta = JobMetadata {
            job_name: job.name.clone(),
            job_id: job_id.to_string(),
            runner_label: format!("{:?}", job.runner_label),
        };

        let mut env = job.env.clone();
        env.insert("PDK_HOST_MODE".to_string(), "true".to_string());
        env.insert("PDK_JOB".to_string(), job.name.clone());
        env.insert("PDK_RUNNER".to_string(), job_meta.runner_label.clone());
        env.insert("PDK_WORKSPACE".to_string(), workspace.display().to_string());

        let mut results = Vec::with_capacity(job.steps.len());
        let mut error_message = None;
        let mut job_failed = false;

        for step in &job.steps {
            if cancel.is_cancelled() {
                error_message = Some("job cancelled".to_string());
                break;
            }

            let Some(executor) = HostStepFactory::resolve(step.kind, self.artifacts.clone()) else {
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

            let mut step_env = env.clone();
            step_env.insert("PDK_STEP".to_string(), step.name.clone());

            let ctx = HostExecutionContext {
                workspace: workspace.to_path_buf(),
                platform: Platform::current(),
                working_directory: step.working_directory.clone().unwrap_or_else(|| ".".to_string()),
                env: crate::steps::merged_env(&step_env, &step.env),
                job: job_meta.clone(),
            };

            if let Some(tx) = &progress {
                let _ = tx
                    .send(StepProgressEvent::Started {
                        step_name: step.name.clone(),
                    })
                    .await;
            }

            let mut result = match executor.execute(step, &ctx, self.process.as_ref(), cancel).await {
                Ok(result) => result,
                Err(err) => job_boundary_error_result(&step.name, err),
            };
            result.output = self.masker.mask(&result.output);
            result.error_output = self.masker.mask(&result.error_output);

            if let Some(tx) = &progress {
                let _ = tx
                    .send(StepProgressEvent::Completed {
                        step_name: step.name.clone(),
                        success: result.success,
                    })
                    .await;
            }

            let step_failed = !result.success;
            results.push(result);

            if step_failed && !step.continue_on_error {
                job_failed = true;
                error_message = Some(format!("step '{}' failed", step.name));
                break;
            }
        }

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
    fn warning_fires_once_per_process() {
        WARNING_SHOWN.store(false, Ordering::SeqCst);
        let config = HostModeConfig {
            warning_acknowledged: false,
        };
        warn_host_mode_once(&config);
        assert!(WARNING_SHOWN.load(Ordering::SeqCst));
    }

    #[test]
    fn acknowledged_config_never_flips_the_flag() {
        WARNING_SHOWN.store(false, Ordering::SeqCst);
        let config = HostModeConfig {
            warning_acknowledged: true,
        };
        warn_host_mode_once(&config);
        assert!(!WARNING_SHOWN.load(Ordering::SeqCst));
    }
}
