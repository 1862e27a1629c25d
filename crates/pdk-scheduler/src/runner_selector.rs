//! Runner selection and fallback policy (SPEC_FULL.md §4.7): decides
//! container vs. host given a CLI override, a config default, daemon
//! availability, and the job's capability requirements. Never silently
//! degrades a job past what it actually needs.

use std::sync::Arc;

use pdk_core::execution::ContainerManager;
use pdk_core::pipeline::{Job, StepKind};
use pdk_core::error::CapabilityMismatch;
use pdk_core::runner::{RunnerKind, RunnerPreference, SelectionResult};
use pdk_core::{Error, Result};

/// Selects container or host execution for a single job, per §4.7's
/// four-step algorithm.
pub struct RunnerSelector {
    container: Arc<dyn ContainerManager>,
}

impl RunnerSelector {
    pub fn new(container: Arc<dyn ContainerManager>) -> Self {
        Self { container }
    }

    pub async fn select(
        &self,
        cli_preference: RunnerPreference,
        config_default: Option<RunnerKind>,
        job: &Job,
    ) -> Result<SelectionResult> {
        let tentative = match cli_preference {
            RunnerPreference::Host => SelectionResult {
                selected: RunnerKind::Host,
                reason: "explicit CLI flag".to_string(),
                warning: Some(host_mode_warning()),
                docker_version: None,
                is_fallback: false,
            },
            RunnerPreference::Container => {
                let status = self.container.is_daemon_available().await;
                if !status.available {
                    return Err(daemon_unavailable_error(&status));
                }
                SelectionResult {
                    selected: RunnerKind::Container,
                    reason: "explicit CLI flag".to_string(),
                    warning: None,
                    docker_version: status.version,
                    is_fallback: false,
                }
            }
            RunnerPreference::Auto => self.select_auto(config_default).await?,
        };

        self.validate_capabilities(&tentative, job)?;
        Ok(tentative)
    }

    async fn select_auto(&self, config_default: Option<RunnerKind>) -> Result<SelectionResult> {
        if let Some(default) = config_default {
            return Ok(match default {
                RunnerKind::Host => SelectionResult {
                    selected: RunnerKind::Host,
                    reason: "config default".to_string(),
                    warning: Some(host_mode_warning()),
                    docker_version: None,
                    is_fallback: false,
                },
                RunnerKind::Container => {
                    let status = self.container.is_daemon_available().await;
                    if !status.available {
                        return Err(daemon_unavailable_error(&status));
                    }
                    SelectionResult {
                        selected: RunnerKind::Container,
                        reason: "config default".to_string(),
                        warning: None,
                        docker_version: status.version,
                        is_fallback: false,
                    }
                }
            });
        }

        let status = self.container.is_daemon_available().await;
        if status.available {
            Ok(SelectionResult {
                selected: RunnerKind::Container,
                reason: "container daemon available".to_string(),
                warning: None,
                docker_version: status.version,
                is_fallback: false,
            })
        } else {
            let daemon_reason = status
                .error_kind
                .map(|k| format!("{k:?}"))
                .unwrap_or_else(|| "unknown".to_string());
            Ok(SelectionResult {
                selected: RunnerKind::Host,
                reason: format!("falling back to host: container daemon unavailable ({daemon_reason})"),
                warning: Some(format!("{daemon_reason}; {}", host_mode_warning())),
                docker_version: None,
                is_fallback: true,
            })
        }
    }

    /// A Host runner cannot satisfy a job whose runner label is a custom
    /// image reference or whose steps include a `docker` step.
    fn validate_capabilities(&self, selection: &SelectionResult, job: &Job) -> Result<()> {
        if selection.selected != RunnerKind::Host {
            return Ok(());
        }

        let mut unsatisfied = Vec::new();
        if job.runner_label.is_custom_image() {
            unsatisfied.push("custom-images".to_string());
        }
        if job.steps.iter().any(|s| s.kind == StepKind::Docker) {
            unsatisfied.push("docker-steps".to_string());
        }

        if unsatisfied.is_empty() {
            Ok(())
        } else {
            Err(Error::Capability(CapabilityMismatch {
                features: unsatisfied,
            }))
        }
    }
}

fn host_mode_warning() -> String {
    "HOST MODE: steps will run with this user's privileges directly on the host".to_string()
}

fn daemon_unavailable_error(status: &pdk_core::execution::DaemonStatus) -> Error {
    let kind = status
        .error_kind
        .map(|k| format!("{k:?}"))
        .unwrap_or_else(|| "Other".to_string());
    Error::Container(pdk_core::error::ContainerError::DaemonNotRunning(format!(
        "container runner explicitly requested but daemon is unavailable ({kind})"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream::BoxStream;
    use pdk_core::execution::{
        ContainerExecResult, CreateContainerOptions, DaemonErrorKind, DaemonStatus, PullProgress,
    };
    use pdk_core::pipeline::RunnerLabel;
    use std::collections::HashMap;

    struct FakeContainerManager {
        available: bool,
    }

    #[async_trait]
    impl ContainerManager for FakeContainerManager {
        async fn is_daemon_available(&self) -> DaemonStatus {
            DaemonStatus {
                available: self.available,
                version: self.available.then(|| "24.0.0".to_string()),
                platform: None,
                error_kind: (!self.available).then_some(DaemonErrorKind::NotRunning),
            }
        }

        async fn pull_image_if_needed(
            &self,
            _image: &str,
            _progress: Option<tokio::sync::mpsc::Sender<PullProgress>>,
        ) -> Result<()> {
            Ok(())
        }

        async fn create_container(&self, _image: &str, _options: CreateContainerOptions) -> Result<String> {
            Ok("fake".to_string())
        }

        async fn execute_command(
            &self,
            _container_id: &str,
            _command: &[String],
            _working_dir: Option<&str>,
            _env: Option<&HashMap<String, String>>,
        ) -> Result<ContainerExecResult> {
            unimplemented!()
        }

        async fn get_archive_from_container(
            &self,
            _container_id: &str,
            _path: &str,
        ) -> Result<BoxStream<'static, std::result::Result<Bytes, std::io::Error>>> {
            unimplemented!()
        }

        async fn put_archive_to_container(
            &self,
            _container_id: &str,
            _target_path: &str,
            _tar_stream: Bytes,
        ) -> Result<()> {
            Ok(())
        }

        async fn remove_container(&self, _container_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn job_with(label: RunnerLabel, steps: Vec<pdk_core::pipeline::Step>) -> Job {
        Job {
            id: "j1".into(),
            name: "job".into(),
            runner_label: label,
            steps,
            dependencies: vec![],
            timeout: None,
            env: HashMap::new(),
            condition: None,
        }
    }

    #[tokio::test]
    async fn auto_selects_container_when_daemon_available() {
        let selector = RunnerSelector::new(Arc::new(FakeContainerManager { available: true }));
        let job = job_with(RunnerLabel::UbuntuLatest, vec![]);
        let result = selector.select(RunnerPreference::Auto, None, &job).await.unwrap();
        assert_eq!(result.selected, RunnerKind::Container);
        assert!(!result.is_fallback);
    }

    #[tokio::test]
    async fn auto_falls_back_to_host_when_daemon_unavailable() {
        let selector = RunnerSelector::new(Arc::new(FakeContainerManager { available: false }));
        let job = job_with(RunnerLabel::UbuntuLatest, vec![]);
        let result = selector.select(RunnerPreference::Auto, None, &job).await.unwrap();
        assert_eq!(result.selected, RunnerKind::Host);
        assert!(result.is_fallback);
    }

    #[tokio::test]
    async fn explicit_container_errors_when_daemon_unavailable() {
        let selector = RunnerSelector::new(Arc::new(FakeContainerManager { available: false }));
        let job = job_with(RunnerLabel::UbuntuLatest, vec![]);
        let result = selector.select(RunnerPreference::Container, None, &job).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn host_selection_rejects_custom_image() {
        let selector = RunnerSelector::new(Arc::new(FakeContainerManager { available: false }));
        let job = job_with(RunnerLabel::CustomImage("org/image:1".into()), vec![]);
        let result = selector.select(RunnerPreference::Host, None, &job).await;
        assert!(matches!(result, Err(Error::Capability(_))));
    }

    #[tokio::test]
    async fn host_selection_rejects_docker_step() {
        let selector = RunnerSelector::new(Arc::new(FakeContainerManager { available: false }));
        let step = pdk_core::pipeline::Step {
            id: "s1".into(),
            name: "build image".into(),
            kind: StepKind::Docker,
            script: None,
            shell: None,
            with: HashMap::new(),
            env: HashMap::new(),
            working_directory: None,
            continue_on_error: false,
            needs: vec![],
            artifact: None,
        };
        let job = job_with(RunnerLabel::UbuntuLatest, vec![step]);
        let result = selector.select(RunnerPreference::Host, None, &job).await;
        assert!(matches!(result, Err(Error::Capability(_))));
    }
}
