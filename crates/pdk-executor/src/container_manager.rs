//! Bollard-backed `ContainerManager` (SPEC_FULL.md §4.2), adapted from the
//! teacher's `LocalDockerExecutor` in `docker.rs`: same client setup, same
//! `create_image`/`create_container`/`logs`/`inspect_container` calls,
//! generalized from a single job-per-container executor into the
//! stateless, step-oriented contract this spec requires.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions as BollardCreateContainerOptions, DownloadFromContainerOptions,
    LogOutput, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    UploadToContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use pdk_core::error::ContainerError;
use pdk_core::execution::{
    ContainerExecResult, ContainerManager, CreateContainerOptions, DaemonErrorKind, DaemonStatus,
    PullProgress,
};
use pdk_core::Result;

pub struct BollardContainerManager {
    docker: Docker,
}

impl BollardContainerManager {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DaemonNotInstalled.context(e.to_string()))?;
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerManager for BollardContainerManager {
    async fn is_daemon_available(&self) -> DaemonStatus {
        match self.docker.ping().await {
            Ok(_) => {
                let version = self.docker.version().await.ok().and_then(|v| v.version);
                let platform = self
                    .docker
                    .version()
                    .await
                    .ok()
                    .and_then(|v| v.platform)
                    .map(|p| p.name);
                DaemonStatus {
                    available: true,
                    version,
                    platform,
                    error_kind: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                let error_kind = classify_daemon_error(&message);
                DaemonStatus {
                    available: false,
                    version: None,
                    platform: None,
                    error_kind: Some(error_kind),
                }
            }
        }
    }

    async fn pull_image_if_needed(
        &self,
        image: &str,
        progress: Option<tokio::sync::mpsc::Sender<PullProgress>>,
    ) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        tracing::info!(image, "pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::debug!(status = %status, "pull progress");
                        if let Some(sender) = &progress {
                            let _ = sender.send(PullProgress { message: status }).await;
                        }
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    if message.contains("404") || message.contains("not found") {
                        return Err(ContainerError::ImageNotFound {
                            image: image.to_string(),
                        }
                        .into());
                    }
                    return Err(ContainerError::CreationFailed(message).into());
                }
            }
        }

        Ok(())
    }

    async fn create_container(
        &self,
        image: &str,
        options: CreateContainerOptions,
    ) -> Result<String> {
        let env: Vec<String> = options
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let binds: Vec<String> = options
            .mounts
            .iter()
            .map(|(host, container)| format!("{}:{}:rw", host.display(), container))
            .collect();

        let host_config = HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            network_mode: options.network_mode.clone(),
            memory: options.memory_limit_mb.map(|mb| (mb * 1024 * 1024) as i64),
            nano_cpus: options.cpu_limit.map(|c| (c * 1_000_000_000.0) as i64),
            ..Default::default()
        };

        let config = Config {
            image: Some(image.to_string()),
            env: Some(env),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            // Keep the container alive; steps are injected via `exec` calls.
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            host_config: Some(host_config),
            ..Default::default()
        };

        let container_name = format!("pdk-step-{}", uuid::Uuid::new_v4());
        let create_options = BollardCreateContainerOptions {
            name: container_name.clone(),
            platform: None,
        };

        tracing::info!(container = %container_name, image, "creating container");
        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| ContainerError::CreationFailed(e.to_string()))?;

        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ContainerError::CreationFailed(e.to_string()))?;

        Ok(container.id)
    }

    async fn execute_command(
        &self,
        container_id: &str,
        command: &[String],
        working_dir: Option<&str>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<ContainerExecResult> {
        let env_vec = env.map(|e| e.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>());

        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    working_dir: working_dir.map(|s| s.to_string()),
                    env: env_vec,
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ContainerError::ExecutionFailed(e.to_string()))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| ContainerError::ExecutionFailed(e.to_string()))?
        {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message))
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message))
                    }
                    Ok(_) => {}
                    Err(e) => return Err(ContainerError::ExecutionFailed(e.to_string()).into()),
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| ContainerError::ExecutionFailed(e.to_string()))?;
        let exit_code = inspect.exit_code.unwrap_or(-1) as i32;

        Ok(ContainerExecResult {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn get_archive_from_container(
        &self,
        container_id: &str,
        path: &str,
    ) -> Result<BoxStream<'static, std::result::Result<Bytes, std::io::Error>>> {
        let options = DownloadFromContainerOptions { path: path.to_string() };
        let mapped = self
            .docker
            .download_from_container(container_id, Some(options))
            .map(|chunk| chunk.map_err(|e| std::io::Error::other(e.to_string())));
        Ok(Box::pin(mapped))
    }

    async fn put_archive_to_container(
        &self,
        container_id: &str,
        target_path: &str,
        tar_stream: Bytes,
    ) -> Result<()> {
        let options = UploadToContainerOptions {
            path: target_path.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(container_id, Some(options), tar_stream)
            .await
            .map_err(|e| ContainerError::ExecutionFailed(e.to_string()))?;
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(container_id, Some(options)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                if message.contains("404") || message.contains("No such container") {
                    Ok(())
                } else {
                    tracing::warn!(container_id, error = %message, "failed to remove container");
                    Err(ContainerError::ExecutionFailed(message).into())
                }
            }
        }
    }
}

fn classify_daemon_error(message: &str) -> DaemonErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission denied") {
        DaemonErrorKind::PermissionDenied
    } else if lower.contains("no such file") || lower.contains("cannot connect") {
        DaemonErrorKind::NotRunning
    } else if lower.contains("not found") {
        DaemonErrorKind::NotInstalled
    } else {
        DaemonErrorKind::Other
    }
}

/// Small extension so `connect()` can attach context to a daemon-not-found
/// style failure without inventing a new error variant.
trait ContainerErrorExt {
    fn context(self, detail: String) -> ContainerError;
}

impl ContainerErrorExt for ContainerError {
    fn context(self, detail: String) -> ContainerError {
        match self {
            ContainerError::DaemonNotInstalled => ContainerError::DaemonNotRunning(detail),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_permission_denied() {
        assert_eq!(
            classify_daemon_error("Got permission denied while trying to connect"),
            DaemonErrorKind::PermissionDenied
        );
    }

    #[test]
    fn classifies_not_running() {
        assert_eq!(
            classify_daemon_error("Cannot connect to the Docker daemon"),
            DaemonErrorKind::NotRunning
        );
    }

    #[test]
    fn classifies_other_as_fallback() {
        assert_eq!(classify_daemon_error("some unexpected failure"), DaemonErrorKind::Other);
    }
}
