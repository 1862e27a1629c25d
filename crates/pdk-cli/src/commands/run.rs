//! Local pipeline execution command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use pdk_artifact::FsArtifactEngine;
use pdk_config::VariableResolver;
use pdk_core::artifact::ArtifactEngine;
use pdk_core::cancel::CancellationToken;
use pdk_core::execution::{ContainerManager, StepExecutionResult};
use pdk_core::runner::RunnerPreference;
use pdk_core::secret::{Masker, SecretStore};
use pdk_core::validation::ValidationHarness;
use pdk_executor::BollardContainerManager;
use pdk_process::ProcessExecutor;
use pdk_scheduler::{validate_or_fail, PipelineEvent, PipelineOrchestrator};
use pdk_secret::{FileSecretStore, ProcessMasker};

use super::{load_pipeline, load_system_config};

/// Runs a pipeline end to end: wires up the container manager, process
/// executor, artifact engine, and secret store, merges workflow variables
/// and secrets into each job's environment, then drives the orchestrator
/// to completion. Returns the process exit code (SPEC_FULL.md §6).
pub async fn run(
    pipeline_path: &str,
    config_path: Option<&str>,
    preference: RunnerPreference,
    yes_host_mode: bool,
) -> anyhow::Result<i32> {
    let mut config = load_system_config(config_path)?;
    if yes_host_mode {
        config.host_mode.warning_acknowledged = true;
    }

    let mut pipeline = load_pipeline(pipeline_path)?;
    println!("Running pipeline: {}", pipeline.name);
    println!("Jobs: {}", pipeline.jobs.len());

    // Opening the store re-registers every secret it holds with the
    // masker, so nothing further is needed for output masking here.
    let masker = Arc::new(ProcessMasker::new());
    let secret_store = FileSecretStore::open(
        config.secrets.store_path.clone(),
        config.secrets.key_path.clone(),
        masker.clone(),
    )
    .await
    .context("failed to open secret store")?;

    let mut secrets = std::collections::HashMap::new();
    for name in secret_store.list().await.context("failed to list secrets")? {
        let value = secret_store.get(&name).await.context("failed to read secret")?;
        secrets.insert(name, value.as_str().to_string());
    }

    // Workflow variables and secrets are merged into each job's own env so
    // the per-step `${...}` expander (which only sees `job.env`) can
    // resolve them the same way it resolves job-declared values.
    for job in pipeline.jobs.values_mut() {
        let resolver = VariableResolver::new()
            .with_configuration(&pipeline.variables)
            .with_configuration(&job.env)
            .with_secrets(&secrets);
        job.env = resolver.to_map();
    }

    // Phases are registered externally (SPEC_FULL.md §4.8); an empty
    // harness still enforces "the core refuses to execute when errors
    // are present" (§7) for whoever plugs phases in later.
    let harness = ValidationHarness::new(Vec::new());
    if let Err(err) = validate_or_fail(&harness, &pipeline).await {
        eprintln!("Pipeline validation failed: {}", err);
        return Ok(1);
    }

    let container: Arc<dyn ContainerManager> =
        Arc::new(BollardContainerManager::connect().context("failed to connect to the container runtime")?);
    let process = Arc::new(ProcessExecutor::new());
    let artifacts: Arc<dyn ArtifactEngine> = Arc::new(FsArtifactEngine::new(config.artifacts.base_path.clone()));
    let masker: Arc<dyn Masker> = masker;

    let workspace = resolve_workspace(pipeline_path)?;

    let orchestrator = PipelineOrchestrator::new(container, process, artifacts, masker, config, workspace);

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_for_signal.cancel();
        }
    });

    let (mut events, result_handle) = orchestrator
        .execute(&pipeline, preference, cancel)
        .context("failed to start pipeline execution")?;

    println!("\n--- Starting pipeline execution ---\n");
    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::JobStarted { job_name } => {
                println!("▶ Job '{}' started", job_name);
            }
            PipelineEvent::JobCompleted { job_name, success } => {
                if success {
                    println!("✓ Job '{}' completed successfully", job_name);
                } else {
                    println!("✗ Job '{}' failed", job_name);
                }
            }
            PipelineEvent::JobSkipped { job_name, reason } => {
                println!("⊘ Job '{}' skipped: {}", job_name, reason);
            }
            PipelineEvent::PipelineCompleted { success } => {
                if success {
                    println!("\n--- Pipeline completed successfully ---");
                } else {
                    println!("\n--- Pipeline failed ---");
                }
            }
        }
    }

    let result = result_handle.await.context("pipeline execution task panicked")?;

    println!("\n--- Job Summary ---");
    let mut worst_exit_code = None;
    for job_result in &result.job_results {
        let status = if job_result.success {
            "✓ succeeded".to_string()
        } else {
            format!("✗ failed: {}", job_result.error_message.as_deref().unwrap_or("unknown error"))
        };
        println!("  {} - {}", job_result.job_name, status);

        if !job_result.success {
            if let Some(failed_step) = job_result.steps.iter().find(|s| !s.success) {
                worst_exit_code.get_or_insert(failed_step.exit_code);
            }
        }
    }

    if result.success {
        println!("\n✓ Pipeline succeeded!");
        Ok(0)
    } else {
        match worst_exit_code {
            Some(code) if code == StepExecutionResult::EXIT_CANCELLED => Ok(130),
            Some(code) if code > 0 => Ok(code),
            _ => Ok(1),
        }
    }
}

fn resolve_workspace(pipeline_path: &str) -> anyhow::Result<PathBuf> {
    let parent = std::path::Path::new(pipeline_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    parent
        .canonicalize()
        .with_context(|| format!("failed to resolve workspace directory from {}", pipeline_path))
}
