//! Pipeline validation command.

use pdk_core::validation::ValidationHarness;

use super::load_pipeline;

/// Validates a pipeline without executing it.
///
/// The individual validation phases (schema checks, dependency-cycle
/// detection, resource-limit checks, and so on) are an external
/// collaborator's job (SPEC_FULL.md §4.8 — only the harness and its
/// contract are in scope here); an empty harness still exercises the
/// full load → run → report path and gives a real plug-in point for
/// whoever registers phases against `pdk_core::validation::ValidationPhase`.
pub async fn validate(pipeline_path: &str) -> anyhow::Result<i32> {
    let pipeline = load_pipeline(pipeline_path)?;
    let harness = ValidationHarness::new(Vec::new());
    let report = harness.run(&pipeline).await;

    println!("Pipeline: {}", pipeline.name);
    println!("Jobs: {}", pipeline.jobs.len());

    if report.errors.is_empty() {
        println!("Configuration is valid");
        Ok(0)
    } else {
        for error in &report.errors {
            eprintln!("[{:?}] {:?}: {}", error.severity, error.category, error.message);
        }
        Ok(1)
    }
}
