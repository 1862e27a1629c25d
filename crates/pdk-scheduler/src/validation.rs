//! Validation phase harness (SPEC_FULL.md §4.8). The harness and the
//! `ValidationPhase` contract already live in `pdk_core::validation` since
//! both the orchestrator and an external dry-run command need them; this
//! module only re-exports the contract and refuses to run a pipeline that
//! still has errors, per §7 ("the core refuses to execute when errors are
//! present").

pub use pdk_core::validation::{
    PhaseTiming, Severity, ValidationCategory, ValidationError, ValidationHarness,
    ValidationPhase, ValidationReport,
};

use pdk_core::pipeline::Pipeline;
use pdk_core::{Error, Result};

/// Runs every registered phase and turns a report with errors into a hard
/// failure. Warnings never block execution.
pub async fn validate_or_fail(harness: &ValidationHarness, pipeline: &Pipeline) -> Result<ValidationReport> {
    let report = harness.run(pipeline).await;
    if report.has_errors() {
        let error_count = report.errors.iter().filter(|e| e.severity == Severity::Error).count();
        return Err(Error::Validation(error_count));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pdk_core::pipeline::Provider;
    use std::collections::HashMap;

    struct CleanPhase;

    #[async_trait]
    impl ValidationPhase for CleanPhase {
        fn order(&self) -> i32 {
            0
        }

        fn name(&self) -> &'static str {
            "clean"
        }

        async fn validate(&self, _pipeline: &Pipeline) -> Vec<ValidationError> {
            vec![]
        }
    }

    struct ErrorPhase;

    #[async_trait]
    impl ValidationPhase for ErrorPhase {
        fn order(&self) -> i32 {
            1
        }

        fn name(&self) -> &'static str {
            "error"
        }

        async fn validate(&self, _pipeline: &Pipeline) -> Vec<ValidationError> {
            vec![ValidationError {
                severity: Severity::Error,
                category: ValidationCategory::Schema,
                code: "E001".into(),
                message: "bad".into(),
                job_id: None,
                step_name: None,
                step_index: None,
                line_number: None,
                suggestions: vec![],
            }]
        }
    }

    fn empty_pipeline() -> Pipeline {
        Pipeline {
            id: "p".into(),
            name: "p".into(),
            provider: Provider::GitHubActions,
            jobs: HashMap::new(),
            variables: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn clean_pipeline_passes() {
        let harness = ValidationHarness::new(vec![Box::new(CleanPhase)]);
        assert!(validate_or_fail(&harness, &empty_pipeline()).await.is_ok());
    }

    #[tokio::test]
    async fn errored_pipeline_is_rejected() {
        let harness = ValidationHarness::new(vec![Box::new(ErrorPhase)]);
        let result = validate_or_fail(&harness, &empty_pipeline()).await;
        assert!(matches!(result, Err(Error::Validation(1))));
    }
}
