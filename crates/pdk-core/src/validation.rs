//! Validation harness contract (SPEC_FULL.md §4.8). The individual
//! validators are out of scope; this crate only defines the trait, the
//! error shape, and the harness that runs phases in order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// Broad grouping used to filter/report validation results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationCategory {
    Schema,
    Variables,
    Executors,
    Runner,
    Cycle,
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub severity: Severity,
    pub category: ValidationCategory,
    pub code: String,
    pub message: String,
    pub job_id: Option<String>,
    pub step_name: Option<String>,
    pub step_index: Option<usize>,
    pub line_number: Option<u32>,
    pub suggestions: Vec<String>,
}

/// A single ordered validation pass. Supplied externally (e.g. schema
/// checks, cycle detection, variable-reference checks); the harness only
/// guarantees ordering and collection.
#[async_trait]
pub trait ValidationPhase: Send + Sync {
    /// Lower values run first.
    fn order(&self) -> i32;

    fn name(&self) -> &'static str;

    async fn validate(&self, pipeline: &Pipeline) -> Vec<ValidationError>;
}

/// Per-phase timing, reported for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase_name: String,
    pub duration: Duration,
}

/// Aggregate result of running every registered phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub phase_timings: Vec<PhaseTiming>,
    pub total_duration: Duration,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Error)
    }
}

/// Runs a set of [`ValidationPhase`] implementations in ascending `order()`,
/// collecting every error/warning they produce.
pub struct ValidationHarness {
    phases: Vec<Box<dyn ValidationPhase>>,
}

impl ValidationHarness {
    pub fn new(mut phases: Vec<Box<dyn ValidationPhase>>) -> Self {
        phases.sort_by_key(|p| p.order());
        Self { phases }
    }

    pub async fn run(&self, pipeline: &Pipeline) -> ValidationReport {
        let total_start = std::time::Instant::now();
        let mut errors = Vec::new();
        let mut phase_timings = Vec::new();

        for phase in &self.phases {
            let phase_start = std::time::Instant::now();
            let mut phase_errors = phase.validate(pipeline).await;
            phase_timings.push(PhaseTiming {
                phase_name: phase.name().to_string(),
                duration: phase_start.elapsed(),
            });
            errors.append(&mut phase_errors);
        }

        ValidationReport {
            errors,
            phase_timings,
            total_duration: total_start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Provider;
    use std::collections::HashMap;

    struct AlwaysErrorsPhase {
        order: i32,
    }

    #[async_trait]
    impl ValidationPhase for AlwaysErrorsPhase {
        fn order(&self) -> i32 {
            self.order
        }

        fn name(&self) -> &'static str {
            "always-errors"
        }

        async fn validate(&self, _pipeline: &Pipeline) -> Vec<ValidationError> {
            vec![ValidationError {
                severity: Severity::Error,
                category: ValidationCategory::Schema,
                code: "E001".into(),
                message: "synthetic failure".into(),
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
    async fn harness_runs_phases_in_order_and_collects_errors() {
        let harness = ValidationHarness::new(vec![
            Box::new(AlwaysErrorsPhase { order: 2 }),
            Box::new(AlwaysErrorsPhase { order: 1 }),
        ]);
        let report = harness.run(&empty_pipeline()).await;
        assert_eq!(report.errors.len(), 2);
        assert!(report.has_errors());
        assert_eq!(report.phase_timings.len(), 2);
    }
}
