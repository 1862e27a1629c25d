//! Runner selection types (SPEC_FULL.md §4.7).

use serde::{Deserialize, Serialize};

/// The CLI-level runner preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerPreference {
    Auto,
    Container,
    Host,
}

/// The runner family actually chosen for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    Container,
    Host,
}

/// Output of the runner selection algorithm. Never silently degrades:
/// a capability mismatch always surfaces as an error rather than as a
/// `SelectionResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub selected: RunnerKind,
    pub reason: String,
    pub warning: Option<String>,
    pub docker_version: Option<String>,
    pub is_fallback: bool,
}
