//! Provider-agnostic pipeline data model (SPEC_FULL.md §3).
//!
//! Instances of [`Pipeline`] are built by an external provider parser
//! (GitHub Actions / Azure Pipelines YAML); this crate only defines the
//! shape every parser emits into.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::id::{JobId, StepId};

/// The CI provider a pipeline was authored for. Drives default-compression
/// parity (SPEC_FULL.md §8 scenario 8) and runner-label image tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    GitHubActions,
    AzurePipelines,
}

impl Provider {
    /// Each provider defaults artifact compression differently.
    pub fn default_compression(self) -> CompressionKind {
        match self {
            Provider::GitHubActions => CompressionKind::Gzip,
            Provider::AzurePipelines => CompressionKind::Zip,
        }
    }
}

/// A `runs-on` value: either a well-known label mapped to a base image, or
/// an explicit image reference (treated as a "custom image" by the runner
/// selector's capability check).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerLabel {
    UbuntuLatest,
    WindowsLatest,
    SelfHosted,
    /// An explicit `owner/image:tag` reference.
    CustomImage(String),
}

impl RunnerLabel {
    pub fn parse(label: &str) -> Self {
        match label {
            "ubuntu-latest" => Self::UbuntuLatest,
            "windows-latest" => Self::WindowsLatest,
            "self-hosted" => Self::SelfHosted,
            other => Self::CustomImage(other.to_string()),
        }
    }

    /// Whether this label requires the runner selector to flag
    /// `custom-images` in a capability mismatch check.
    pub fn is_custom_image(&self) -> bool {
        matches!(self, Self::CustomImage(_))
    }
}

/// A full pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub jobs: HashMap<JobId, Job>,
    /// Workflow-level variables; keys must be unique (enforced by whoever
    /// constructs the map, typically the external parser).
    pub variables: HashMap<String, String>,
}

/// A single job: an ordered sequence of steps run by one runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub runner_label: RunnerLabel,
    pub steps: Vec<Step>,
    /// Other job ids this job depends on. Must be a subset of the
    /// pipeline's job ids.
    pub dependencies: Vec<JobId>,
    pub timeout: Option<std::time::Duration>,
    pub env: HashMap<String, String>,
    pub condition: Option<String>,
}

/// The kind of a step, selecting which executor family member handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Checkout,
    Script,
    DotNet,
    Npm,
    Docker,
    UploadArtifact,
    DownloadArtifact,
}

impl StepKind {
    /// Case-insensitive lookup, as the factory in SPEC_FULL.md §4.3 requires.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "checkout" => Some(Self::Checkout),
            "script" => Some(Self::Script),
            "dotnet" => Some(Self::DotNet),
            "npm" => Some(Self::Npm),
            "docker" => Some(Self::Docker),
            "uploadartifact" => Some(Self::UploadArtifact),
            "downloadartifact" => Some(Self::DownloadArtifact),
            _ => None,
        }
    }
}

/// The shell a `script` step is executed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    Bash,
    Sh,
    Pwsh,
    Powershell,
    Cmd,
}

impl ShellKind {
    pub fn parse(shell: &str) -> Option<Self> {
        match shell.to_ascii_lowercase().as_str() {
            "bash" => Some(Self::Bash),
            "sh" => Some(Self::Sh),
            "pwsh" => Some(Self::Pwsh),
            "powershell" => Some(Self::Powershell),
            "cmd" => Some(Self::Cmd),
            _ => None,
        }
    }

    pub fn is_posix(self) -> bool {
        matches!(self, Self::Bash | Self::Sh)
    }

    pub fn is_powershell(self) -> bool {
        matches!(self, Self::Pwsh | Self::Powershell)
    }

    pub fn binary_name(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Sh => "sh",
            Self::Pwsh => "pwsh",
            Self::Powershell => "powershell",
            Self::Cmd => "cmd",
        }
    }

    pub fn script_extension(self) -> &'static str {
        match self {
            Self::Pwsh | Self::Powershell => "ps1",
            Self::Cmd => "cmd",
            Self::Bash | Self::Sh => "sh",
        }
    }
}

/// A single step within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    pub kind: StepKind,
    pub script: Option<String>,
    pub shell: Option<ShellKind>,
    /// Kind-specific inputs. Keys are lowercased on read by the executors,
    /// not necessarily at construction time.
    pub with: HashMap<String, String>,
    pub env: HashMap<String, String>,
    pub working_directory: Option<String>,
    pub continue_on_error: bool,
    pub needs: Vec<StepId>,
    pub artifact: Option<ArtifactDefinition>,
}

impl Step {
    /// Case-insensitive lookup of a `with` input.
    pub fn with_input(&self, key: &str) -> Option<&str> {
        self.with
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Whether an artifact step uploads or downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactOperation {
    Upload,
    Download,
}

/// Archive format applied to a stored artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    None,
    Zip,
    Gzip,
}

/// What to do when an upload step's patterns match nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfNoFilesFound {
    Error,
    Warn,
    Ignore,
}

/// Options controlling an artifact upload/download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactOptions {
    pub compression: CompressionKind,
    pub retention_days: u32,
    pub overwrite_existing: bool,
    pub if_no_files_found: IfNoFilesFound,
}

/// The `artifact:` block attached to an upload/download step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDefinition {
    /// Unique per run.
    pub name: String,
    pub operation: ArtifactOperation,
    /// Ordered; a leading `!` marks an exclusion pattern.
    pub patterns: Vec<String>,
    pub target_path: Option<String>,
    pub options: ArtifactOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_kind_parses_case_insensitively() {
        assert_eq!(StepKind::parse("Script"), Some(StepKind::Script));
        assert_eq!(StepKind::parse("UPLOADARTIFACT"), Some(StepKind::UploadArtifact));
        assert_eq!(StepKind::parse("bogus"), None);
    }

    #[test]
    fn runner_label_distinguishes_custom_images() {
        assert!(!RunnerLabel::parse("ubuntu-latest").is_custom_image());
        assert!(RunnerLabel::parse("myregistry/myimage:1.0").is_custom_image());
    }

    #[test]
    fn provider_default_compression_matches_parity_rule() {
        assert_eq!(
            Provider::GitHubActions.default_compression(),
            CompressionKind::Gzip
        );
        assert_eq!(
            Provider::AzurePipelines.default_compression(),
            CompressionKind::Zip
        );
    }

    #[test]
    fn step_with_input_is_case_insensitive() {
        let mut with = HashMap::new();
        with.insert("Repository".to_string(), "https://example.com/r.git".to_string());
        let step = Step {
            id: "s1".into(),
            name: "checkout".into(),
            kind: StepKind::Checkout,
            script: None,
            shell: None,
            with,
            env: HashMap::new(),
            working_directory: None,
            continue_on_error: false,
            needs: vec![],
            artifact: None,
        };
        assert_eq!(
            step.with_input("repository"),
            Some("https://example.com/r.git")
        );
    }
}
