//! Error taxonomy shared across the execution core.
//!
//! Every leaf error kind is its own `thiserror` enum so call sites can match
//! on specific failure modes; [`Error`] is the umbrella type returned by the
//! traits defined in this crate, with a `From` impl per leaf kind.

use thiserror::Error;

/// Container runtime failures, surfaced by the container manager and the
/// container-family step executors.
#[derive(Debug, Error, Clone)]
pub enum ContainerError {
    #[error("container daemon is not running: {0}")]
    DaemonNotRunning(String),

    #[error("container daemon is not installed")]
    DaemonNotInstalled,

    #[error("permission denied talking to the container daemon: {0}")]
    PermissionDenied(String),

    #[error("image not found: {image}")]
    ImageNotFound { image: String },

    #[error("failed to create container: {0}")]
    CreationFailed(String),

    #[error("command execution failed: {0}")]
    ExecutionFailed(String),
}

impl ContainerError {
    /// Remediation suggestions curated per failure kind.
    pub fn suggestions(&self) -> Vec<String> {
        let static_suggestions: &[&str] = match self {
            ContainerError::DaemonNotRunning(_) => &[
                "start the container daemon (e.g. `systemctl start docker` or open Docker Desktop)",
                "check `docker info` to confirm the daemon is reachable",
            ],
            ContainerError::DaemonNotInstalled => &[
                "install Docker or a compatible container runtime",
                "see https://docs.docker.com/engine/install/",
            ],
            ContainerError::PermissionDenied(_) => &[
                "add your user to the `docker` group and re-login",
                "or run with elevated privileges",
            ],
            ContainerError::ImageNotFound { .. } => &[
                "run `docker pull <image>` to confirm the image name and tag",
                "check that the registry is reachable and credentials are valid",
            ],
            ContainerError::CreationFailed(_) => &[
                "run `docker inspect <container>` for more detail",
                "prune idle containers with `docker container prune`",
            ],
            ContainerError::ExecutionFailed(_) => &[
                "exit code 127 usually means the command was not found in the image",
                "exit code 137 usually means the process was OOM-killed",
                "exit code 143 usually means the process received SIGTERM",
            ],
        };
        let mut out: Vec<String> = static_suggestions.iter().map(|s| s.to_string()).collect();
        if let ContainerError::ImageNotFound { image } = self {
            out.push(format!("double-check the image reference: {image}"));
        }
        out
    }
}

/// A well-known tool name, used to curate [`ToolNotFoundError`] suggestions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolNotFoundCode {
    DotNet,
    NodeNpm,
    PythonPip,
    JavaMaven,
    JavaGradle,
    Go,
    Cargo,
    Git,
    Docker,
    Kubectl,
    Aws,
    Az,
    Other(String),
}

impl ToolNotFoundCode {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "dotnet" => Self::DotNet,
            "node" | "npm" | "npx" => Self::NodeNpm,
            "python" | "python3" | "pip" | "pip3" => Self::PythonPip,
            "mvn" | "maven" => Self::JavaMaven,
            "gradle" => Self::JavaGradle,
            "go" => Self::Go,
            "cargo" => Self::Cargo,
            "git" => Self::Git,
            "docker" => Self::Docker,
            "kubectl" => Self::Kubectl,
            "aws" => Self::Aws,
            "az" => Self::Az,
            other => Self::Other(other.to_string()),
        }
    }

    fn suggestion(&self) -> &'static str {
        match self {
            Self::DotNet => "install the .NET SDK, or choose an image that already has it",
            Self::NodeNpm => "install Node.js (which bundles npm), or use a node:* image",
            Self::PythonPip => "install Python 3 and pip, or use a python:* image",
            Self::JavaMaven => "install a JDK and Maven, or use a maven:* image",
            Self::JavaGradle => "install a JDK and Gradle, or use a gradle:* image",
            Self::Go => "install the Go toolchain, or use a golang:* image",
            Self::Cargo => "install Rust via rustup, or use a rust:* image",
            Self::Git => "install git",
            Self::Docker => "install Docker, or run this step in host mode without docker steps",
            Self::Kubectl => "install kubectl",
            Self::Aws => "install the AWS CLI",
            Self::Az => "install the Azure CLI",
            Self::Other(_) => "install the tool in an earlier setup step",
        }
    }
}

/// The richer `ToolNotFoundException` variant (see SPEC_FULL.md §9): carries
/// a curated code and the image the tool was expected in, if any.
#[derive(Debug, Error, Clone)]
#[error("required tool not found: {name}")]
pub struct ToolNotFoundError {
    pub name: String,
    pub code: ToolNotFoundCode,
    pub image: Option<String>,
}

impl ToolNotFoundError {
    pub fn new(name: impl Into<String>, image: Option<String>) -> Self {
        let name = name.into();
        let code = ToolNotFoundCode::from_name(&name);
        Self { name, code, image }
    }

    pub fn suggestions(&self) -> Vec<String> {
        let mut out = vec![self.code.suggestion().to_string()];
        out.push("or choose a pre-provisioned image that already has it".to_string());
        out
    }
}

/// Artifact engine failures.
#[derive(Debug, Error, Clone)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("no files matched the selection patterns for artifact '{0}'")]
    PatternEmpty(String),

    #[error("checksum mismatch for file '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("artifact manifest is invalid: {0}")]
    ManifestInvalid(String),

    #[error("artifact storage I/O error: {0}")]
    StorageIo(String),
}

/// Raised by the runner selector when a Host runner cannot satisfy a job's
/// requirements (custom image, docker steps). Never silently downgraded.
#[derive(Debug, Error, Clone)]
#[error("host runner cannot satisfy required features: {features:?}")]
pub struct CapabilityMismatch {
    pub features: Vec<String>,
}

/// Variable expansion failures.
#[derive(Debug, Error, Clone)]
pub enum VariableError {
    #[error("{message}")]
    RequiredVariableMissing { name: String, message: String },

    #[error("variable expansion loop detected starting at '{0}'")]
    ExpansionLoop(String),

    #[error("malformed variable expression: {0}")]
    Malformed(String),
}

/// Umbrella error returned by the traits defined in this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    ToolNotFound(#[from] ToolNotFoundError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Capability(#[from] CapabilityMismatch),

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error("secret store error: {0}")]
    Secret(String),

    #[error("validation failed with {0} error(s)")]
    Validation(usize),

    #[error("unsupported step kind: {0}")]
    UnsupportedStepKind(String),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
