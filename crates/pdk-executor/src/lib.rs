//! Execution backends for the local CI/CD pipeline executor.
//!
//! A pipeline's jobs run either inside ephemeral containers (preferred) or
//! directly on the host (fallback, with consent) — see `job_runner_container`
//! and `job_runner_host`. Both drive the same step-executor strategy layer
//! in `steps`, resolved per `StepKind` by a per-mode factory.

pub mod container_manager;
pub mod guard;
pub mod job_runner_container;
pub mod job_runner_host;
pub mod steps;

pub use container_manager::BollardContainerManager;
pub use guard::{ContainerGuard, TempDirGuard};
pub use job_runner_container::ContainerJobRunner;
pub use job_runner_host::{HostJobRunner, StepProgressEvent};
pub use steps::{ContainerStepExecutor, ContainerStepFactory, HostStepExecutor, HostStepFactory};
