//! Cross-platform external-command launcher (SPEC_FULL.md §4.1).
//!
//! This is the leaf dependency of the host-targeted step executors: it
//! has no knowledge of pipelines, steps, or containers, only "run this
//! command, stream its output, honor a timeout and a cancellation token".

mod error;
mod launcher;
mod platform;
mod tool;

pub use error::ProcessError;
pub use launcher::{ProcessExecutor, ProcessOptions, ProcessResult};
pub use platform::Platform;
pub use tool::is_tool_available;
