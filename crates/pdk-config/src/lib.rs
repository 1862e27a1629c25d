//! Variable resolution, shell-style expansion, and system configuration
//! shapes for the pipeline executor.

pub mod error;
pub mod expander;
pub mod resolver;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use resolver::VariableResolver;
pub use system::SystemConfig;
