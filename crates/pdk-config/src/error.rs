//! Configuration and variable-expansion errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("variable expansion error: {0}")]
    Expansion(#[from] pdk_core::error::VariableError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for pdk_core::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Expansion(e) => pdk_core::Error::Variable(e),
            ConfigError::Io(e) => pdk_core::Error::Io(e),
            other => pdk_core::Error::InvalidInput(other.to_string()),
        }
    }
}
