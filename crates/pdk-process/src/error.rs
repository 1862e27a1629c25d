use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("command must not be empty")]
    EmptyCommand,

    #[error("working directory must not be empty")]
    EmptyWorkingDirectory,

    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("process timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("process was cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessError> for pdk_core::Error {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Io(e) => pdk_core::Error::Io(e),
            ProcessError::Cancelled => pdk_core::Error::Cancelled,
            other => pdk_core::Error::Internal(other.to_string()),
        }
    }
}
