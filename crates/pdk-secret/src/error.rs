use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret '{0}' was not found")]
    NotFound(String),

    #[error("secret store crypto failure: {0}")]
    Crypto(String),

    #[error("secret store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("secret store data corrupt: {0}")]
    Corrupt(String),
}

impl From<SecretError> for pdk_core::Error {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::NotFound(name) => pdk_core::Error::Secret(format!("secret '{name}' not found")),
            SecretError::Io(e) => pdk_core::Error::Io(e),
            other => pdk_core::Error::Secret(other.to_string()),
        }
    }
}
