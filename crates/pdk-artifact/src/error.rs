use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact '{0}' was not found")]
    NotFound(String),

    #[error("artifact '{0}' already exists and overwrite_existing is false")]
    AlreadyExists(String),

    #[error("no files matched the given patterns")]
    NoFilesMatched,

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt artifact manifest: {0}")]
    Corrupt(String),

    #[error("compression error: {0}")]
    Compression(String),
}

impl From<ArtifactError> for pdk_core::Error {
    fn from(err: ArtifactError) -> Self {
        use pdk_core::error::ArtifactError as CoreArtifactError;
        match err {
            ArtifactError::NotFound(name) => pdk_core::Error::Artifact(CoreArtifactError::NotFound(name)),
            ArtifactError::AlreadyExists(name) => {
                pdk_core::Error::Artifact(CoreArtifactError::StorageIo(format!(
                    "artifact '{name}' already exists and overwrite_existing is false"
                )))
            }
            ArtifactError::NoFilesMatched => {
                pdk_core::Error::Artifact(CoreArtifactError::PatternEmpty(String::new()))
            }
            ArtifactError::Io(e) => pdk_core::Error::Io(e),
            other => pdk_core::Error::Artifact(CoreArtifactError::StorageIo(other.to_string())),
        }
    }
}
