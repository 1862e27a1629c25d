use std::path::Path;

use pdk_core::artifact::ArtifactManifest;

use crate::error::ArtifactError;

pub const MANIFEST_FILE_NAME: &str = "artifact.metadata.json";

pub fn manifest_path(artifact_dir: &Path) -> std::path::PathBuf {
    artifact_dir.join(MANIFEST_FILE_NAME)
}

pub fn write(artifact_dir: &Path, manifest: &ArtifactManifest) -> Result<(), ArtifactError> {
    let body = serde_json::to_string_pretty(manifest)
        .map_err(|e| ArtifactError::Corrupt(e.to_string()))?;
    std::fs::write(manifest_path(artifact_dir), body)?;
    Ok(())
}

pub fn read(artifact_dir: &Path) -> Result<ArtifactManifest, ArtifactError> {
    let path = manifest_path(artifact_dir);
    if !path.exists() {
        return Err(ArtifactError::NotFound(
            artifact_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ));
    }
    let raw = std::fs::read_to_string(&path)?;
    serde_json::from_str(&raw).map_err(|e| ArtifactError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pdk_core::pipeline::CompressionKind;

    fn sample_manifest() -> ArtifactManifest {
        ArtifactManifest {
            version: ArtifactManifest::SCHEMA_VERSION.to_string(),
            name: "build-output".to_string(),
            created_at: Utc::now(),
            compression: CompressionKind::Gzip,
            file_count: 0,
            total_size_bytes: 0,
            compressed_size_bytes: None,
            files: Vec::new(),
        }
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = sample_manifest();
        write(dir.path(), &manifest).unwrap();
        let read_back = read(dir.path()).unwrap();
        assert_eq!(read_back.name, "build-output");
        assert_eq!(read_back.version, "1.0");
    }

    #[test]
    fn read_missing_manifest_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read(dir.path()), Err(ArtifactError::NotFound(_))));
    }
}
