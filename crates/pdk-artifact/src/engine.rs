use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use pdk_core::Result;
use pdk_core::artifact::{ArtifactEngine, ArtifactManifest, SelectedFile, UploadResult};
use pdk_core::pipeline::{ArtifactOptions, CompressionKind};

use crate::compression;
use crate::error::ArtifactError;
use crate::manifest;

/// Filesystem-backed, content-addressed artifact store. Each artifact lives
/// under `<base>/<name>/` with a content directory, an optional archive,
/// and an `artifact.metadata.json` manifest (SPEC_FULL.md §4.4).
pub struct FsArtifactEngine {
    base: PathBuf,
}

impl FsArtifactEngine {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn artifact_dir(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }

    fn content_dir(&self, name: &str) -> PathBuf {
        self.artifact_dir(name).join("content")
    }
}

#[async_trait]
impl ArtifactEngine for FsArtifactEngine {
    async fn upload(
        &self,
        name: &str,
        files: &[SelectedFile],
        options: &ArtifactOptions,
    ) -> Result<UploadResult> {
        if files.is_empty() {
            return Err(ArtifactError::NoFilesMatched.into());
        }

        let artifact_dir = self.artifact_dir(name);
        if artifact_dir.exists() && !options.overwrite_existing {
            return Err(ArtifactError::AlreadyExists(name.to_string()).into());
        }
        if artifact_dir.exists() {
            std::fs::remove_dir_all(&artifact_dir).map_err(ArtifactError::Io)?;
        }
        let content_dir = self.content_dir(name);
        std::fs::create_dir_all(&content_dir).map_err(ArtifactError::Io)?;

        let entries = compression::materialize(files, &content_dir)?;
        let total_size_bytes: u64 = entries.iter().map(|e| e.size).sum();

        let compressed_size_bytes = match options.compression {
            CompressionKind::None => None,
            CompressionKind::Gzip => Some(compression::gzip(&content_dir, &artifact_dir, name)?),
            CompressionKind::Zip => Some(compression::zip_compress(&content_dir, &artifact_dir, name)?),
        };

        let manifest = ArtifactManifest {
            version: ArtifactManifest::SCHEMA_VERSION.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            compression: options.compression,
            file_count: entries.len(),
            total_size_bytes,
            compressed_size_bytes,
            files: entries,
        };
        manifest::write(&artifact_dir, &manifest)?;

        tracing::info!(artifact = name, files = manifest.file_count, "artifact uploaded");
        Ok(UploadResult {
            storage_path: artifact_dir,
            file_count: manifest.file_count,
            total_size_bytes: manifest.total_size_bytes,
            compressed_size_bytes: manifest.compressed_size_bytes,
        })
    }

    async fn download(&self, name: &str, destination: &Path) -> Result<ArtifactManifest> {
        let artifact_dir = self.artifact_dir(name);
        if !artifact_dir.exists() {
            return Err(ArtifactError::NotFound(name.to_string()).into());
        }
        let manifest = manifest::read(&artifact_dir)?;
        std::fs::create_dir_all(destination).map_err(ArtifactError::Io)?;

        let content_dir = self.content_dir(name);
        for entry in &manifest.files {
            let src = content_dir.join(&entry.path);
            let dst = destination.join(&entry.path);
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent).map_err(ArtifactError::Io)?;
            }
            std::fs::copy(&src, &dst).map_err(ArtifactError::Io)?;
        }

        tracing::info!(artifact = name, files = manifest.file_count, "artifact downloaded");
        Ok(manifest)
    }

    async fn list(&self) -> Result<Vec<String>> {
        if !self.base.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.base).map_err(ArtifactError::Io)? {
            let entry = entry.map_err(ArtifactError::Io)?;
            if entry.file_type().map_err(ArtifactError::Io)?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.artifact_dir(name).exists())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let artifact_dir = self.artifact_dir(name);
        if !artifact_dir.exists() {
            return Err(ArtifactError::NotFound(name.to_string()).into());
        }
        std::fs::remove_dir_all(&artifact_dir).map_err(ArtifactError::Io)?;
        Ok(())
    }

    async fn cleanup(&self, retention_days: u32) -> Result<u64> {
        let names = self.list().await?;
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        let mut removed = 0;
        for name in names {
            let artifact_dir = self.artifact_dir(&name);
            let manifest = match manifest::read(&artifact_dir) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if manifest.created_at < cutoff {
                std::fs::remove_dir_all(&artifact_dir).map_err(ArtifactError::Io)?;
                removed += 1;
            }
        }
        tracing::info!(removed, retention_days, "artifact cleanup complete");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdk_core::pipeline::IfNoFilesFound;

    fn options(compression: CompressionKind) -> ArtifactOptions {
        ArtifactOptions {
            compression,
            retention_days: 7,
            overwrite_existing: false,
            if_no_files_found: IfNoFilesFound::Error,
        }
    }

    fn selected_file(dir: &Path, name: &str, contents: &[u8]) -> SelectedFile {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        SelectedFile {
            absolute_path: path,
            relative_path: name.to_string(),
        }
    }

    #[tokio::test]
    async fn upload_then_download_roundtrips_file_contents() {
        let source = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let engine = FsArtifactEngine::new(store.path());

        let files = vec![selected_file(source.path(), "out.bin", b"payload")];
        let result = engine.upload("build", &files, &options(CompressionKind::None)).await.unwrap();
        assert_eq!(result.file_count, 1);

        let dest = tempfile::tempdir().unwrap();
        let manifest = engine.download("build", dest.path()).await.unwrap();
        assert_eq!(manifest.files.len(), 1);
        let restored = std::fs::read(dest.path().join("out.bin")).unwrap();
        assert_eq!(restored, b"payload");
    }

    #[tokio::test]
    async fn upload_with_gzip_records_compressed_size() {
        let source = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let engine = FsArtifactEngine::new(store.path());

        let files = vec![selected_file(source.path(), "a.txt", b"hello world")];
        let result = engine.upload("gz", &files, &options(CompressionKind::Gzip)).await.unwrap();
        assert!(result.compressed_size_bytes.unwrap() > 0);
    }

    #[tokio::test]
    async fn upload_empty_selection_errors() {
        let store = tempfile::tempdir().unwrap();
        let engine = FsArtifactEngine::new(store.path());
        let result = engine.upload("empty", &[], &options(CompressionKind::None)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn upload_without_overwrite_flag_rejects_duplicate_name() {
        let source = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let engine = FsArtifactEngine::new(store.path());
        let files = vec![selected_file(source.path(), "a.txt", b"1")];
        engine.upload("dup", &files, &options(CompressionKind::None)).await.unwrap();

        let files_again = vec![selected_file(source.path(), "a.txt", b"2")];
        let result = engine.upload("dup", &files_again, &options(CompressionKind::None)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_exists_and_delete_behave_consistently() {
        let source = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let engine = FsArtifactEngine::new(store.path());
        let files = vec![selected_file(source.path(), "a.txt", b"1")];
        engine.upload("one", &files, &options(CompressionKind::None)).await.unwrap();

        assert!(engine.exists("one").await.unwrap());
        assert_eq!(engine.list().await.unwrap(), vec!["one".to_string()]);

        engine.delete("one").await.unwrap();
        assert!(!engine.exists("one").await.unwrap());
    }
}
