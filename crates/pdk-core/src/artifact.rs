//! Artifact data model and storage contract (SPEC_FULL.md §3, §4.4).
//!
//! `pdk-artifact` provides the concrete content-addressed filesystem
//! implementation; this crate only defines the shapes and the trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Result;
use crate::pipeline::{ArtifactOptions, CompressionKind};

/// A single file recorded in an artifact manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFileEntry {
    /// Path relative to the artifact root, forward-slash separated.
    pub path: String,
    pub size: u64,
    /// Lower-case hex, always 64 characters.
    pub sha256: String,
}

/// The persisted `artifact.metadata.json` manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub compression: CompressionKind,
    pub file_count: usize,
    pub total_size_bytes: u64,
    pub compressed_size_bytes: Option<u64>,
    pub files: Vec<ArtifactFileEntry>,
}

impl ArtifactManifest {
    pub const SCHEMA_VERSION: &'static str = "1.0";
}

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    pub storage_path: PathBuf,
    pub file_count: usize,
    pub total_size_bytes: u64,
    pub compressed_size_bytes: Option<u64>,
}

/// One progress update emitted during a long-running artifact operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactProgress {
    pub percent: u8,
    pub stage: String,
    pub current_file: Option<String>,
}

/// A selected file ready to be archived, paired with its path relative to
/// the workspace/artifact root.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub absolute_path: PathBuf,
    pub relative_path: String,
}

/// Trait for artifact storage backends (content-addressed, manifest-backed).
#[async_trait]
pub trait ArtifactEngine: Send + Sync {
    /// Store `files` under `name`, applying `options.compression`.
    async fn upload(
        &self,
        name: &str,
        files: &[SelectedFile],
        options: &ArtifactOptions,
    ) -> Result<UploadResult>;

    /// Restore a previously uploaded artifact into `destination`.
    async fn download(&self, name: &str, destination: &Path) -> Result<ArtifactManifest>;

    /// List all stored artifact names.
    async fn list(&self) -> Result<Vec<String>>;

    /// Whether an artifact with this name exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Remove an artifact entirely.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Delete every artifact older than `retention_days`; returns the count removed.
    async fn cleanup(&self, retention_days: u32) -> Result<u64>;
}
