use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use pdk_core::artifact::{ArtifactFileEntry, SelectedFile};
use sha2::{Digest, Sha256};
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::error::ArtifactError;

const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Hash a file in fixed-size chunks so large artifacts don't balloon memory.
pub fn hash_file(path: &Path) -> Result<String, ArtifactError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Copy each selected file into `content_dir` preserving its relative path,
/// returning the manifest entries (unsorted order matches `files`).
pub fn materialize(
    files: &[SelectedFile],
    content_dir: &Path,
) -> Result<Vec<ArtifactFileEntry>, ArtifactError> {
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let dest = content_dir.join(&file.relative_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&file.absolute_path, &dest)?;
        let size = std::fs::metadata(&dest)?.len();
        let sha256 = hash_file(&dest)?;
        entries.push(ArtifactFileEntry {
            path: file.relative_path.clone(),
            size,
            sha256,
        });
    }
    Ok(entries)
}

/// Compress `content_dir` into `<artifact_dir>/<name>.tar.gz`, returning the
/// compressed size in bytes.
pub fn gzip(content_dir: &Path, artifact_dir: &Path, name: &str) -> Result<u64, ArtifactError> {
    let archive_path = artifact_dir.join(format!("{name}.tar.gz"));
    let file = File::create(&archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(".", content_dir)
        .map_err(|e| ArtifactError::Compression(e.to_string()))?;
    builder
        .into_inner()
        .map_err(|e| ArtifactError::Compression(e.to_string()))?
        .finish()
        .map_err(|e| ArtifactError::Compression(e.to_string()))?;
    Ok(std::fs::metadata(&archive_path)?.len())
}

/// Compress `content_dir` into `<artifact_dir>/<name>.zip`, returning the
/// compressed size in bytes.
pub fn zip_compress(content_dir: &Path, artifact_dir: &Path, name: &str) -> Result<u64, ArtifactError> {
    let archive_path = artifact_dir.join(format!("{name}.zip"));
    let file = File::create(&archive_path)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options: FileOptions<()> = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in walkdir::WalkDir::new(content_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let relative = entry
            .path()
            .strip_prefix(content_dir)
            .map_err(|e| ArtifactError::Compression(e.to_string()))?;
        let name = relative.to_string_lossy().replace('\\', "/");
        writer
            .start_file(name, options)
            .map_err(|e| ArtifactError::Compression(e.to_string()))?;
        let mut source = File::open(entry.path())?;
        std::io::copy(&mut source, &mut writer).map_err(|e| ArtifactError::Compression(e.to_string()))?;
    }

    writer
        .finish()
        .map_err(|e| ArtifactError::Compression(e.to_string()))?
        .flush()?;
    Ok(std::fs::metadata(&archive_path)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_file_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let a = hash_file(&path).unwrap();
        let b = hash_file(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn gzip_produces_nonempty_archive() {
        let content = tempfile::tempdir().unwrap();
        std::fs::write(content.path().join("a.txt"), b"payload").unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let size = gzip(content.path(), out_dir.path(), "sample").unwrap();
        assert!(size > 0);
        assert!(out_dir.path().join("sample.tar.gz").exists());
    }

    #[test]
    fn zip_produces_nonempty_archive() {
        let content = tempfile::tempdir().unwrap();
        std::fs::write(content.path().join("a.txt"), b"payload").unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let size = zip_compress(content.path(), out_dir.path(), "sample").unwrap();
        assert!(size > 0);
        assert!(out_dir.path().join("sample.zip").exists());
    }
}
