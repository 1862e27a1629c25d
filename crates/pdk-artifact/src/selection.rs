//! Host-side glob selection (SPEC_FULL.md §4.4), mirroring the `find`
//! translation the container family relies on.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSetBuilder};
use pdk_core::artifact::SelectedFile;
use walkdir::WalkDir;

use crate::error::ArtifactError;

/// Select files under `base` matching `patterns`. Patterns are applied in
/// order: a `!`-prefixed pattern removes from the running match set,
/// everything else unions into it.
pub fn select_files(base: &Path, patterns: &[String]) -> Result<Vec<SelectedFile>, ArtifactError> {
    let mut includes = GlobSetBuilder::new();
    let mut excludes = GlobSetBuilder::new();
    let mut has_include = false;

    for pattern in patterns {
        if let Some(exclusion) = pattern.strip_prefix('!') {
            excludes.add(build_glob(exclusion)?);
        } else {
            includes.add(build_glob(pattern)?);
            has_include = true;
        }
    }

    if !has_include {
        return Ok(Vec::new());
    }

    let includes = includes
        .build()
        .map_err(|e| ArtifactError::Compression(format!("invalid glob pattern: {e}")))?;
    let excludes = excludes
        .build()
        .map_err(|e| ArtifactError::Compression(format!("invalid glob pattern: {e}")))?;

    let mut matched = Vec::new();
    for entry in WalkDir::new(base).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(base) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if includes.is_match(relative) && !excludes.is_match(relative) {
            matched.push(SelectedFile {
                absolute_path: entry.path().to_path_buf(),
                relative_path: to_forward_slash(relative),
            });
        }
    }

    matched.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(matched)
}

fn build_glob(pattern: &str) -> Result<Glob, ArtifactError> {
    // `literal_separator(true)` keeps `*` from crossing `/`, matching the
    // container family's `find -name` semantics for a single path segment;
    // `**` still gets its normal recursive-descent meaning.
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| ArtifactError::Compression(format!("invalid glob pattern '{pattern}': {e}")))
}

fn to_forward_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve `target_path` against the workspace root, defaulting to the
/// workspace root itself when no override was given.
pub fn resolve_base(workspace: &Path, target_path: Option<&str>) -> PathBuf {
    match target_path {
        Some(p) => workspace.join(p),
        None => workspace.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn selects_files_matching_recursive_glob() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.txt");
        touch(dir.path(), "nested/b.txt");
        touch(dir.path(), "nested/deeper/c.log");

        let patterns = vec!["**/*.txt".to_string()];
        let selected = select_files(dir.path(), &patterns).unwrap();
        let mut paths: Vec<_> = selected.iter().map(|f| f.relative_path.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec!["a.txt".to_string(), "nested/b.txt".to_string()]);
    }

    #[test]
    fn exclusion_pattern_removes_matches() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "keep.txt");
        touch(dir.path(), "skip.txt");

        let patterns = vec!["*.txt".to_string(), "!skip.txt".to_string()];
        let selected = select_files(dir.path(), &patterns).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].relative_path, "keep.txt");
    }

    #[test]
    fn no_include_patterns_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.txt");
        let selected = select_files(dir.path(), &["!a.txt".to_string()]).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn resolve_base_defaults_to_workspace_root() {
        let workspace = Path::new("/work");
        assert_eq!(resolve_base(workspace, None), PathBuf::from("/work"));
        assert_eq!(resolve_base(workspace, Some("out")), PathBuf::from("/work/out"));
    }
}
