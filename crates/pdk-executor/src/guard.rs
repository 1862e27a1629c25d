//! RAII guards for scoped resource acquisition (SPEC_FULL.md §5): a
//! container or a temp directory is released on every exit path, including
//! panics, via `Drop` rather than a `finally`-style block.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pdk_core::execution::ContainerManager;

/// Removes its container on drop. Best-effort: removal failures are logged,
/// never propagated, since a `Drop` impl cannot return a `Result`.
pub struct ContainerGuard {
    container_id: Option<String>,
    manager: Arc<dyn ContainerManager>,
}

impl ContainerGuard {
    pub fn new(container_id: String, manager: Arc<dyn ContainerManager>) -> Self {
        Self {
            container_id: Some(container_id),
            manager,
        }
    }

    pub fn id(&self) -> &str {
        self.container_id.as_deref().expect("guard already released")
    }

    /// Explicit async removal, for callers that want to observe failure.
    /// After this the `Drop` impl becomes a no-op.
    pub async fn release(mut self) {
        if let Some(id) = self.container_id.take() {
            if let Err(e) = self.manager.remove_container(&id).await {
                tracing::warn!(container_id = %id, error = %e, "failed to remove container");
            }
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if let Some(id) = self.container_id.take() {
            let manager = self.manager.clone();
            tokio::spawn(async move {
                if let Err(e) = manager.remove_container(&id).await {
                    tracing::warn!(container_id = %id, error = %e, "failed to remove container on drop");
                }
            });
        }
    }
}

/// Removes its directory tree on drop. Best-effort, matching §9's
/// "cleanup after cancellation is best-effort" decision.
pub struct TempDirGuard {
    path: Option<PathBuf>,
}

impl TempDirGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().expect("guard already released")
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove temp directory");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_guard_removes_directory_on_drop() {
        let dir = tempfile::tempdir().unwrap().into_path();
        std::fs::write(dir.join("file.txt"), b"hi").unwrap();
        {
            let _guard = TempDirGuard::new(dir.clone());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn temp_dir_guard_tolerates_already_removed_directory() {
        let dir = tempfile::tempdir().unwrap().into_path();
        std::fs::remove_dir_all(&dir).unwrap();
        let _guard = TempDirGuard::new(dir);
    }
}
