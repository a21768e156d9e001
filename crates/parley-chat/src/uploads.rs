use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

/// Local directory that upload-relative paths (`uploads/chat/...`) resolve
/// against. Only used to clean up files when a message is deleted.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for an upload-relative path, or `None` if the path
    /// would leave the root.
    pub fn file_path(&self, rel: &str) -> Option<PathBuf> {
        let rel = Path::new(rel);
        if rel.as_os_str().is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(rel))
    }

    /// Delete the given files. Missing files and I/O errors are logged and
    /// skipped, as are files whose real path (symlinks resolved) leaves the
    /// root. Returns how many files were removed.
    pub fn remove_files(&self, rel_paths: &[String]) -> usize {
        let root = match std::fs::canonicalize(&self.root) {
            Ok(root) => root,
            Err(e) => {
                warn!("Upload root {} unavailable: {}", self.root.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for rel in rel_paths {
            let Some(path) = self.file_path(rel) else {
                warn!("Refusing to delete upload outside root: {}", rel);
                continue;
            };
            let path = match std::fs::canonicalize(&path) {
                Ok(real) if real.starts_with(&root) => real,
                Ok(real) => {
                    warn!("Refusing to delete {}: resolves to {}", rel, real.display());
                    continue;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Upload {} already gone", path.display());
                    continue;
                }
                Err(e) => {
                    warn!("Failed to resolve upload {}: {}", path.display(), e);
                    continue;
                }
            };
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!("Deleted upload {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Upload {} already gone", path.display());
                }
                Err(e) => {
                    warn!("Failed to delete upload {}: {}", path.display(), e);
                }
            }
        }
        removed
    }
}
