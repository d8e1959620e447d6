//! Storage-path resolution
//!
//! Image records store deployment-independent paths (usually
//! `uploads/<file>`); every consumer resolves them through this one rule
//! instead of re-deriving the layout per call site.

use crate::config::StorageConfig;
use std::path::{Component, Path, PathBuf};

/// Resolve a stored image path to an absolute on-disk path.
///
/// Absolute paths pass through unchanged. Relative paths under the
/// `uploads/` prefix join the configured base directory; anything else is
/// treated as a bare file name inside the upload directory.
pub fn resolve_storage_path(stored: &Path, storage: &StorageConfig) -> PathBuf {
    if stored.is_absolute() {
        return stored.to_path_buf();
    }

    let under_uploads = matches!(
        stored.components().next(),
        Some(Component::Normal(first)) if first == "uploads"
    );
    if under_uploads {
        return storage.base_dir.join(stored);
    }

    match stored.file_name() {
        Some(name) => storage.upload_dir.join(name),
        None => storage.upload_dir.clone(),
    }
}
