//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! reduce duplicated `create_dir_all` / parent-directory checks.

use std::path::Path;

use tracing::debug;

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io_path(op, path, e))
}

/// Ensure the parent directory of a file path exists with a custom operation label.
pub async fn ensure_parent_dir_with_op(op: &'static str, path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    ensure_dir_all_with_op(op, parent).await
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_path(op, path, e))
}

/// Move a file, falling back to copy + remove when `rename` cannot cross
/// filesystems.
pub async fn move_file(from: &Path, to: &Path) -> Result<()> {
    ensure_parent_dir_with_op("creating destination directory", to).await?;

    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(
                from = %from.display(),
                to = %to.display(),
                error = %e,
                "rename failed, falling back to copy"
            );
            tokio::fs::copy(from, to)
                .await
                .map_err(|e| Error::io_path("copying file", to, e))?;
            tokio::fs::remove_file(from)
                .await
                .map_err(|e| Error::io_path("removing file", from, e))
        }
    }
}
