use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result, bail};
use fs2::FileExt;

/// Takes the exclusive instance lock at `path`.
///
/// Buffers live in process memory and pages are rewritten in place, so only
/// one process may poll and write at a time.  The lock is released when the
/// returned file is dropped.
pub(crate) fn acquire_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create lock folder {}", parent.display()))?;
        }
    }

    let lock_file =
        File::create(path).with_context(|| format!("open lock file {}", path.display()))?;
    if lock_file.try_lock_exclusive().is_err() {
        bail!(
            "another diarist instance is already running (lock held at {})",
            path.display()
        );
    }
    Ok(lock_file)
}
