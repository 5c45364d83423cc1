//! Copying files onto shared storage without exposing partial writes

use crate::lock::LockMarker;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Path of the marker guarding a copy into `dest`
fn copy_lock_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    dest.with_file_name(name)
}

/// Copy `src` to `dest` through a uniquely named temporary file
///
/// A marker (`<dest>.lock`) announces the copy while it runs. The data lands
/// under a temporary name and is renamed into place, so concurrent copiers
/// and readers only ever see a complete destination file. Returns the number
/// of bytes copied.
pub fn copy_with_lock(src: &Path, dest: &Path, owner: &str) -> std::io::Result<u64> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let dest_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = dir.join(format!(".{}.{}.tmp", dest_name, Uuid::new_v4()));
    let lock = copy_lock_path(dest);

    fs::write(&lock, LockMarker::new(owner, Utc::now()).render())?;

    let result = fs::copy(src, &temp).and_then(|bytes| {
        fs::rename(&temp, dest)?;
        Ok(bytes)
    });

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    let _ = fs::remove_file(&lock);

    if let Ok(bytes) = result {
        debug!("Copied {} -> {} ({} bytes)", src.display(), dest.display(), bytes);
    }
    result
}
