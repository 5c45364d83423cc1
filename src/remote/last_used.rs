//! Last-used markers (`<reference>.LastUsed`)
//!
//! A single UTC timestamp, rewritten every time a set is fetched or built.
//! Retention purges evict the sets with the oldest markers first.

use crate::artifact::modified_utc;
use crate::remote::{format_utc, parse_utc};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Record `now` in the marker at `path`; failures are logged
pub fn touch(path: &Path, now: DateTime<Utc>) {
    match fs::write(path, format!("{}\n", format_utc(now))) {
        Ok(()) => debug!("Updated last-used marker {}", path.display()),
        Err(e) => warn!("Could not update last-used marker {}: {}", path.display(), e),
    }
}

/// Timestamp recorded in the marker, falling back to its mtime
pub fn read(path: &Path) -> Option<DateTime<Utc>> {
    let content = fs::read_to_string(path).ok()?;
    parse_utc(content.lines().next().unwrap_or("")).or_else(|| modified_utc(path).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn touch_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("yeast.fasta.LastUsed");
        let when = Utc.with_ymd_and_hms(2025, 12, 24, 8, 0, 0).unwrap();

        touch(&path, when);

        assert_eq!(read(&path), Some(when));
    }

    #[test]
    fn unparsable_falls_back_to_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("yeast.fasta.LastUsed");
        fs::write(&path, "recently").unwrap();

        assert!(read(&path).is_some());
    }

    #[test]
    fn missing_marker() {
        let dir = TempDir::new().unwrap();
        assert!(read(&dir.path().join("x.LastUsed")).is_none());
    }
}
