//! Retention purge for a shared cache root
//!
//! `MaxDirSize.txt` in the root caps its total size:
//!
//! ```text
//! # Indexes for generated FASTA files
//! MaxSizeGB=500
//! ```
//!
//! `PurgeInfoFile.txt` records when the root was last purged so that the many
//! jobs touching a root don't each rescan it.

use crate::artifact::{modified_utc, LAST_USED_EXTENSION, LOCK_EXTENSION, MANIFEST_EXTENSION};
use crate::clock::{elapsed_between, Clock};
use crate::lock::LockStatus;
use crate::remote::manifest::Manifest;
use crate::remote::{format_utc, last_used, parse_utc};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retention limit file
pub const POLICY_FILE: &str = "MaxDirSize.txt";

/// Last-purge sentinel file
pub const SENTINEL_FILE: &str = "PurgeInfoFile.txt";

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Parse `MaxDirSize.txt` contents into a byte limit
pub fn parse_max_size(content: &str) -> Option<u64> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| {
            let (key, value) = line.split_once('=')?;
            if !key.trim().eq_ignore_ascii_case("MaxSizeGB") {
                return None;
            }
            let gb: f64 = value.trim().parse().ok()?;
            (gb.is_finite() && gb > 0.0).then(|| (gb * BYTES_PER_GB as f64) as u64)
        })
}

/// What a purge did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Purge skipped because the root was purged recently
    pub throttled: bool,
    /// Size limit in force, if any
    pub limit_bytes: Option<u64>,
    /// Size of the root before purging
    pub total_before: u64,
    /// Size of the root after purging
    pub total_after: u64,
    /// Base names of deleted sets
    pub removed: Vec<String>,
    /// Sets left alone because a worker holds their lock
    pub skipped_locked: usize,
}

/// One published set found under a cache root
#[derive(Debug, Clone)]
struct CachedSet {
    dir: PathBuf,
    file_name: String,
    files: Vec<PathBuf>,
    size: u64,
    last_used: DateTime<Utc>,
}

/// Evicts least-recently-used sets from a cache root
#[derive(Clone)]
pub struct RetentionPurger {
    clock: Arc<dyn Clock>,
    interval: Duration,
    stale_after: Duration,
}

impl RetentionPurger {
    /// Create a purger that runs at most once per `interval` per root
    pub fn new(clock: Arc<dyn Clock>, interval: Duration, stale_after: Duration) -> Self {
        Self {
            clock,
            interval,
            stale_after,
        }
    }

    /// Purge `root` unless it was purged within the interval
    pub fn purge_if_due(&self, root: &Path) -> PurgeReport {
        let sentinel = root.join(SENTINEL_FILE);
        if let Some(last) = read_sentinel(&sentinel) {
            let since = elapsed_between(last, self.clock.now());
            if since < self.interval {
                debug!(
                    root = %root.display(),
                    hours_since = since.as_secs() / 3600,
                    "Retention purge not due"
                );
                return PurgeReport {
                    throttled: true,
                    ..PurgeReport::default()
                };
            }
        }
        self.purge(root)
    }

    /// Purge `root` now
    ///
    /// The sentinel is written before scanning so concurrent jobs back off.
    /// Problems are logged; nothing here fails the caller.
    pub fn purge(&self, root: &Path) -> PurgeReport {
        let mut report = PurgeReport::default();
        if !root.is_dir() {
            return report;
        }

        let sentinel = root.join(SENTINEL_FILE);
        if let Err(e) = fs::write(&sentinel, format!("{}\n", format_utc(self.clock.now()))) {
            warn!("Could not write purge sentinel {}: {}", sentinel.display(), e);
        }

        let limit = match fs::read_to_string(root.join(POLICY_FILE)) {
            Ok(content) => parse_max_size(&content),
            Err(_) => None,
        };
        let Some(limit) = limit else {
            debug!(root = %root.display(), "No retention limit configured");
            return report;
        };
        report.limit_bytes = Some(limit);

        let mut total = dir_size(root);
        report.total_before = total;
        if total <= limit {
            report.total_after = total;
            return report;
        }

        let mut sets = self.scan_sets(root);
        sets.sort_by_key(|set| set.last_used);

        for set in sets {
            if total <= limit {
                break;
            }
            let lock = set.dir.join(format!("{}.{}", set.file_name, LOCK_EXTENSION));
            if self.is_live_lock(&lock) {
                debug!(set = %set.file_name, "Skipping locked set");
                report.skipped_locked += 1;
                continue;
            }

            let mut freed = 0;
            for file in &set.files {
                let size = fs::metadata(file).map(|m| m.len()).unwrap_or(0);
                match fs::remove_file(file) {
                    Ok(()) => freed += size,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Could not purge {}: {}", file.display(), e),
                }
            }
            info!(
                set = %set.file_name,
                dir = %set.dir.display(),
                freed_mb = freed / (1024 * 1024),
                listed_mb = set.size / (1024 * 1024),
                "Purged cached index"
            );
            total = total.saturating_sub(freed);
            report.removed.push(set.file_name);
        }

        report.total_after = total;
        report
    }

    fn is_live_lock(&self, path: &Path) -> bool {
        match LockStatus::inspect(path) {
            Ok(status @ LockStatus::Held { .. }) => status
                .write_age(self.clock.now())
                .is_some_and(|age| age < self.stale_after),
            Ok(LockStatus::Absent) => false,
            // Unreadable marker; leave the set alone
            Err(_) => true,
        }
    }

    /// Find published sets (those with a manifest) under `root`/bucket/key space
    fn scan_sets(&self, root: &Path) -> Vec<CachedSet> {
        let manifest_suffix = format!(".{}", MANIFEST_EXTENSION);
        let mut sets = Vec::new();

        for bucket in subdirs(root) {
            for key_space in subdirs(&bucket) {
                let Ok(entries) = fs::read_dir(&key_space) else {
                    continue;
                };
                for entry in entries.filter_map(Result::ok) {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let Some(file_name) = name.strip_suffix(&manifest_suffix) else {
                        continue;
                    };
                    sets.push(self.describe_set(&key_space, file_name));
                }
            }
        }
        sets
    }

    /// A set is its manifest, the files the manifest lists and its last-use
    /// marker. The lock stays so a worker arriving mid-purge still sees it.
    fn describe_set(&self, dir: &Path, file_name: &str) -> CachedSet {
        let manifest_path = dir.join(format!("{}.{}", file_name, MANIFEST_EXTENSION));
        let last_used_path = dir.join(format!("{}.{}", file_name, LAST_USED_EXTENSION));

        // Manifest first so readers stop trusting the set before its files go
        let mut files = vec![manifest_path.clone()];
        match Manifest::read(&manifest_path) {
            Ok(Some(manifest)) => files.extend(
                manifest
                    .entries
                    .iter()
                    .map(|entry| dir.join(&entry.file_name)),
            ),
            Ok(None) => {}
            Err(e) => debug!("Purging only the markers of {}: {}", file_name, e),
        }
        files.push(last_used_path.clone());

        let size = files
            .iter()
            .filter_map(|f| fs::metadata(f).ok())
            .map(|m| m.len())
            .sum();

        let last_used = last_used::read(&last_used_path)
            .or_else(|| modified_utc(&manifest_path).ok())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        CachedSet {
            dir: dir.to_path_buf(),
            file_name: file_name.to_string(),
            files,
            size,
            last_used,
        }
    }
}

fn read_sentinel(path: &Path) -> Option<DateTime<Utc>> {
    let content = fs::read_to_string(path).ok()?;
    parse_utc(content.lines().next().unwrap_or("")).or_else(|| modified_utc(path).ok())
}

fn subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    dirs
}

/// Total size of regular files under `dir`
fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| match entry.file_type() {
            Ok(t) if t.is_dir() => dir_size(&entry.path()),
            Ok(t) if t.is_file() => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::lock::LockMarker;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn purger(clock: &FakeClock) -> RetentionPurger {
        RetentionPurger::new(Arc::new(clock.clone()), 24 * HOUR, HOUR)
    }

    fn publish_set(root: &Path, base: &str, bytes: usize, used: DateTime<Utc>) -> PathBuf {
        let dir = root.join("0").join("ForwardOnly");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{base}.canno")), vec![b'x'; bytes]).unwrap();
        fs::write(
            dir.join(format!("{base}.fasta.{MANIFEST_EXTENSION}")),
            format!("{base}.canno\t{bytes}\t\n"),
        )
        .unwrap();
        last_used::touch(&dir.join(format!("{base}.fasta.{LAST_USED_EXTENSION}")), used);
        dir
    }

    #[test]
    fn policy_file_parsing() {
        assert_eq!(parse_max_size("# limit\nMaxSizeGB=2\n"), Some(2 * BYTES_PER_GB));
        assert_eq!(parse_max_size("maxsizegb = 0.5"), Some(BYTES_PER_GB / 2));
        assert_eq!(parse_max_size("# MaxSizeGB=2\n"), None);
        assert_eq!(parse_max_size("MaxSizeGB=lots"), None);
        assert_eq!(parse_max_size(""), None);
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let root = TempDir::new().unwrap();
        let clock = FakeClock::new();
        let now = clock.now();
        // 0.000004 GB ~ 4294 bytes
        fs::write(root.path().join(POLICY_FILE), "MaxSizeGB=0.000004\n").unwrap();
        let dir = publish_set(root.path(), "ID_000001_A", 3000, now - ChronoDuration::days(30));
        publish_set(root.path(), "ID_000002_B", 3000, now - ChronoDuration::days(1));

        let report = purger(&clock).purge(root.path());

        assert_eq!(report.removed, vec!["ID_000001_A.fasta".to_string()]);
        assert!(!dir.join("ID_000001_A.canno").exists());
        assert!(dir.join("ID_000002_B.canno").exists());
        assert!(report.total_after <= report.limit_bytes.unwrap());
    }

    #[test]
    fn eviction_spares_sets_sharing_a_name_prefix() {
        let root = TempDir::new().unwrap();
        let clock = FakeClock::new();
        let now = clock.now();
        fs::write(root.path().join(POLICY_FILE), "MaxSizeGB=0.000004\n").unwrap();
        let dir = publish_set(root.path(), "yeast", 3000, now - ChronoDuration::days(30));
        publish_set(root.path(), "yeast.v2", 3000, now - ChronoDuration::days(1));
        fs::write(dir.join("yeast.notes.txt"), b"unlisted").unwrap();

        let report = purger(&clock).purge(root.path());

        assert_eq!(report.removed, vec!["yeast.fasta".to_string()]);
        assert!(!dir.join("yeast.canno").exists());
        assert!(!dir.join(format!("yeast.fasta.{MANIFEST_EXTENSION}")).exists());
        assert!(!dir.join(format!("yeast.fasta.{LAST_USED_EXTENSION}")).exists());
        assert!(dir.join("yeast.v2.canno").exists());
        assert!(dir.join(format!("yeast.v2.fasta.{MANIFEST_EXTENSION}")).exists());
        assert!(dir.join("yeast.notes.txt").exists());
    }

    #[test]
    fn locked_sets_survive() {
        let root = TempDir::new().unwrap();
        let clock = FakeClock::new();
        let now = clock.now();
        fs::write(root.path().join(POLICY_FILE), "MaxSizeGB=0.000001\n").unwrap();
        let dir = publish_set(root.path(), "ID_000001_A", 3000, now - ChronoDuration::days(30));
        fs::write(
            dir.join(format!("ID_000001_A.fasta.{LOCK_EXTENSION}")),
            LockMarker::new("busy", now).render(),
        )
        .unwrap();

        let report = purger(&clock).purge(root.path());

        assert!(report.removed.is_empty());
        assert_eq!(report.skipped_locked, 1);
        assert!(dir.join("ID_000001_A.canno").exists());
    }

    #[test]
    fn no_policy_file_means_no_purge() {
        let root = TempDir::new().unwrap();
        let clock = FakeClock::new();
        let dir = publish_set(root.path(), "ID_000001_A", 3000, clock.now());

        let report = purger(&clock).purge(root.path());

        assert_eq!(report.limit_bytes, None);
        assert!(dir.join("ID_000001_A.canno").exists());
        assert!(root.path().join(SENTINEL_FILE).exists());
    }

    #[test]
    fn throttled_within_interval() {
        let root = TempDir::new().unwrap();
        let clock = FakeClock::new();
        let purger = purger(&clock);

        assert!(!purger.purge_if_due(root.path()).throttled);
        clock.advance(23 * HOUR);
        assert!(purger.purge_if_due(root.path()).throttled);
        clock.advance(2 * HOUR);
        assert!(!purger.purge_if_due(root.path()).throttled);
    }
}
