//! Configuration schema for fidx
//!
//! Configuration is stored at `~/.config/fidx/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Local index settings
    pub index: IndexConfig,

    /// Shared remote cache settings
    pub cache: CacheConfig,

    /// Lock marker settings
    pub lock: LockConfig,

    /// External tool locations
    pub tool: ToolConfig,

    /// External process supervision
    pub supervisor: SupervisorConfig,
}

impl Config {
    /// Reject values that would make the poll loops or bucketing misbehave
    pub fn check(&self) -> Result<(), String> {
        if self.cache.bucket_size == 0 {
            return Err("cache.bucket_size must be positive".to_string());
        }
        if !self.lock.max_wait_hours.is_finite() || self.lock.max_wait_hours < 0.0 {
            return Err("lock.max_wait_hours must be a non-negative number".to_string());
        }
        if !(0.0..=1.0).contains(&self.supervisor.max_skipped_fraction) {
            return Err("supervisor.max_skipped_fraction must be within 0..1".to_string());
        }
        let intervals = [
            ("lock.poll_interval_secs", self.lock.poll_interval_secs),
            ("supervisor.poll_interval_secs", self.supervisor.poll_interval_secs),
            (
                "supervisor.task_repoll_interval_secs",
                self.supervisor.task_repoll_interval_secs,
            ),
        ];
        for (key, secs) in intervals {
            if secs == 0 {
                return Err(format!("{} must be at least 1", key));
            }
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable the JSON-lines job event journal
    pub event_log: bool,

    /// Owner identity written into lock markers (defaults to host name + pid)
    pub manager_name: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            event_log: true,
            manager_name: None,
        }
    }
}

/// Local index build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Minimum Java heap (MB) for index builds
    pub memory_hint_mb: u64,

    /// Tolerance when comparing artifact mtimes against the FASTA mtime
    pub clock_skew_tolerance_ms: u64,

    /// Extra free space required beyond the artifact set size
    pub disk_margin_mb: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            memory_hint_mb: 4000,
            clock_skew_tolerance_ms: 100,
            disk_margin_mb: 500,
        }
    }
}

impl IndexConfig {
    /// Clock-skew tolerance as a duration
    pub fn clock_skew_tolerance(&self) -> Duration {
        Duration::from_millis(self.clock_skew_tolerance_ms)
    }

    /// Safety margin in bytes
    pub fn disk_margin_bytes(&self) -> u64 {
        self.disk_margin_mb * 1024 * 1024
    }
}

/// Shared remote cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root for indexes of generated (ID-named) FASTA files
    pub generated_dir: Option<PathBuf>,

    /// Root for indexes of legacy FASTA files
    pub legacy_dir: Option<PathBuf>,

    /// Skip the shared cache entirely
    pub offline: bool,

    /// Generated IDs are grouped into buckets of this width
    pub bucket_size: u64,

    /// Minimum hours between retention purges of one cache root
    pub purge_interval_hours: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generated_dir: None,
            legacy_dir: None,
            offline: false,
            bucket_size: 1000,
            purge_interval_hours: 24,
        }
    }
}

/// Lock marker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Markers not written for this long are presumed abandoned
    pub stale_minutes: u32,

    /// Give up waiting this long after the marker was created
    pub max_wait_hours: f64,

    /// Delay between lock checks
    pub poll_interval_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_minutes: 60,
            max_wait_hours: 3.0,
            poll_interval_secs: 2,
        }
    }
}

impl LockConfig {
    /// Write-age threshold for stale markers
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(u64::from(self.stale_minutes) * 60)
    }

    /// Maximum wait measured from marker creation
    ///
    /// Values too large to represent saturate at [`Duration::MAX`].
    pub fn max_wait(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_wait_hours.max(0.0) * 3600.0)
            .unwrap_or(Duration::MAX)
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Java executable
    pub java_path: PathBuf,

    /// MS-GF+ jar
    pub jar_path: Option<PathBuf>,

    /// Main class that builds the suffix-array index
    pub build_entry_point: String,

    /// Java heap (MB) for searches
    pub search_memory_mb: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            java_path: PathBuf::from("java"),
            jar_path: None,
            build_entry_point: "edu.ucsd.msjava.msdbsearch.BuildSA".to_string(),
            search_memory_mb: 4000,
        }
    }
}

/// External process supervision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How often the console output is re-parsed
    pub poll_interval_secs: u64,

    /// Lower bound on the frozen-process wait after search completion
    pub frozen_min_wait_minutes: u64,

    /// Delay between task-count re-polls after exit
    pub task_repoll_interval_secs: u64,

    /// Total time spent re-polling task counts
    pub task_repoll_max_secs: u64,

    /// Fail when more than this fraction of spectra were skipped
    pub max_skipped_fraction: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            frozen_min_wait_minutes: 5,
            task_repoll_interval_secs: 5,
            task_repoll_max_secs: 45,
            max_skipped_fraction: 0.2,
        }
    }
}

impl SupervisorConfig {
    /// Console re-parse period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Lower bound on the frozen wait
    pub fn frozen_min_wait(&self) -> Duration {
        Duration::from_secs(self.frozen_min_wait_minutes * 60)
    }
}
