//! Lock marker file format
//!
//! ```text
//! Date: 2026-03-01T14:05:09.123-08:00
//! Manager: worker-17:4182
//! ```

use chrono::{DateTime, Local, Utc};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Contents of a lock marker file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockMarker {
    /// When the marker was written
    pub created: DateTime<Utc>,
    /// Identity of the worker that wrote it
    pub owner: String,
}

impl LockMarker {
    /// Create a marker for `owner`
    pub fn new(owner: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            created,
            owner: owner.into(),
        }
    }

    /// Render the two-line file body
    pub fn render(&self) -> String {
        format!(
            "Date: {}\nManager: {}\n",
            self.created.with_timezone(&Local).to_rfc3339(),
            self.owner
        )
    }

    /// Parse a file body; `None` unless the `Date:` line is readable
    pub fn parse(content: &str) -> Option<Self> {
        let mut created = None;
        let mut owner = String::new();

        for line in content.lines() {
            if let Some(value) = line.strip_prefix("Date:") {
                created = DateTime::parse_from_rfc3339(value.trim())
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc));
            } else if let Some(value) = line.strip_prefix("Manager:") {
                owner = value.trim().to_string();
            }
        }

        created.map(|created| Self { created, owner })
    }
}

/// Observed state of a marker path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// No marker file
    Absent,
    /// Marker exists
    Held {
        /// Owner named in the marker (empty when unreadable)
        owner: String,
        /// Creation time from the marker body, or its mtime
        created: DateTime<Utc>,
        /// Last write time of the marker file
        modified: DateTime<Utc>,
    },
}

impl LockStatus {
    /// Inspect the marker at `path`
    pub fn inspect(path: &Path) -> std::io::Result<Self> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::Absent),
            Err(e) => return Err(e),
        };
        let modified = DateTime::<Utc>::from(metadata.modified()?);

        // The holder may delete it between the stat and the read
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::Absent),
            Err(_) => String::new(),
        };

        let (owner, created) = match LockMarker::parse(&content) {
            Some(marker) => (marker.owner, marker.created),
            None => (String::new(), modified),
        };

        Ok(Self::Held {
            owner,
            created,
            modified,
        })
    }

    /// Time since the marker was last written
    pub fn write_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Absent => None,
            Self::Held { modified, .. } => Some(crate::clock::elapsed_between(*modified, now)),
        }
    }

    /// Time since the marker was created
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Absent => None,
            Self::Held { created, .. } => Some(crate::clock::elapsed_between(*created, now)),
        }
    }
}

/// Owner identity for markers written by this process
pub fn default_owner() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .ok()
        .or_else(|| {
            fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
        })
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}:{}", host, std::process::id())
}
