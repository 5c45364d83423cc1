//! Shared remote index cache
//!
//! Index sets are published to a shared directory tree so other workers can
//! copy them instead of rebuilding.
//!
//! ```text
//! <root>/                      generated_dir or legacy_dir
//!   PurgeInfoFile.txt          last retention purge
//!   MaxDirSize.txt             retention limit
//!   3000/                      bucket: floor(id / 1000) * 1000, or Other
//!     ForwardReverse/          decoy key space
//!       ID_003456_9B916A8B.canno ...
//!       ID_003456_9B916A8B.fasta.MSGFPlusIndexFileInfo
//!       ID_003456_9B916A8B.fasta.LastUsed
//!       ID_003456_9B916A8B.fasta.lock
//! ```
//!
//! Publishing writes files first and the manifest last, so a reader that
//! finds a manifest can trust every file it lists is in place.

pub mod client;
pub mod copy;
pub mod last_used;
pub mod manifest;
pub mod purge;

pub use client::{PullOutcome, RemoteCache};
pub use copy::copy_with_lock;
pub use manifest::{Manifest, ManifestEntry};
pub use purge::{PurgeReport, RetentionPurger, POLICY_FILE};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamp layout used in manifests and marker files (UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a UTC timestamp for a marker or manifest
pub fn format_utc(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_utc`]
pub fn parse_utc(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
