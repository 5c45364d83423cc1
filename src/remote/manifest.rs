//! Index manifest (`<reference>.MSGFPlusIndexFileInfo`)
//!
//! One tab-separated line per artifact file, no header:
//!
//! ```text
//! ID_003456_9B916A8B.canno	1048576	2026-03-01 14:05:09
//! ```
//!
//! Only names and sizes are authoritative; the timestamp is informational.

use crate::error::{FidxError, FidxResult};
use crate::remote::{format_utc, parse_utc};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One artifact listed in a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// File name relative to the manifest's directory
    pub file_name: String,
    /// Size in bytes
    pub size: u64,
    /// Last write time when published
    pub modified: Option<DateTime<Utc>>,
}

/// Manifest describing a published artifact set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Listed artifacts
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parse manifest text; errors name the offending line
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut entries = Vec::new();

        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let file_name = fields.next().unwrap_or("").trim();
            let size = fields.next().unwrap_or("").trim();

            if file_name.is_empty() {
                return Err(format!("line {}: missing file name", index + 1));
            }
            if !is_plain_name(file_name) {
                return Err(format!(
                    "line {}: '{}' is not a plain file name",
                    index + 1,
                    file_name
                ));
            }
            let size: u64 = size
                .parse()
                .map_err(|_| format!("line {}: invalid size '{}'", index + 1, size))?;
            let modified = fields.next().and_then(parse_utc);

            entries.push(ManifestEntry {
                file_name: file_name.to_string(),
                size,
                modified,
            });
        }

        if entries.is_empty() {
            return Err("manifest lists no files".to_string());
        }

        Ok(Self { entries })
    }

    /// Render as manifest text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let modified = entry.modified.map(format_utc).unwrap_or_default();
            out.push_str(&format!("{}\t{}\t{}\n", entry.file_name, entry.size, modified));
        }
        out
    }

    /// Read the manifest at `path`; `Ok(None)` when it doesn't exist
    pub fn read(path: &Path) -> FidxResult<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FidxError::io(format!("reading manifest {}", path.display()), e)),
        };

        Self::parse(&content)
            .map(Some)
            .map_err(|reason| FidxError::ManifestInvalid {
                path: path.to_path_buf(),
                reason,
            })
    }

    /// Describe the given files as they currently exist on disk
    pub fn from_files(files: &[PathBuf]) -> FidxResult<Self> {
        let mut entries = Vec::with_capacity(files.len());
        for path in files {
            let metadata = fs::metadata(path)
                .map_err(|e| FidxError::io(format!("reading metadata of {}", path.display()), e))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            entries.push(ManifestEntry {
                file_name,
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        Ok(Self { entries })
    }

    /// Write to `path` via a temporary file and rename
    pub fn write(&self, path: &Path) -> FidxResult<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let temp = dir.join(format!(".manifest.{}.tmp", Uuid::new_v4()));

        fs::write(&temp, self.render())
            .map_err(|e| FidxError::io(format!("writing manifest {}", temp.display()), e))?;
        fs::rename(&temp, path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            FidxError::io(format!("renaming manifest into {}", path.display()), e)
        })
    }

    /// Look up an entry by file name
    pub fn get(&self, file_name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.file_name == file_name)
    }

    /// Sum of listed sizes
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// A single path component naming a file in the manifest's own directory
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_tab_separated() {
        let manifest = Manifest::parse(
            "yeast.canno\t1000\t2026-03-01 14:05:09\nyeast.cseq\t24\t\n\n",
        )
        .unwrap();

        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.get("yeast.canno").unwrap().size, 1000);
        assert!(manifest.get("yeast.canno").unwrap().modified.is_some());
        assert!(manifest.get("yeast.cseq").unwrap().modified.is_none());
        assert_eq!(manifest.total_size(), 1024);
    }

    #[test]
    fn parse_rejects_bad_size() {
        let err = Manifest::parse("yeast.canno\tbig\t\n").unwrap_err();
        assert!(err.contains("line 1"));
    }

    #[test]
    fn parse_rejects_names_outside_the_set_dir() {
        for name in ["../escaped.canno", "/etc/passwd", "sub/yeast.canno", "..", ".", "a\\b.cseq"] {
            let err = Manifest::parse(&format!("{name}\t10\t\n")).unwrap_err();
            assert!(err.contains("not a plain file name"), "{name}: {err}");
        }
        assert!(Manifest::parse("yeast..canno\t10\t\n").is_ok());
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(Manifest::parse("\n").is_err());
    }

    #[test]
    fn write_then_read_from_disk() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("yeast.canno");
        fs::write(&file, vec![0u8; 1000]).unwrap();

        let manifest = Manifest::from_files(&[file]).unwrap();
        let path = dir.path().join("yeast.fasta.MSGFPlusIndexFileInfo");
        manifest.write(&path).unwrap();

        let loaded = Manifest::read(&path).unwrap().unwrap();
        assert_eq!(loaded.entries[0].file_name, "yeast.canno");
        assert_eq!(loaded.entries[0].size, 1000);

        // No temporaries left behind
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(Manifest::read(&dir.path().join("none")).unwrap().is_none());
    }
}
