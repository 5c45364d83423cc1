//! Local artifact set validation
//!
//! A set is usable when it is complete (every expected suffix exists), fresh
//! (legacy references only: no artifact older than the FASTA file) and in a
//! format the current tool understands.

use crate::artifact::{modified_utc, DecoyMode, ReferenceFile};
use crate::error::{FidxError, FidxResult};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Bytes read from the annotation file for the format check
const FORMAT_PROBE_BYTES: u64 = 4096;

/// Result of validating one artifact set
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Every expected suffix exists
    pub complete: bool,
    /// No artifact predates the source (always true for generated references)
    pub fresh: bool,
    /// The annotation file is in the current format
    pub format_ok: bool,
    /// Artifacts that exist
    pub found: Vec<PathBuf>,
    /// Suffixes that are missing
    pub missing: Vec<String>,
    /// Artifacts older than the source file
    pub outdated: Vec<PathBuf>,
}

impl ValidationReport {
    /// Usable as-is
    pub fn is_valid(&self) -> bool {
        self.complete && self.fresh && self.format_ok
    }

    /// One-line description for logs
    pub fn summary(&self) -> String {
        if self.is_valid() {
            return format!("{} artifact(s) valid", self.found.len());
        }
        let mut problems = Vec::new();
        if !self.missing.is_empty() {
            problems.push(format!("missing {}", self.missing.join(", ")));
        }
        if !self.fresh {
            problems.push(format!("{} artifact(s) older than source", self.outdated.len()));
        }
        if self.complete && !self.format_ok {
            problems.push("incompatible annotation format".to_string());
        }
        problems.join("; ")
    }
}

/// Checks completeness, freshness and format of local artifact sets
#[derive(Debug, Clone)]
pub struct ArtifactValidator {
    skew_tolerance: Duration,
}

impl ArtifactValidator {
    /// Create a validator with the given mtime tolerance
    pub fn new(skew_tolerance: Duration) -> Self {
        Self { skew_tolerance }
    }

    /// Tolerance applied to mtime comparisons
    pub fn skew_tolerance(&self) -> Duration {
        self.skew_tolerance
    }

    /// Validate the artifacts beside the reference file
    pub fn validate(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
    ) -> FidxResult<ValidationReport> {
        self.validate_in(&reference.dir(), reference, mode)
    }

    /// Validate the artifacts in `dir`
    pub fn validate_in(
        &self,
        dir: &Path,
        reference: &ReferenceFile,
        mode: DecoyMode,
    ) -> FidxResult<ValidationReport> {
        let mut report = ValidationReport::default();

        for suffix in mode.suffixes() {
            let path = reference.artifact_path(dir, suffix);
            if path.is_file() {
                report.found.push(path);
            } else {
                report.missing.push(suffix.to_string());
            }
        }

        report.complete = report.missing.is_empty();
        if !report.complete {
            debug!(
                reference = reference.file_name(),
                "Index incomplete: {}",
                report.missing.join(", ")
            );
            return Ok(report);
        }

        report.fresh = true;
        if !reference.is_generated() {
            let source_mtime = reference.modified()?;
            let threshold = source_mtime
                - chrono::Duration::from_std(self.skew_tolerance)
                    .unwrap_or(chrono::Duration::zero());

            for path in &report.found {
                let mtime = modified_utc(path)
                    .map_err(|e| FidxError::io(format!("reading mtime of {}", path.display()), e))?;
                if mtime < threshold {
                    report.outdated.push(path.clone());
                }
            }
            report.fresh = report.outdated.is_empty();
        }

        let annotation = reference.artifact_path(dir, ".canno");
        report.format_ok = !is_legacy_annotation(&annotation)?;

        debug!(
            reference = reference.file_name(),
            mode = %mode,
            "Index validation: {}",
            report.summary()
        );
        Ok(report)
    }
}

/// Detect the obsolete annotation layout: a bare number on line 1 followed
/// by a line starting with a letter
pub fn is_legacy_annotation(path: &Path) -> FidxResult<bool> {
    let file =
        File::open(path).map_err(|e| FidxError::io(format!("opening {}", path.display()), e))?;
    let mut buf = Vec::new();
    file.take(FORMAT_PROBE_BYTES)
        .read_to_end(&mut buf)
        .map_err(|e| FidxError::io(format!("reading {}", path.display()), e))?;

    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.lines();
    let first = lines.next().unwrap_or("").trim();
    let second = lines.next().unwrap_or("").trim_start();

    let numeric_first = !first.is_empty() && first.parse::<i64>().is_ok();
    let alphabetic_second = second
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic());

    Ok(numeric_first && alphabetic_second)
}
