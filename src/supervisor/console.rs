//! Parsing the search tool's console output
//!
//! The tool reports its own state only through free-form console lines, so
//! every signal the supervisor acts on is recovered here.
//!
//! | Line | Effect |
//! |------|--------|
//! | `MS-GF+ Release (v2024.03.26) (26 March 2024)` | version |
//! | `Loading database files...` | progress 1 |
//! | `Reading spectra...` | progress 2 |
//! | `Ignoring 25 profile spectra.` | skipped spectra |
//! | `Spectrum 0-74 (total: 75)` | searched spectra |
//! | `Splitting work into 128 tasks.` | task total |
//! | `Search progress: 64 / 128 tasks, 50.0%` | progress 2-95 |
//! | `Task 17 completed.` | completed task |
//! | `Computing spectral E-values...` | progress 95, search complete |
//! | `Computing q-values...` | progress 96 |
//! | `Writing results...` | progress 98 |
//! | `MS-GF+ complete (total elapsed time: 512.3 sec)` | progress 100 |

use std::collections::BTreeSet;

/// Progress at which the search itself is finished and only post-processing
/// remains
pub const SEARCH_COMPLETE_PROGRESS: f32 = 95.0;

/// Substrings that mark an error line
const ERROR_MARKERS: &[&str] = &["Exception", "OutOfMemoryError", "Error:"];

/// Error lines kept per run
const MAX_ERROR_LINES: usize = 20;

/// Everything recovered from one pass over the console output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsoleSummary {
    /// Tool version, from the banner
    pub version: Option<String>,
    /// Highest progress percentage reported
    pub progress: f32,
    /// Declared number of parallel tasks
    pub tasks_total: Option<u32>,
    /// Number of tasks reported complete
    pub tasks_completed: u32,
    /// Spectra skipped as not centroided
    pub spectra_skipped: u64,
    /// Spectra searched
    pub spectra_searched: u64,
    /// Lines matching an error marker
    pub errors: Vec<String>,
}

impl ConsoleSummary {
    /// Search has reached post-processing
    pub fn search_complete(&self) -> bool {
        self.progress >= SEARCH_COMPLETE_PROGRESS
    }

    /// Fraction of spectra skipped, when any were seen
    pub fn skipped_fraction(&self) -> Option<f64> {
        let total = self.spectra_skipped + self.spectra_searched;
        (total > 0).then(|| self.spectra_skipped as f64 / total as f64)
    }
}

/// Parse the full console text
pub fn parse_console(text: &str) -> ConsoleSummary {
    let mut summary = ConsoleSummary::default();
    let mut completed = BTreeSet::new();
    let mut reported_completed = 0;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if summary.version.is_none() {
            if let Some(version) = parse_version(line) {
                summary.version = Some(version.to_string());
                continue;
            }
        }

        if let Some(n) = parse_count(line, "Ignoring ", " profile spectra") {
            summary.spectra_skipped += n;
        } else if let Some(total) = parse_spectrum_range(line) {
            summary.spectra_searched = summary.spectra_searched.max(total);
        } else if let Some(n) = parse_count(line, "Splitting work into ", " tasks") {
            summary.tasks_total = Some(n as u32);
        } else if let Some((done, total, percent)) = parse_search_progress(line) {
            reported_completed = reported_completed.max(done);
            summary.tasks_total.get_or_insert(total);
            raise(&mut summary.progress, 2.0 + percent * 0.93);
        } else if let Some(task) = parse_count(line, "Task ", " completed") {
            completed.insert(task);
        } else if let Some(progress) = milestone(line) {
            raise(&mut summary.progress, progress);
        }

        if ERROR_MARKERS.iter().any(|m| line.contains(m))
            && summary.errors.len() < MAX_ERROR_LINES
            && !summary.errors.iter().any(|e| e == line)
        {
            summary.errors.push(line.to_string());
        }
    }

    summary.tasks_completed = (completed.len() as u32).max(reported_completed);
    summary
}

fn raise(progress: &mut f32, value: f32) {
    if value > *progress {
        *progress = value.min(100.0);
    }
}

fn milestone(line: &str) -> Option<f32> {
    let progress = if line.starts_with("Loading database") {
        1.0
    } else if line.starts_with("Reading spectra") {
        2.0
    } else if line.starts_with("Computing spectral E-values") {
        SEARCH_COMPLETE_PROGRESS
    } else if line.starts_with("Computing q-values") {
        96.0
    } else if line.starts_with("Writing results") {
        98.0
    } else if line.starts_with("MS-GF+ complete") {
        100.0
    } else {
        return None;
    };
    Some(progress)
}

/// `MS-GF+ Release (v2024.03.26) (26 March 2024)` -> `v2024.03.26`
fn parse_version(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("MS-GF+ Release")?.trim_start();
    let rest = rest.strip_prefix('(')?;
    let end = rest.find(')')?;
    Some(rest[..end].trim())
}

/// Number between a fixed prefix and suffix, e.g. `Task 17 completed.`
fn parse_count(line: &str, prefix: &str, suffix: &str) -> Option<u64> {
    let rest = line.strip_prefix(prefix)?;
    let end = rest.find(suffix)?;
    rest[..end].trim().parse().ok()
}

/// `Spectrum 0-74 (total: 75)` -> 75
fn parse_spectrum_range(line: &str) -> Option<u64> {
    let rest = line.strip_prefix("Spectrum ")?;
    let start = rest.find("(total:")? + "(total:".len();
    let end = rest[start..].find(')')? + start;
    rest[start..end].trim().parse().ok()
}

/// `Search progress: 64 / 128 tasks, 50.0%` -> (64, 128, 50.0)
fn parse_search_progress(line: &str) -> Option<(u32, u32, f32)> {
    let rest = line.strip_prefix("Search progress:")?;
    let (counts, percent) = rest.split_once(',')?;
    let (done, total) = counts.trim().trim_end_matches("tasks").split_once('/')?;
    let done: u32 = done.trim().parse().ok()?;
    let total: u32 = total.trim().parse().ok()?;
    let percent: f32 = percent.trim().trim_end_matches('%').trim().parse().ok()?;
    if done > total || !(0.0..=100.0).contains(&percent) {
        return None;
    }
    Some((done, total, percent))
}
