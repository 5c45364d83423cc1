//! Turning a finished run into a verdict
//!
//! Task-completion lines can lag the overall completion marker, so when a
//! run ends with fewer completed tasks than declared the console is re-read
//! for a short while before the counts are judged.

use crate::clock::{elapsed_between, Clock};
use crate::config::schema::SupervisorConfig;
use crate::error::{FidxError, FidxResult};
use crate::retry::{PollDecision, PollPolicy};
use crate::supervisor::{parse_console, ConsoleSummary};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Final classification of a job
#[derive(Debug)]
pub enum Verdict {
    /// Everything checked out
    Success,
    /// Usable result with caveats
    SuccessWithWarning(Vec<String>),
    /// The job failed
    Failure(FidxError),
}

impl Verdict {
    /// Success with or without warnings
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }

    /// Warnings attached to a successful verdict
    pub fn warnings(&self) -> &[String] {
        match self {
            Self::SuccessWithWarning(warnings) => warnings,
            _ => &[],
        }
    }

    /// Short label for logs and events
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SuccessWithWarning(_) => "success_with_warning",
            Self::Failure(_) => "failure",
        }
    }

    /// Combine with a further check; failures win, warnings accumulate
    pub fn and(self, other: Verdict) -> Verdict {
        match (self, other) {
            (Self::Failure(e), _) | (_, Self::Failure(e)) => Self::Failure(e),
            (Self::Success, Self::Success) => Self::Success,
            (a, b) => {
                let mut warnings = a.warnings().to_vec();
                warnings.extend_from_slice(b.warnings());
                Self::SuccessWithWarning(warnings)
            }
        }
    }
}

/// Judge completed vs declared task counts
///
/// All tasks done is a success; a single missing task is tolerated with a
/// warning; anything less fails.
pub fn classify_tasks(completed: u32, total: u32) -> Verdict {
    if completed >= total {
        Verdict::Success
    } else if completed + 1 == total {
        Verdict::SuccessWithWarning(vec![format!(
            "Only {} of {} search tasks reported completion",
            completed, total
        )])
    } else {
        Verdict::Failure(FidxError::TaskCountShortfall { completed, total })
    }
}

/// Judge the share of spectra skipped as not centroided
pub fn classify_skipped(
    summary: &ConsoleSummary,
    pre_centroided: bool,
    max_fraction: f64,
) -> Verdict {
    let skipped = summary.spectra_skipped;
    let total = skipped + summary.spectra_searched;
    let Some(fraction) = summary.skipped_fraction().filter(|_| skipped > 0) else {
        return Verdict::Success;
    };
    let percent = fraction * 100.0;

    if fraction > max_fraction && !pre_centroided {
        return Verdict::Failure(FidxError::SkippedSpectra {
            skipped,
            total,
            percent,
        });
    }
    Verdict::SuccessWithWarning(vec![format!(
        "{} of {} spectra ({:.1}%) were skipped as not centroided",
        skipped, total, percent
    )])
}

/// Re-reads task counts and renders the final verdict
#[derive(Clone)]
pub struct Reconciler {
    clock: Arc<dyn Clock>,
    repoll: PollPolicy,
    max_skipped_fraction: f64,
}

impl Reconciler {
    /// Create a reconciler
    pub fn new(clock: Arc<dyn Clock>, repoll: PollPolicy, max_skipped_fraction: f64) -> Self {
        Self {
            clock,
            repoll,
            max_skipped_fraction,
        }
    }

    /// Create a reconciler from configuration
    pub fn from_config(clock: Arc<dyn Clock>, config: &SupervisorConfig) -> Self {
        Self::new(
            clock,
            PollPolicy::new(
                std::time::Duration::from_secs(config.task_repoll_interval_secs),
                std::time::Duration::from_secs(config.task_repoll_max_secs),
            ),
            config.max_skipped_fraction,
        )
    }

    /// Re-read `console` until every declared task is reported or the
    /// re-poll budget is spent; returns the last summary
    pub async fn settle(&self, console: &Path) -> FidxResult<ConsoleSummary> {
        let started = self.clock.now();
        loop {
            let summary = read_console(console)?;
            let Some(total) = summary.tasks_total else {
                return Ok(summary);
            };
            if summary.tasks_completed >= total {
                return Ok(summary);
            }

            match self.repoll.decide(elapsed_between(started, self.clock.now())) {
                PollDecision::Wait(delay) => {
                    debug!(
                        completed = summary.tasks_completed,
                        total,
                        "Waiting for lagging task reports"
                    );
                    self.clock.sleep(delay).await;
                }
                PollDecision::GiveUp => return Ok(summary),
            }
        }
    }

    /// Verdict for the task counts and skipped spectra in `console`
    pub async fn reconcile(&self, console: &Path, pre_centroided: bool) -> FidxResult<Verdict> {
        let summary = self.settle(console).await?;

        let tasks = match summary.tasks_total {
            Some(total) => classify_tasks(summary.tasks_completed, total),
            None => Verdict::Success,
        };
        let skipped = classify_skipped(&summary, pre_centroided, self.max_skipped_fraction);
        let verdict = tasks.and(skipped);

        info!(
            completed = summary.tasks_completed,
            total = ?summary.tasks_total,
            skipped = summary.spectra_skipped,
            verdict = verdict.label(),
            "Reconciled search output"
        );
        Ok(verdict)
    }
}

fn read_console(console: &Path) -> FidxResult<ConsoleSummary> {
    let bytes = fs::read(console)
        .map_err(|e| FidxError::io(format!("reading console {}", console.display()), e))?;
    Ok(parse_console(&String::from_utf8_lossy(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::time::Duration;
    use tempfile::TempDir;

    fn reconciler(clock: &FakeClock) -> Reconciler {
        Reconciler::from_config(Arc::new(clock.clone()), &SupervisorConfig::default())
    }

    fn spectra(skipped: u64, searched: u64) -> ConsoleSummary {
        ConsoleSummary {
            spectra_skipped: skipped,
            spectra_searched: searched,
            ..ConsoleSummary::default()
        }
    }

    fn console_with_tasks(dir: &TempDir, completed: u32, total: u32) -> std::path::PathBuf {
        let mut text = format!("Splitting work into {total} tasks.\n");
        for task in 1..=completed {
            text.push_str(&format!("Task {task} completed.\n"));
        }
        let path = dir.path().join("console.txt");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn task_classification() {
        assert!(matches!(classify_tasks(128, 128), Verdict::Success));
        assert!(matches!(classify_tasks(127, 128), Verdict::SuccessWithWarning(_)));
        assert!(matches!(
            classify_tasks(126, 128),
            Verdict::Failure(FidxError::TaskCountShortfall { completed: 126, total: 128 })
        ));
    }

    #[test]
    fn skipped_classification() {
        assert!(matches!(
            classify_skipped(&spectra(25, 75), false, 0.2),
            Verdict::Failure(FidxError::SkippedSpectra { .. })
        ));
        assert!(matches!(
            classify_skipped(&spectra(25, 75), true, 0.2),
            Verdict::SuccessWithWarning(_)
        ));
        assert!(matches!(
            classify_skipped(&spectra(15, 85), false, 0.2),
            Verdict::SuccessWithWarning(_)
        ));
        assert!(matches!(classify_skipped(&spectra(0, 100), false, 0.2), Verdict::Success));
        assert!(matches!(classify_skipped(&spectra(0, 0), false, 0.2), Verdict::Success));
    }

    #[test]
    fn verdicts_combine() {
        let combined = Verdict::SuccessWithWarning(vec!["a".into()])
            .and(Verdict::SuccessWithWarning(vec!["b".into()]));
        assert_eq!(combined.warnings().to_vec(), vec!["a".to_string(), "b".to_string()]);
        assert!(!Verdict::Success.and(classify_tasks(1, 4)).is_success());
    }

    #[tokio::test]
    async fn shortfall_fails_after_full_repoll() {
        let dir = TempDir::new().unwrap();
        let console = console_with_tasks(&dir, 126, 128);
        let clock = FakeClock::new();
        let start = clock.now();

        let verdict = reconciler(&clock).reconcile(&console, false).await.unwrap();

        assert!(!verdict.is_success());
        assert_eq!(elapsed_between(start, clock.now()), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn complete_counts_return_without_waiting() {
        let dir = TempDir::new().unwrap();
        let console = console_with_tasks(&dir, 128, 128);
        let clock = FakeClock::new();
        let start = clock.now();

        let verdict = reconciler(&clock).reconcile(&console, false).await.unwrap();

        assert!(matches!(verdict, Verdict::Success));
        assert_eq!(clock.now(), start);
    }

    #[tokio::test]
    async fn lagging_task_report_is_picked_up() {
        let dir = TempDir::new().unwrap();
        let console = console_with_tasks(&dir, 126, 128);
        let clock = FakeClock::new();
        let reconciler = reconciler(&clock);

        let late_writer = async {
            clock.sleep(Duration::from_secs(12)).await;
            let mut text = fs::read_to_string(&console).unwrap();
            text.push_str("Task 127 completed.\nTask 128 completed.\n");
            fs::write(&console, text).unwrap();
        };
        let (verdict, ()) = tokio::join!(reconciler.reconcile(&console, false), late_writer);

        assert!(matches!(verdict.unwrap(), Verdict::Success));
    }

    #[tokio::test]
    async fn straggler_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let console = console_with_tasks(&dir, 127, 128);
        let clock = FakeClock::new();

        let verdict = reconciler(&clock).reconcile(&console, false).await.unwrap();

        assert!(matches!(verdict, Verdict::SuccessWithWarning(_)));
    }
}
