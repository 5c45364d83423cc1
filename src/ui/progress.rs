//! Progress indicators with batch-log fallback

use super::context::UiContext;
use crate::supervisor::RunState;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Plain output reports progress in steps of this many percent
const PLAIN_STEP_PERCENT: u64 = 10;

/// A task spinner with plain fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    /// Create a spinner; nothing is shown until `start`
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.stop(message),
            None => println!("{} {}", style("[OK]").green(), message),
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.error(message),
            None => println!("{} {}", style("[FAIL]").red(), message),
        }
    }
}

/// Progress bar for a supervised search
///
/// Driven by the parsed console state. Interactive terminals get an
/// indicatif bar; batch logs get one line per ten percent.
pub struct SearchProgress {
    bar: Option<ProgressBar>,
    last_reported: Option<u64>,
}

impl SearchProgress {
    /// Create a progress indicator labelled with the spectra file
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(100);
            let template = "  {spinner:.cyan} Searching {prefix}  {bar:20.cyan/dim} {pos:>3}% {msg:.dim}  {elapsed:.dim}";
            if let Ok(bar_style) = ProgressStyle::default_bar().template(template) {
                bar.set_style(
                    bar_style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .progress_chars("━╸─"),
                );
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Searching {}...", label);
            None
        };
        Self {
            bar,
            last_reported: None,
        }
    }

    /// Reflect the latest run state
    pub fn update(&mut self, state: &RunState) {
        let percent = state.progress.clamp(0.0, 100.0) as u64;
        if let Some(ref bar) = self.bar {
            bar.set_position(percent);
            bar.set_message(task_message(state));
        } else if let Some(milestone) = plain_milestone(self.last_reported, percent) {
            self.last_reported = Some(milestone);
            println!("  {}% {}", milestone, task_message(state));
        }
    }

    /// Finish and clear the bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// Short description of task counts, e.g. `12/128 tasks`
fn task_message(state: &RunState) -> String {
    match state.tasks_total {
        Some(total) => format!("{}/{} tasks", state.tasks_completed, total),
        None if state.spectra_searched > 0 => format!("{} spectra", state.spectra_searched),
        None => String::new(),
    }
}

/// Next ten-percent mark to print, if `percent` has reached a new one
fn plain_milestone(last: Option<u64>, percent: u64) -> Option<u64> {
    let milestone = percent / PLAIN_STEP_PERCENT * PLAIN_STEP_PERCENT;
    match last {
        Some(last) if milestone <= last => None,
        _ => Some(milestone),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Preparing index...");
        spinner.stop("Index reused");
    }

    #[test]
    fn milestones_advance_in_steps() {
        assert_eq!(plain_milestone(None, 0), Some(0));
        assert_eq!(plain_milestone(Some(0), 9), None);
        assert_eq!(plain_milestone(Some(0), 27), Some(20));
        assert_eq!(plain_milestone(Some(20), 29), None);
        assert_eq!(plain_milestone(Some(90), 100), Some(100));
    }

    #[test]
    fn task_message_prefers_task_counts() {
        let mut state = RunState::new(Utc::now());
        assert_eq!(task_message(&state), "");

        state.spectra_searched = 5000;
        assert_eq!(task_message(&state), "5000 spectra");

        state.tasks_total = Some(128);
        state.tasks_completed = 12;
        assert_eq!(task_message(&state), "12/128 tasks");
    }

    #[test]
    fn search_progress_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut progress = SearchProgress::new(&ctx, "run.mzML");
        let mut state = RunState::new(Utc::now());
        state.progress = 47.5;
        progress.update(&state);
        assert_eq!(progress.last_reported, Some(40));
        progress.finish();
    }
}
