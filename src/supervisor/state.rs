//! State of one supervised run

use crate::clock::elapsed_between;
use crate::supervisor::console::ConsoleSummary;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// What the supervisor knows about a running tool
#[derive(Debug, Clone)]
pub struct RunState {
    /// When the process was launched
    pub started: DateTime<Utc>,
    /// Tool version, captured once
    pub version: Option<String>,
    /// Progress percentage; never decreases
    pub progress: f32,
    /// When the search-complete marker was first seen
    pub completed_at: Option<DateTime<Utc>>,
    /// Reported completed task count
    pub tasks_completed: u32,
    /// Declared task total
    pub tasks_total: Option<u32>,
    /// Spectra skipped as not centroided
    pub spectra_skipped: u64,
    /// Spectra searched
    pub spectra_searched: u64,
    /// Console error lines
    pub errors: Vec<String>,
}

impl RunState {
    /// Fresh state for a process launched at `started`
    pub fn new(started: DateTime<Utc>) -> Self {
        Self {
            started,
            version: None,
            progress: 0.0,
            completed_at: None,
            tasks_completed: 0,
            tasks_total: None,
            spectra_skipped: 0,
            spectra_searched: 0,
            errors: Vec::new(),
        }
    }

    /// Merge a console pass observed at `now`
    ///
    /// Progress and counts only move forward; the completion time is latched
    /// the first time the search-complete marker is seen.
    pub fn absorb(&mut self, summary: &ConsoleSummary, now: DateTime<Utc>) {
        if self.version.is_none() {
            self.version = summary.version.clone();
        }
        if summary.progress > self.progress {
            self.progress = summary.progress;
        }
        if self.completed_at.is_none() && summary.search_complete() {
            self.completed_at = Some(now);
        }
        self.tasks_completed = self.tasks_completed.max(summary.tasks_completed);
        if summary.tasks_total.is_some() {
            self.tasks_total = summary.tasks_total;
        }
        self.spectra_skipped = self.spectra_skipped.max(summary.spectra_skipped);
        self.spectra_searched = self.spectra_searched.max(summary.spectra_searched);
        if summary.errors.len() > self.errors.len() {
            self.errors = summary.errors.clone();
        }
    }

    /// Run time from launch to `now`
    pub fn runtime(&self, now: DateTime<Utc>) -> Duration {
        elapsed_between(self.started, now)
    }

    /// Console error lines joined for a failure message
    pub fn error_text(&self) -> Option<String> {
        (!self.errors.is_empty()).then(|| self.errors.join("; "))
    }
}
