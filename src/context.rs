//! Per-job status threaded through the coordinator and search job

use tracing::{debug, warn};

/// Status of one operation: current step, message, progress and warnings
#[derive(Debug, Clone)]
pub struct JobContext {
    operation: &'static str,
    step: String,
    message: String,
    progress: f32,
    warnings: Vec<String>,
}

impl JobContext {
    /// Create a context for the named operation
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            step: "starting".to_string(),
            message: String::new(),
            progress: 0.0,
            warnings: Vec::new(),
        }
    }

    /// Operation name (e.g. `ensure_index`)
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Label of the step currently running
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Enter a new step
    pub fn set_step(&mut self, step: impl Into<String>) {
        self.step = step.into();
        debug!(operation = self.operation, step = %self.step, "Entering step");
    }

    /// Latest status message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Replace the status message
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// Progress percentage (0-100)
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Record progress; lower values than already seen are ignored
    pub fn update_progress(&mut self, percent: f32) {
        if percent > self.progress {
            self.progress = percent.min(100.0);
        }
    }

    /// Record a non-fatal problem
    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        warn!(operation = self.operation, step = %self.step, "{}", warning);
        self.warnings.push(warning);
    }

    /// All warnings recorded so far
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}
