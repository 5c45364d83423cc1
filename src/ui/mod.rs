//! Terminal output for fidx commands
//!
//! Uses `cliclack` and `indicatif` on interactive terminals and falls back to
//! tagged plain lines under batch schedulers and CI.
//!
//! # Example
//!
//! ```rust,ignore
//! use fidx::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Preparing index for yeast.fasta...");
//! // ... do work ...
//! spinner.stop("Index fetched for yeast.fasta");
//!
//! ui::step_warn(&ctx, "Removed stale lock held by worker-3");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    key_value, key_value_status, remark, section, step_error_detail, step_info, step_ok,
    step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::{SearchProgress, TaskSpinner};
