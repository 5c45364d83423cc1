//! Frozen-process detection
//!
//! After the search-complete marker the tool only sorts and writes results.
//! A process still alive `max(min_wait, ceil(sqrt(runtime_minutes)))` minutes
//! after that point is considered frozen. Runtime is measured from launch to
//! the completion time, so long searches get proportionally more slack for
//! their larger result sets.

use crate::clock::elapsed_between;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Adaptive post-completion timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenPolicy {
    /// Lower bound on the post-completion wait
    pub min_wait: Duration,
}

impl Default for FrozenPolicy {
    fn default() -> Self {
        Self {
            min_wait: Duration::from_secs(5 * 60),
        }
    }
}

impl FrozenPolicy {
    /// Create a policy with the given lower bound
    pub fn new(min_wait: Duration) -> Self {
        Self { min_wait }
    }

    /// How long to wait after completion for a search that ran for `runtime`
    pub fn grace_period(&self, runtime: Duration) -> Duration {
        let minutes = runtime.as_secs_f64() / 60.0;
        let adaptive = Duration::from_secs(minutes.sqrt().ceil() as u64 * 60);
        adaptive.max(self.min_wait)
    }

    /// Whether a process launched at `started` that reached completion at
    /// `completed_at` should be aborted at `now`
    pub fn should_abort(
        &self,
        started: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(completed_at) = completed_at else {
            return false;
        };
        let runtime = elapsed_between(started, completed_at);
        elapsed_between(completed_at, now) >= self.grace_period(runtime)
    }
}
