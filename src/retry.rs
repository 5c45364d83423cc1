//! Poll policies for bounded waits
//!
//! A policy is a pure function of elapsed time: callers measure elapsed time
//! with their [`Clock`](crate::clock::Clock) and ask the policy what to do next.

use std::time::Duration;

/// What a poller should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Sleep for the given duration, then check again
    Wait(Duration),
    /// The time budget is spent
    GiveUp,
}

/// Fixed-interval polling bounded by a total duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between checks
    pub interval: Duration,
    /// Total budget measured from the policy's reference point
    pub max_duration: Duration,
}

impl PollPolicy {
    /// Create a new policy
    pub fn new(interval: Duration, max_duration: Duration) -> Self {
        Self {
            interval,
            max_duration,
        }
    }

    /// Decide the next step given the time already spent
    ///
    /// The last wait is truncated so the total never overshoots
    /// `max_duration`.
    pub fn decide(&self, elapsed: Duration) -> PollDecision {
        if elapsed >= self.max_duration {
            return PollDecision::GiveUp;
        }
        let remaining = self.max_duration - elapsed;
        PollDecision::Wait(self.interval.min(remaining))
    }
}
