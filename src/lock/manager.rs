//! Waiting for, acquiring and releasing lock markers

use crate::clock::{elapsed_between, Clock};
use crate::config::schema::LockConfig;
use crate::lock::marker::{LockMarker, LockStatus};
use crate::retry::{PollDecision, PollPolicy};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a wait on a marker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// No marker was present
    Clear,
    /// The holder removed its marker while we waited
    Released,
    /// The marker had not been written for the stale threshold and was deleted
    RemovedStale,
    /// The max wait since creation elapsed and the marker was deleted
    ForcedTakeover,
}

impl WaitOutcome {
    /// Whether a marker was deleted on somebody else's behalf
    pub fn took_over(&self) -> bool {
        matches!(self, Self::RemovedStale | Self::ForcedTakeover)
    }
}

/// Lease-style lock manager for marker files
#[derive(Clone)]
pub struct LockManager {
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    poll_interval: Duration,
}

impl LockManager {
    /// Create a manager from the lock settings
    pub fn new(clock: Arc<dyn Clock>, config: &LockConfig) -> Self {
        Self {
            clock,
            stale_after: config.stale_after(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Current state of the marker at `path`
    pub fn status(&self, path: &Path) -> LockStatus {
        LockStatus::inspect(path).unwrap_or_else(|e| {
            warn!("Could not inspect lock {}: {}", path.display(), e);
            LockStatus::Absent
        })
    }

    /// Whether `status` is past the stale threshold
    pub fn is_stale(&self, status: &LockStatus) -> bool {
        status
            .write_age(self.clock.now())
            .is_some_and(|age| age >= self.stale_after)
    }

    /// Wait until the marker at `path` is gone
    ///
    /// A marker whose last write is older than the stale threshold is deleted
    /// immediately. Otherwise the marker is polled until it disappears or
    /// until `max_wait` has passed since it was created, at which point it is
    /// deleted anyway.
    pub async fn wait_for_clear(&self, path: &Path, max_wait: Duration) -> WaitOutcome {
        let mut status = self.status(path);
        if status == LockStatus::Absent {
            return WaitOutcome::Clear;
        }

        if self.is_stale(&status) {
            let age = status.write_age(self.clock.now()).unwrap_or_default();
            warn!(
                lock = %path.display(),
                age_minutes = age.as_secs() / 60,
                "Removing stale lock marker"
            );
            self.remove(path);
            return WaitOutcome::RemovedStale;
        }

        if let LockStatus::Held { owner, .. } = &status {
            info!(lock = %path.display(), owner = %owner, "Waiting for lock marker to clear");
        }

        let policy = PollPolicy::new(self.poll_interval, max_wait);
        loop {
            let since_created = status.age(self.clock.now()).unwrap_or_default();
            match policy.decide(since_created) {
                PollDecision::Wait(delay) => self.clock.sleep(delay).await,
                PollDecision::GiveUp => {
                    warn!(
                        lock = %path.display(),
                        waited_minutes = since_created.as_secs() / 60,
                        "Lock marker still present after max wait; deleting it"
                    );
                    self.remove(path);
                    return WaitOutcome::ForcedTakeover;
                }
            }

            status = self.status(path);
            if status == LockStatus::Absent {
                debug!(lock = %path.display(), "Lock marker cleared");
                return WaitOutcome::Released;
            }
        }
    }

    /// Write a marker for `owner`
    ///
    /// Returns false only when the marker cannot be written. Acquiring does
    /// not exclude a concurrent acquire elsewhere.
    pub fn acquire(&self, path: &Path, owner: &str) -> bool {
        let marker = LockMarker::new(owner, self.clock.now());
        match fs::write(path, marker.render()) {
            Ok(()) => {
                debug!(lock = %path.display(), owner, "Lock marker written");
                true
            }
            Err(e) => {
                warn!("Could not create lock marker {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Delete the marker; failures are ignored
    pub fn release(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => debug!(lock = %path.display(), "Lock marker released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!("Ignoring failure to release {}: {}", path.display(), e),
        }
    }

    fn remove(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not delete lock marker {}: {}", path.display(), e);
            }
        }
    }

    /// Time elapsed since `status` was created, per this manager's clock
    pub fn age_of(&self, status: &LockStatus) -> Option<Duration> {
        match status {
            LockStatus::Absent => None,
            LockStatus::Held { created, .. } => Some(elapsed_between(*created, self.clock.now())),
        }
    }
}
