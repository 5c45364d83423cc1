//! Advisory lock markers on a shared filesystem
//!
//! A marker is a small file next to the resource it guards. Markers are
//! leases, not locks: anybody may delete one that has gone stale, and two
//! workers that acquire at the same instant both succeed. Callers re-check
//! the guarded state after acquiring instead of trusting exclusivity.
//!
//! # Marker States
//!
//! | State | Write age | Action |
//! |-------|-----------|--------|
//! | Absent | - | proceed |
//! | Fresh | < stale threshold | poll until gone or max wait since creation |
//! | Stale | >= stale threshold | delete immediately, proceed |

pub mod manager;
pub mod marker;

pub use manager::{LockManager, WaitOutcome};
pub use marker::{default_owner, LockMarker, LockStatus};
