//! fidx - FASTA index coordinator and search supervisor
//!
//! Worker-side plumbing for proteomics pipelines that share index files over
//! a network filesystem: reuse, fetch or build the suffix-array index of a
//! FASTA file with at most one builder per reference, then run and judge a
//! database search.

pub mod artifact;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod index;
pub mod lock;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod search;
pub mod supervisor;
pub mod system;
pub mod ui;

pub use error::{FidxError, FidxResult};
