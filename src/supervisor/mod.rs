//! Supervision of long-running external tools
//!
//! The tool's exit status alone is not trusted. Its console output is
//! captured to a file and re-parsed on a fixed period for progress, task
//! counts and error lines; a process that hangs after finishing its search is
//! killed and reported as frozen.

pub mod console;
pub mod frozen;
pub mod runner;
pub mod state;

pub use console::{parse_console, ConsoleSummary, SEARCH_COMPLETE_PROGRESS};
pub use frozen::FrozenPolicy;
pub use runner::{ProcessSupervisor, RunOutcome, RunReport, ToolCommand};
pub use state::RunState;
