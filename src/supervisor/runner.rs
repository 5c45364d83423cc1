//! Launching and watching an external tool

use crate::clock::Clock;
use crate::config::schema::SupervisorConfig;
use crate::error::{FidxError, FidxResult};
use crate::supervisor::console::parse_console;
use crate::supervisor::frozen::FrozenPolicy;
use crate::supervisor::state::RunState;
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// An external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Executable
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory, if not inherited
    pub working_dir: Option<PathBuf>,
}

impl ToolCommand {
    /// Start building an invocation of `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Run in `dir`
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How a supervised run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited on its own (`None` when killed by a signal)
    Exited(Option<i32>),
    /// The process outlived its post-completion grace period and was killed
    Frozen,
}

/// Final state of a supervised run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// How the run ended
    pub outcome: RunOutcome,
    /// Last parsed state
    pub state: RunState,
    /// Console output file
    pub console: PathBuf,
    /// When the supervisor stopped watching
    pub finished: DateTime<Utc>,
}

impl RunReport {
    /// Exited with status 0
    pub fn exited_cleanly(&self) -> bool {
        self.outcome == RunOutcome::Exited(Some(0))
    }
}

/// Runs a tool with its console redirected to a file and re-parses that file
/// on a fixed period
#[derive(Clone)]
pub struct ProcessSupervisor {
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    frozen: FrozenPolicy,
}

impl ProcessSupervisor {
    /// Create a supervisor
    pub fn new(clock: Arc<dyn Clock>, poll_interval: Duration, frozen: FrozenPolicy) -> Self {
        Self {
            clock,
            poll_interval,
            frozen,
        }
    }

    /// Create a supervisor from configuration
    pub fn from_config(clock: Arc<dyn Clock>, config: &SupervisorConfig) -> Self {
        Self::new(
            clock,
            config.poll_interval(),
            FrozenPolicy::new(config.frozen_min_wait()),
        )
    }

    /// Clock used for polling
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run `command` to completion, writing its console output to `console`
    ///
    /// `observer` sees the state after every poll.
    pub async fn run(
        &self,
        command: &ToolCommand,
        console: &Path,
        observer: &mut (dyn FnMut(&RunState) + Send),
    ) -> FidxResult<RunReport> {
        if let Some(parent) = console.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| FidxError::io(format!("creating {}", parent.display()), e))?;
        }
        let stdout = File::create(console)
            .map_err(|e| FidxError::io(format!("creating console file {}", console.display()), e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| FidxError::io("duplicating console file handle", e))?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        info!(command = %command, console = %console.display(), "Launching tool");
        let mut child = cmd
            .spawn()
            .map_err(|e| FidxError::command_failed(command.to_string(), e))?;

        let mut state = RunState::new(self.clock.now());

        let outcome = loop {
            let exited = tokio::select! {
                status = child.wait() => Some(
                    status.map_err(|e| FidxError::command_failed(command.to_string(), e))?,
                ),
                _ = self.clock.sleep(self.poll_interval) => None,
            };
            if let Some(status) = exited {
                break RunOutcome::Exited(status.code());
            }

            self.refresh(&mut state, console);
            observer(&state);

            if self.frozen.should_abort(state.started, state.completed_at, self.clock.now()) {
                warn!(
                    command = %command.program,
                    progress = state.progress,
                    "Process still running after its post-completion grace period; aborting"
                );
                if let Err(e) = child.start_kill() {
                    warn!("Could not kill frozen process: {}", e);
                }
                let _ = child.wait().await;
                break RunOutcome::Frozen;
            }
        };

        self.refresh(&mut state, console);
        observer(&state);

        debug!(?outcome, progress = state.progress, "Tool finished");
        Ok(RunReport {
            outcome,
            state,
            console: console.to_path_buf(),
            finished: self.clock.now(),
        })
    }

    fn refresh(&self, state: &mut RunState, console: &Path) {
        match fs::read(console) {
            Ok(bytes) => {
                let summary = parse_console(&String::from_utf8_lossy(&bytes));
                state.absorb(&summary, self.clock.now());
            }
            Err(e) => debug!("Could not read console {}: {}", console.display(), e),
        }
    }
}
