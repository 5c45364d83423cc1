//! Running a database search end to end

use crate::artifact::{DecoyMode, ReferenceFile};
use crate::config::schema::ToolConfig;
use crate::context::JobContext;
use crate::error::{FidxError, FidxResult};
use crate::events::{EventLog, JobEvent};
use crate::index::IndexCoordinator;
use crate::reconcile::{Reconciler, Verdict};
use crate::supervisor::{ProcessSupervisor, RunOutcome, RunState, ToolCommand};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Inputs of one search
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Spectra file
    pub spectra: PathBuf,
    /// FASTA reference
    pub fasta: PathBuf,
    /// Tool parameter file
    pub params: PathBuf,
    /// Results file to create
    pub output: PathBuf,
    /// Decoy handling of the index
    pub mode: DecoyMode,
    /// Spectra are known to be centroided already
    pub pre_centroided: bool,
}

/// Ensures the index, runs the search tool and judges its output
pub struct SearchJob {
    coordinator: IndexCoordinator,
    supervisor: ProcessSupervisor,
    reconciler: Reconciler,
    tool: ToolConfig,
    console_dir: PathBuf,
    events: EventLog,
}

impl SearchJob {
    /// Create a job runner
    pub fn new(
        coordinator: IndexCoordinator,
        supervisor: ProcessSupervisor,
        reconciler: Reconciler,
        tool: ToolConfig,
        console_dir: PathBuf,
    ) -> Self {
        Self {
            coordinator,
            supervisor,
            reconciler,
            tool,
            console_dir,
            events: EventLog::disabled(),
        }
    }

    /// Record verdicts in `events`
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    /// Command line for `request`
    pub fn command(&self, request: &SearchRequest) -> FidxResult<ToolCommand> {
        let jar = self
            .tool
            .jar_path
            .as_ref()
            .ok_or(FidxError::SettingMissing("tool.jar_path"))?;
        Ok(ToolCommand::new(self.tool.java_path.display().to_string())
            .arg(format!("-Xmx{}M", self.tool.search_memory_mb))
            .arg("-jar")
            .path_arg(jar)
            .arg("-s")
            .path_arg(&request.spectra)
            .arg("-o")
            .path_arg(&request.output)
            .arg("-d")
            .path_arg(&request.fasta)
            .arg("-conf")
            .path_arg(&request.params))
    }

    /// Run the search; every failure is reported through the verdict
    pub async fn run(
        &self,
        request: &SearchRequest,
        ctx: &mut JobContext,
        on_progress: &mut (dyn FnMut(&RunState) + Send),
    ) -> Verdict {
        let verdict = match self.run_steps(request, ctx, on_progress).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(
                    operation = ctx.operation(),
                    step = ctx.step(),
                    "Search failed: {}",
                    e
                );
                Verdict::Failure(e.in_step(ctx.operation(), ctx.step()))
            }
        };

        // Successful runs carry every warning collected along the way
        let verdict = match verdict {
            Verdict::Failure(e) => Verdict::Failure(e),
            _ if ctx.warnings().is_empty() => Verdict::Success,
            _ => Verdict::SuccessWithWarning(ctx.warnings().to_vec()),
        };

        let reason = match &verdict {
            Verdict::Failure(e) => Some(e.to_string()),
            _ => None,
        };
        self.events
            .record(&JobEvent::SearchVerdict {
                spectra: request.spectra.clone(),
                reference: request.fasta.clone(),
                verdict: verdict.label(),
                warnings: verdict.warnings().to_vec(),
                reason,
            })
            .await;
        verdict
    }

    async fn run_steps(
        &self,
        request: &SearchRequest,
        ctx: &mut JobContext,
        on_progress: &mut (dyn FnMut(&RunState) + Send),
    ) -> FidxResult<Verdict> {
        ctx.set_step("inputs");
        for input in [&request.spectra, &request.params] {
            fs::metadata(input)
                .map_err(|e| FidxError::io(format!("reading {}", input.display()), e))?;
        }
        let command = self.command(request)?;

        let reference = ReferenceFile::new(&request.fasta)?;
        self.coordinator
            .ensure_index(&reference, request.mode, ctx)
            .await?;

        ctx.set_step("search");
        match fs::remove_file(&request.output) {
            Ok(()) => warn!("Removed previous results {}", request.output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(FidxError::io(
                    format!("removing previous results {}", request.output.display()),
                    e,
                ))
            }
        }

        let stem = request
            .spectra
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "search".to_string());
        let console = self.console_dir.join(format!("{}_search.txt", stem));

        let report = {
            let mut observe = |state: &RunState| {
                ctx.update_progress(state.progress);
                on_progress(state);
            };
            self.supervisor.run(&command, &console, &mut observe).await?
        };

        if let Some(version) = &report.state.version {
            info!(version = %version, "Search tool version");
        }

        let mut checks = Verdict::Success;
        match report.outcome {
            RunOutcome::Exited(Some(0)) => {}
            RunOutcome::Exited(code) => {
                if let Some(errors) = report.state.error_text() {
                    return Ok(Verdict::Failure(FidxError::ToolFailed {
                        tool: "search".to_string(),
                        reason: errors,
                    }));
                }
                checks = checks.and(Verdict::SuccessWithWarning(vec![format!(
                    "Search tool exited with {} but reported no errors",
                    code.map_or("a signal".to_string(), |c| format!("code {}", c))
                )]));
            }
            RunOutcome::Frozen => {
                if !request.output.is_file() {
                    return Ok(Verdict::Failure(FidxError::ToolFrozen {
                        tool: "search".to_string(),
                    }));
                }
                checks = checks.and(Verdict::SuccessWithWarning(vec![
                    "Search tool hung after finishing its search and was stopped".to_string(),
                ]));
            }
        }

        ctx.set_step("reconcile");
        checks = checks.and(
            self.reconciler
                .reconcile(&console, request.pre_centroided)
                .await?,
        );
        if !checks.is_success() {
            return Ok(checks);
        }

        ctx.set_step("results");
        if !request.output.is_file() {
            return Ok(Verdict::Failure(FidxError::ResultsMissing(
                request.output.clone(),
            )));
        }

        for warning in checks.warnings() {
            ctx.warn(warning.clone());
        }
        ctx.update_progress(100.0);
        Ok(checks)
    }
}
