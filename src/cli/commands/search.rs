//! Search command - run a database search and report its verdict

use crate::cli::args::SearchArgs;
use crate::cli::commands::common;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigManager};
use crate::context::JobContext;
use crate::error::FidxResult;
use crate::events::EventLog;
use crate::reconcile::{Reconciler, Verdict};
use crate::search::{SearchJob, SearchRequest};
use crate::supervisor::{ProcessSupervisor, RunState};
use crate::ui::{self, SearchProgress, UiContext};
use std::sync::Arc;

/// Execute the search command
pub async fn execute(args: SearchArgs, config: &Config) -> FidxResult<()> {
    let ctx = UiContext::detect();
    let config = common::apply_index_options(config, &args.options);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let job = SearchJob::new(
        common::coordinator(&config, clock.clone()),
        ProcessSupervisor::from_config(clock.clone(), &config.supervisor),
        Reconciler::from_config(clock.clone(), &config.supervisor),
        config.tool.clone(),
        ConfigManager::console_dir(),
    )
    .with_events(EventLog::new(&config, clock));

    let request = SearchRequest {
        spectra: args.spectra,
        fasta: args.fasta,
        params: args.params,
        output: args.output,
        mode: args.options.mode(),
        pre_centroided: args.pre_centroided,
    };

    let label = request
        .spectra
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| request.spectra.display().to_string());
    let mut progress = SearchProgress::new(&ctx, &label);
    let mut job_ctx = JobContext::new("search");

    let verdict = job
        .run(&request, &mut job_ctx, &mut |state: &RunState| {
            progress.update(state)
        })
        .await;
    progress.finish();

    let results = request.output.display().to_string();
    match verdict {
        Verdict::Success => {
            ui::step_ok_detail(&ctx, "Search complete", &results);
            Ok(())
        }
        Verdict::SuccessWithWarning(warnings) => {
            ui::step_ok_detail(&ctx, "Search complete with warnings", &results);
            for warning in &warnings {
                ui::step_warn(&ctx, warning);
            }
            Ok(())
        }
        Verdict::Failure(e) => {
            ui::step_error_detail(&ctx, "Search failed", &label);
            Err(e)
        }
    }
}
