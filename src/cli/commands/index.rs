//! Index command - make sure a valid index exists beside a FASTA file

use crate::artifact::ReferenceFile;
use crate::cli::args::IndexArgs;
use crate::cli::commands::common;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::context::JobContext;
use crate::error::FidxResult;
use crate::ui::{self, TaskSpinner, UiContext};
use std::sync::Arc;
use tracing::debug;

/// Execute the index command
pub async fn execute(args: IndexArgs, config: &Config) -> FidxResult<()> {
    let ctx = UiContext::detect();
    let config = common::apply_index_options(config, &args.options);
    let mode = args.options.mode();
    let reference = ReferenceFile::new(&args.fasta)?;
    let coordinator = common::coordinator(&config, Arc::new(SystemClock));

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!(
        "Preparing {} index for {}...",
        mode,
        reference.file_name()
    ));

    let mut job = JobContext::new("ensure_index");
    match coordinator.ensure_index(&reference, mode, &mut job).await {
        Ok(source) => {
            debug!(%source, "Index command finished");
            spinner.stop(job.message());
            for warning in job.warnings() {
                ui::step_warn(&ctx, warning);
            }
            Ok(())
        }
        Err(e) => {
            spinner.stop_error(&format!("Index not ready for {}", reference.file_name()));
            Err(e)
        }
    }
}
