//! Validate command - check the local index of a FASTA file

use crate::artifact::{ArtifactValidator, DecoyMode, ReferenceFile, LOCK_EXTENSION};
use crate::cli::args::ValidateArgs;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::{FidxError, FidxResult};
use crate::lock::{LockManager, LockStatus};
use crate::ui::{self, UiContext};
use std::sync::Arc;

/// Execute the validate command
pub async fn execute(args: ValidateArgs, config: &Config) -> FidxResult<()> {
    let ctx = UiContext::detect();
    if !args.fasta.is_file() {
        return Err(FidxError::ReferenceNotFound(args.fasta));
    }

    let mode = if args.forward_only {
        DecoyMode::ForwardOnly
    } else {
        DecoyMode::ForwardReverse
    };
    let reference = ReferenceFile::new(&args.fasta)?;
    let validator = ArtifactValidator::new(config.index.clock_skew_tolerance());
    let report = validator.validate(&reference, mode)?;

    ui::section(&ctx, &format!("{} ({})", reference.file_name(), mode));
    ui::key_value_status(
        &ctx,
        "Complete",
        &if report.complete {
            format!("{} artifact(s)", report.found.len())
        } else {
            format!("missing {}", report.missing.join(", "))
        },
        report.complete,
    );
    if report.complete {
        ui::key_value_status(
            &ctx,
            "Fresh",
            &if reference.is_generated() {
                "generated reference".to_string()
            } else if report.fresh {
                "newer than FASTA".to_string()
            } else {
                format!("{} artifact(s) older than FASTA", report.outdated.len())
            },
            report.fresh,
        );
        ui::key_value_status(
            &ctx,
            "Format",
            if report.format_ok { "current" } else { "obsolete annotation layout" },
            report.format_ok,
        );
    }

    let locks = LockManager::new(Arc::new(SystemClock), &config.lock);
    let lock = reference.marker_path(&reference.dir(), LOCK_EXTENSION);
    let status = locks.status(&lock);
    match &status {
        LockStatus::Absent => ui::key_value_status(&ctx, "Lock", "none", true),
        LockStatus::Held { owner, .. } => {
            let minutes = locks.age_of(&status).map_or(0, |age| age.as_secs() / 60);
            let stale = locks.is_stale(&status);
            let owner = if owner.is_empty() { "unknown" } else { owner.as_str() };
            ui::key_value_status(
                &ctx,
                "Lock",
                &format!(
                    "held by {} for {} min{}",
                    owner,
                    minutes,
                    if stale { " (stale)" } else { "" }
                ),
                false,
            );
        }
    }

    if report.is_valid() {
        ui::step_ok(&ctx, "Index is usable");
        Ok(())
    } else if !report.complete {
        Err(FidxError::ArtifactsIncomplete {
            reference: reference.file_name().to_string(),
            missing: report.missing.join(", "),
        })
    } else {
        Err(FidxError::CorruptArtifact {
            path: reference.path().to_path_buf(),
            reason: report.summary(),
        })
    }
}
