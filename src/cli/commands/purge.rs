//! Purge command - apply the retention limit to shared cache roots

use crate::cli::args::PurgeArgs;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::{FidxError, FidxResult};
use crate::remote::{PurgeReport, RetentionPurger, POLICY_FILE};
use crate::ui::{self, UiContext};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const MB: u64 = 1024 * 1024;

/// Execute the purge command
pub async fn execute(args: PurgeArgs, config: &Config) -> FidxResult<()> {
    let ctx = UiContext::detect();
    let roots = target_roots(args.root, config)?;

    let purger = RetentionPurger::new(
        Arc::new(SystemClock),
        Duration::from_secs(u64::from(config.cache.purge_interval_hours) * 3600),
        config.lock.stale_after(),
    );

    for root in roots {
        ui::section(&ctx, &root.display().to_string());
        if !root.is_dir() {
            ui::step_warn(&ctx, "Cache root does not exist");
            continue;
        }

        let report = if args.force {
            purger.purge(&root)
        } else {
            purger.purge_if_due(&root)
        };
        print_report(&ctx, &report);
    }

    Ok(())
}

/// Roots named on the command line, else every configured root
fn target_roots(root: Option<PathBuf>, config: &Config) -> FidxResult<Vec<PathBuf>> {
    if let Some(root) = root {
        return Ok(vec![root]);
    }
    let roots: Vec<PathBuf> = [&config.cache.generated_dir, &config.cache.legacy_dir]
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    if roots.is_empty() {
        return Err(FidxError::SettingMissing("cache.generated_dir"));
    }
    Ok(roots)
}

fn print_report(ctx: &UiContext, report: &PurgeReport) {
    if report.throttled {
        ui::step_info(ctx, "Purged recently; use --force to purge again");
        return;
    }
    let Some(limit) = report.limit_bytes else {
        ui::step_info(ctx, &format!("No {} policy; nothing to purge", POLICY_FILE));
        return;
    };

    ui::key_value(ctx, "Limit", &format!("{} MB", limit / MB));
    ui::key_value(ctx, "Before", &format!("{} MB", report.total_before / MB));
    ui::key_value_status(
        ctx,
        "After",
        &format!("{} MB", report.total_after / MB),
        report.total_after <= limit,
    );
    if report.skipped_locked > 0 {
        ui::step_warn(
            ctx,
            &format!("{} locked set(s) left in place", report.skipped_locked),
        );
    }
    if report.removed.is_empty() {
        ui::step_ok(ctx, "Within limit");
    } else {
        ui::step_ok_detail(
            ctx,
            &format!("Removed {} set(s)", report.removed.len()),
            &report.removed.join(", "),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_root_wins() {
        let roots = target_roots(Some(PathBuf::from("/shared/x")), &Config::default()).unwrap();
        assert_eq!(roots, vec![PathBuf::from("/shared/x")]);
    }

    #[test]
    fn configured_roots_are_used() {
        let mut config = Config::default();
        config.cache.generated_dir = Some(PathBuf::from("/shared/generated"));
        config.cache.legacy_dir = Some(PathBuf::from("/shared/legacy"));

        let roots = target_roots(None, &config).unwrap();

        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn no_roots_is_an_error() {
        let err = target_roots(None, &Config::default()).unwrap_err();
        assert!(matches!(err, FidxError::SettingMissing(_)));
    }
}
