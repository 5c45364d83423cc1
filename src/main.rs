//! fidx - FASTA index coordinator and search supervisor
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use fidx::cli::{Cli, Commands};
use fidx::config::{Config, ConfigManager};
use fidx::error::{FidxError, FidxResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let result = tokio::select! {
        result = run() => result,
        // Dropping the run future kills any supervised child process
        _ = tokio::signal::ctrl_c() => Err(FidxError::Interrupted),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> FidxResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using config {}", config_manager.path().display());

    ConfigManager::ensure_state_dirs().await?;

    match cli.command {
        Commands::Index(args) => fidx::cli::commands::index(args, &config).await,
        Commands::Search(args) => fidx::cli::commands::search(args, &config).await,
        Commands::Validate(args) => fidx::cli::commands::validate(args, &config).await,
        Commands::Purge(args) => fidx::cli::commands::purge(args, &config).await,
        Commands::Config(args) => {
            fidx::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, config: &Config) {
    let default = match verbose {
        0 => "fidx=warn",
        1 => "fidx=info",
        _ => "fidx=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        builder.json().with_current_span(false).init();
    } else {
        builder.with_target(false).without_time().init();
    }
}
