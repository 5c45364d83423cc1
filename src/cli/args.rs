//! CLI argument definitions using clap derive

use crate::artifact::DecoyMode;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// fidx - Shared index cache and search supervisor for MS-GF+ workers
///
/// Fetches or builds FASTA search indexes through a shared cache guarded by
/// lock files, and supervises searches until they reach a clear verdict.
#[derive(Parser, Debug)]
#[command(name = "fidx")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FIDX_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Make sure a valid index exists beside a FASTA file
    Index(IndexArgs),

    /// Run a database search and judge its output
    Search(SearchArgs),

    /// Check the local index of a FASTA file
    Validate(ValidateArgs),

    /// Apply the retention limit to a shared cache root
    Purge(PurgeArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Options shared by commands that prepare an index
#[derive(Args, Debug, Clone, Default)]
pub struct IndexOptions {
    /// Index has no appended reverse decoys
    #[arg(long)]
    pub forward_only: bool,

    /// Don't read from or publish to the shared cache
    #[arg(long)]
    pub offline: bool,

    /// Maximum hours to wait for another worker's lock
    #[arg(long, value_name = "HOURS", value_parser = parse_hours)]
    pub max_wait_hours: Option<f64>,

    /// Minimum Java heap for index builds
    #[arg(long, value_name = "MB")]
    pub memory_mb: Option<u64>,
}

impl IndexOptions {
    /// Decoy mode selected by the flags
    pub fn mode(&self) -> DecoyMode {
        if self.forward_only {
            DecoyMode::ForwardOnly
        } else {
            DecoyMode::ForwardReverse
        }
    }
}

/// Arguments for the index command
#[derive(Parser, Debug)]
pub struct IndexArgs {
    /// FASTA reference file
    #[arg(long, value_name = "PATH")]
    pub fasta: PathBuf,

    #[command(flatten)]
    pub options: IndexOptions,
}

/// Arguments for the search command
#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Spectra file
    #[arg(long, value_name = "PATH")]
    pub spectra: PathBuf,

    /// FASTA reference file
    #[arg(long, value_name = "PATH")]
    pub fasta: PathBuf,

    /// Search parameter file
    #[arg(long, value_name = "PATH")]
    pub params: PathBuf,

    /// Results file
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Spectra are already centroided; don't fail on skipped profile spectra
    #[arg(long)]
    pub pre_centroided: bool,

    #[command(flatten)]
    pub options: IndexOptions,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// FASTA reference file
    #[arg(long, value_name = "PATH")]
    pub fasta: PathBuf,

    /// Index has no appended reverse decoys
    #[arg(long)]
    pub forward_only: bool,
}

/// Arguments for the purge command
#[derive(Parser, Debug)]
pub struct PurgeArgs {
    /// Shared cache root (defaults to both configured roots)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Purge even if the root was purged recently
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.generated_dir)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Parse a finite, non-negative number of hours
fn parse_hours(s: &str) -> Result<f64, String> {
    let hours: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a number"))?;
    if !hours.is_finite() || hours < 0.0 {
        return Err(format!("'{s}' must be a finite, non-negative number of hours"));
    }
    Ok(hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_hours_bounds() {
        assert_eq!(parse_hours("0"), Ok(0.0));
        assert_eq!(parse_hours("2.5"), Ok(2.5));
        for bad in ["inf", "-inf", "NaN", "-1", "soon"] {
            assert!(parse_hours(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn infinite_max_wait_is_rejected() {
        let result = Cli::try_parse_from([
            "fidx",
            "index",
            "--fasta",
            "yeast.fasta",
            "--max-wait-hours",
            "inf",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_index_with_overrides() {
        let cli = Cli::try_parse_from([
            "fidx",
            "index",
            "--fasta",
            "/data/yeast.fasta",
            "--forward-only",
            "--offline",
            "--max-wait-hours",
            "0.5",
        ])
        .unwrap();

        match cli.command {
            Commands::Index(args) => {
                assert_eq!(args.fasta, PathBuf::from("/data/yeast.fasta"));
                assert_eq!(args.options.mode(), DecoyMode::ForwardOnly);
                assert!(args.options.offline);
                assert_eq!(args.options.max_wait_hours, Some(0.5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_search() {
        let cli = Cli::try_parse_from([
            "fidx",
            "-vv",
            "search",
            "--spectra",
            "run.mzML",
            "--fasta",
            "db.fasta",
            "--params",
            "MSGFPlus.conf",
            "-o",
            "run.mzid",
            "--pre-centroided",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Search(args) => {
                assert!(args.pre_centroided);
                assert_eq!(args.options.mode(), DecoyMode::ForwardReverse);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn search_requires_output() {
        assert!(Cli::try_parse_from([
            "fidx", "search", "--spectra", "a", "--fasta", "b", "--params", "c"
        ])
        .is_err());
    }
}
