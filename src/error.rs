//! Error types for fidx
//!
//! All modules use `FidxResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fidx operations
pub type FidxResult<T> = Result<T, FidxError>;

/// Exit status for failures worth requeueing (`EX_TEMPFAIL`)
pub const EXIT_RETRYABLE: u8 = 75;

/// Exit status after Ctrl-C
pub const EXIT_INTERRUPTED: u8 = 130;

/// All errors that can occur in fidx
#[derive(Error, Debug)]
pub enum FidxError {
    // Not-found errors
    #[error("Reference file not found: {0}")]
    ReferenceNotFound(PathBuf),

    #[error("Index artifacts incomplete for {reference}: missing {missing}")]
    ArtifactsIncomplete { reference: String, missing: String },

    // Resource errors
    #[error(
        "Insufficient disk space in {path}: need {needed} bytes, {available} bytes available"
    )]
    InsufficientDisk {
        path: PathBuf,
        needed: u64,
        available: u64,
    },

    #[error("Insufficient free memory: need {needed_mb} MB, {available_mb} MB available")]
    InsufficientMemory { needed_mb: u64, available_mb: u64 },

    // Corruption errors
    #[error("Corrupt index artifact {path}: {reason}")]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("Invalid index manifest {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    // External tool errors
    #[error("{tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("{tool} was frozen after search completion and was aborted")]
    ToolFrozen { tool: String },

    #[error("Only {completed} of {total} search tasks completed")]
    TaskCountShortfall { completed: u32, total: u32 },

    #[error("{percent:.1}% of spectra were skipped as not centroided ({skipped} of {total})")]
    SkippedSpectra {
        skipped: u64,
        total: u64,
        percent: f64,
    },

    #[error("Search results file was not created: {0}")]
    ResultsMissing(PathBuf),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Required setting is missing: {0}")]
    SettingMissing(&'static str),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // Orchestration wrapper
    #[error("{operation} failed during {step}: {source}")]
    Step {
        operation: &'static str,
        step: String,
        #[source]
        source: Box<FidxError>,
    },

    #[error("Interrupted")]
    Interrupted,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FidxError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Wrap an error with the operation and step it happened in
    pub fn in_step(self, operation: &'static str, step: impl Into<String>) -> Self {
        match self {
            // Keep the innermost step label
            Self::Step { .. } => self,
            other => Self::Step {
                operation,
                step: step.into(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any orchestration wrapper removed
    pub fn root(&self) -> &FidxError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if error is retryable
    ///
    /// Resource shortfalls are worth requeueing on another worker or later;
    /// everything else is a hard failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            Self::InsufficientDisk { .. } | Self::InsufficientMemory { .. }
        )
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        if self.is_retryable() {
            EXIT_RETRYABLE
        } else if matches!(self.root(), Self::Interrupted) {
            EXIT_INTERRUPTED
        } else {
            1
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::InsufficientDisk { .. } => Some("Free space in the local index directory or requeue on another worker"),
            Self::InsufficientMemory { .. } => Some("Requeue the job on a worker with more free memory"),
            Self::CorruptArtifact { .. } => Some("Delete the local index files to force a rebuild"),
            Self::SettingMissing(_) => Some("Run: fidx config set <key> <value>"),
            Self::ReferenceNotFound(_) => Some("Check the --fasta path"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FidxError::TaskCountShortfall {
            completed: 126,
            total: 128,
        };
        assert_eq!(err.to_string(), "Only 126 of 128 search tasks completed");
    }

    #[test]
    fn error_hint() {
        let err = FidxError::InsufficientMemory {
            needed_mb: 8000,
            available_mb: 2000,
        };
        assert!(err.hint().unwrap().contains("Requeue"));
    }

    #[test]
    fn error_retryable() {
        assert!(FidxError::InsufficientMemory {
            needed_mb: 1,
            available_mb: 0
        }
        .is_retryable());
        assert!(!FidxError::ToolFrozen {
            tool: "MS-GF+".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn exit_codes() {
        let memory = FidxError::InsufficientMemory {
            needed_mb: 1,
            available_mb: 0,
        };
        assert_eq!(memory.exit_code(), EXIT_RETRYABLE);
        assert_eq!(FidxError::Interrupted.exit_code(), EXIT_INTERRUPTED);
        assert_eq!(FidxError::ResultsMissing(PathBuf::from("x.mzid")).exit_code(), 1);
    }

    #[test]
    fn step_wrapper_preserves_retryable() {
        let err = FidxError::InsufficientDisk {
            path: PathBuf::from("/tmp"),
            needed: 10,
            available: 1,
        }
        .in_step("ensure_index", "remote fetch");

        assert!(err.is_retryable());
        assert!(err.to_string().contains("remote fetch"));
    }

    #[test]
    fn step_wrapper_keeps_innermost_label() {
        let err = FidxError::Internal("boom".to_string())
            .in_step("ensure_index", "build")
            .in_step("search", "index");

        match err {
            FidxError::Step { step, operation, .. } => {
                assert_eq!(step, "build");
                assert_eq!(operation, "ensure_index");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
