//! Running the external index build

use crate::artifact::{DecoyMode, ReferenceFile};
use crate::config::schema::ToolConfig;
use crate::error::{FidxError, FidxResult};
use crate::supervisor::{ProcessSupervisor, RunOutcome, ToolCommand};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

const GB: u64 = 1024 * 1024 * 1024;

/// Java heap for building an index of a FASTA file of `fasta_bytes`
///
/// | FASTA size | Heap |
/// |------------|------|
/// | up to 0.5 GB | 4000 MB |
/// | up to 1 GB | 8000 MB |
/// | up to 2 GB | 12000 MB |
/// | larger | 16000 MB |
///
/// `hint_mb` can raise the result but never lower it.
pub fn memory_tier(fasta_bytes: u64, hint_mb: u64) -> u64 {
    let tier = if fasta_bytes <= GB / 2 {
        4000
    } else if fasta_bytes <= GB {
        8000
    } else if fasta_bytes <= 2 * GB {
        12000
    } else {
        16000
    };
    tier.max(hint_mb)
}

/// Builds the index artifact set beside a reference file
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    /// Build the set for `mode` with a heap of `memory_mb`
    async fn build(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
        memory_mb: u64,
    ) -> FidxResult<()>;
}

/// Builder that runs the tool's suffix-array entry point under the supervisor
#[derive(Clone)]
pub struct JavaIndexBuilder {
    java: String,
    jar: Option<PathBuf>,
    entry_point: String,
    supervisor: ProcessSupervisor,
    console_dir: PathBuf,
}

impl JavaIndexBuilder {
    /// Create a builder from tool settings
    ///
    /// A missing jar is only reported when a build is attempted, so reuse
    /// and fetches work on workers without the tool installed.
    pub fn from_config(tool: &ToolConfig, supervisor: ProcessSupervisor, console_dir: PathBuf) -> Self {
        Self {
            java: tool.java_path.display().to_string(),
            jar: tool.jar_path.clone(),
            entry_point: tool.build_entry_point.clone(),
            supervisor,
            console_dir,
        }
    }

    /// Command line for building `reference`
    pub fn command(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
        memory_mb: u64,
    ) -> FidxResult<ToolCommand> {
        let jar = self
            .jar
            .as_ref()
            .ok_or(FidxError::SettingMissing("tool.jar_path"))?;
        Ok(ToolCommand::new(&self.java)
            .arg(format!("-Xmx{}M", memory_mb))
            .arg("-cp")
            .path_arg(jar)
            .arg(&self.entry_point)
            .arg("-d")
            .path_arg(reference.path())
            .arg("-tda")
            .arg(mode.tda_arg().to_string())
            .current_dir(reference.dir()))
    }
}

#[async_trait]
impl IndexBuilder for JavaIndexBuilder {
    async fn build(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
        memory_mb: u64,
    ) -> FidxResult<()> {
        let command = self.command(reference, mode, memory_mb)?;
        let console = self.console_dir.join(format!(
            "{}_{}_build.txt",
            reference.base_name(),
            mode.key_space()
        ));

        info!(
            reference = reference.file_name(),
            mode = %mode,
            memory_mb,
            "Building index"
        );
        let report = self.supervisor.run(&command, &console, &mut |_| {}).await?;

        match report.outcome {
            RunOutcome::Exited(Some(0)) => Ok(()),
            RunOutcome::Exited(code) => Err(FidxError::ToolFailed {
                tool: self.entry_point.clone(),
                reason: report.state.error_text().unwrap_or_else(|| match code {
                    Some(code) => format!("exit code {} (console: {})", code, console.display()),
                    None => format!("terminated by signal (console: {})", console.display()),
                }),
            }),
            RunOutcome::Frozen => Err(FidxError::ToolFrozen {
                tool: self.entry_point.clone(),
            }),
        }
    }
}
