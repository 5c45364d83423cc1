//! Fetch-or-build decision for one reference file
//!
//! ```text
//! local check --valid--> reuse
//!      |
//!      v
//! wait on remote lock, pull --ok--> fetched
//!      |
//!      v
//! take remote lock, pull again --ok--> fetched
//!      |
//!      v
//! take local lock, re-check, clean, build --> publish, release
//! ```
//!
//! Locks are leases. Two workers can both end up building; every step that
//! depends on exclusivity re-validates after acquiring, and a published set
//! is never modified in place, so duplicated work is the worst outcome.

use crate::artifact::{
    self, ArtifactValidator, DecoyMode, ReferenceFile, LAST_USED_EXTENSION, LOCK_EXTENSION,
};
use crate::clock::Clock;
use crate::config::Config;
use crate::context::JobContext;
use crate::error::{FidxError, FidxResult};
use crate::events::{EventLog, JobEvent};
use crate::index::builder::{memory_tier, IndexBuilder};
use crate::lock::{LockManager, WaitOutcome};
use crate::remote::{last_used, PullOutcome, RemoteCache, RetentionPurger};
use crate::system::ResourceProbe;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where a usable index came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSource {
    /// Already valid locally
    Reused,
    /// Copied from the shared cache
    Fetched,
    /// Built on this worker
    Built,
}

impl fmt::Display for IndexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reused => "reused",
            Self::Fetched => "fetched",
            Self::Built => "built",
        };
        write!(f, "{}", name)
    }
}

/// Coordinates validation, locking, fetching and building of index sets
pub struct IndexCoordinator {
    validator: ArtifactValidator,
    locks: LockManager,
    remote: RemoteCache,
    purger: RetentionPurger,
    builder: Arc<dyn IndexBuilder>,
    probe: Arc<dyn ResourceProbe>,
    clock: Arc<dyn Clock>,
    events: EventLog,
    owner: String,
    offline: bool,
    max_wait: Duration,
    memory_hint_mb: u64,
}

impl IndexCoordinator {
    /// Create a coordinator from configuration
    pub fn new(
        config: &Config,
        clock: Arc<dyn Clock>,
        builder: Arc<dyn IndexBuilder>,
        probe: Arc<dyn ResourceProbe>,
        owner: impl Into<String>,
    ) -> Self {
        let owner = owner.into();
        Self {
            validator: ArtifactValidator::new(config.index.clock_skew_tolerance()),
            locks: LockManager::new(clock.clone(), &config.lock),
            remote: RemoteCache::from_config(config, owner.clone()),
            purger: RetentionPurger::new(
                clock.clone(),
                Duration::from_secs(u64::from(config.cache.purge_interval_hours) * 3600),
                config.lock.stale_after(),
            ),
            builder,
            probe,
            clock,
            events: EventLog::disabled(),
            owner,
            offline: config.cache.offline,
            max_wait: config.lock.max_wait(),
            memory_hint_mb: config.index.memory_hint_mb,
        }
    }

    /// Record outcomes in `events`
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    /// Validator used for local checks
    pub fn validator(&self) -> &ArtifactValidator {
        &self.validator
    }

    /// Lock manager used for markers
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Shared cache client
    pub fn remote(&self) -> &RemoteCache {
        &self.remote
    }

    /// Make sure a valid index for `reference` exists beside it
    ///
    /// Errors carry the step they happened in.
    pub async fn ensure_index(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
        ctx: &mut JobContext,
    ) -> FidxResult<IndexSource> {
        match self.run(reference, mode, ctx).await {
            Ok(source) => {
                ctx.set_step("record use");
                self.record_use(reference, mode);
                ctx.update_progress(100.0);
                ctx.set_message(format!("Index {} for {}", source, reference.file_name()));
                info!(reference = reference.file_name(), mode = %mode, %source, "Index ready");
                self.events
                    .record(&JobEvent::IndexReady {
                        reference: reference.path().to_path_buf(),
                        mode: mode.key_space(),
                        source,
                        owner: self.owner.clone(),
                    })
                    .await;
                Ok(source)
            }
            Err(e) => {
                error!(
                    operation = ctx.operation(),
                    step = ctx.step(),
                    reference = reference.file_name(),
                    "Index preparation failed: {}",
                    e
                );
                Err(e.in_step(ctx.operation(), ctx.step()))
            }
        }
    }

    async fn run(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
        ctx: &mut JobContext,
    ) -> FidxResult<IndexSource> {
        ctx.set_step("local check");
        if !reference.path().is_file() {
            return Err(FidxError::ReferenceNotFound(reference.path().to_path_buf()));
        }
        let report = self.validator.validate(reference, mode)?;
        if report.is_valid() {
            return Ok(IndexSource::Reused);
        }
        if report.complete {
            info!(
                reference = reference.file_name(),
                "Local index unusable: {}",
                report.summary()
            );
        }
        ctx.update_progress(5.0);

        let remote_lock = match self.remote.lock_path(reference, mode) {
            Some(lock) if !self.offline => lock,
            _ => {
                debug!(offline = self.offline, "Skipping shared cache");
                return self.build_locally(reference, mode, ctx).await;
            }
        };

        ctx.set_step("remote fetch");
        let waited = self.locks.wait_for_clear(&remote_lock, self.max_wait).await;
        self.note_takeover(waited, &remote_lock, ctx);
        if self.try_pull(reference, mode, ctx)? {
            return Ok(IndexSource::Fetched);
        }

        ctx.set_step("acquire remote lock");
        let held = self.acquire_remote(&remote_lock);
        if held {
            // Someone may have published while we waited
            match self.try_pull(reference, mode, ctx) {
                Ok(true) => {
                    self.locks.release(&remote_lock);
                    return Ok(IndexSource::Fetched);
                }
                Ok(false) => {}
                Err(e) => {
                    self.locks.release(&remote_lock);
                    return Err(e);
                }
            }
        } else {
            ctx.warn(format!(
                "Could not create remote lock {}; building without it",
                remote_lock.display()
            ));
        }

        let built = self.build_locally(reference, mode, ctx).await;

        if held {
            if built.is_ok() {
                ctx.set_step("publish");
                match self.remote.publish(reference, mode) {
                    Ok(count) => debug!(files = count, "Published index"),
                    Err(e) => ctx.warn(format!("Publishing index failed: {}", e)),
                }
            }
            self.locks.release(&remote_lock);
        }
        built
    }

    fn try_pull(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
        ctx: &mut JobContext,
    ) -> FidxResult<bool> {
        match self
            .remote
            .pull(reference, mode, &self.validator, self.probe.as_ref())?
        {
            PullOutcome::Fetched { files, bytes } => {
                ctx.update_progress(90.0);
                info!(
                    reference = reference.file_name(),
                    files,
                    mb = bytes / (1024 * 1024),
                    "Fetched index from shared cache"
                );
                Ok(true)
            }
            PullOutcome::Unavailable(reason) => {
                debug!(reference = reference.file_name(), "Shared index unavailable: {}", reason);
                Ok(false)
            }
        }
    }

    fn acquire_remote(&self, lock: &Path) -> bool {
        if let Some(dir) = lock.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!("Could not create {}: {}", dir.display(), e);
                return false;
            }
        }
        self.locks.acquire(lock, &self.owner)
    }

    async fn build_locally(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
        ctx: &mut JobContext,
    ) -> FidxResult<IndexSource> {
        ctx.set_step("local lock");
        let local_lock = reference.marker_path(&reference.dir(), LOCK_EXTENSION);
        let waited = self.locks.wait_for_clear(&local_lock, self.max_wait).await;
        self.note_takeover(waited, &local_lock, ctx);
        let held = self.locks.acquire(&local_lock, &self.owner);
        if !held {
            ctx.warn(format!(
                "Could not create local lock {}; building without it",
                local_lock.display()
            ));
        }

        let result = self.build_under_lock(reference, mode, ctx).await;
        if held {
            self.locks.release(&local_lock);
        }
        result
    }

    async fn build_under_lock(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
        ctx: &mut JobContext,
    ) -> FidxResult<IndexSource> {
        ctx.set_step("recheck");
        if self.validator.validate(reference, mode)?.is_valid() {
            info!(reference = reference.file_name(), "Index was completed by another job");
            return Ok(IndexSource::Reused);
        }

        ctx.set_step("clean");
        let removed = artifact::remove_artifacts(&reference.dir(), reference);
        if removed > 0 {
            debug!(removed, "Removed partial or outdated index files");
        }

        ctx.set_step("memory check");
        let needed_mb = memory_tier(reference.size()?, self.memory_hint_mb);
        let available_mb = self.probe.free_memory_mb()?;
        if available_mb < needed_mb {
            return Err(FidxError::InsufficientMemory {
                needed_mb,
                available_mb,
            });
        }

        ctx.set_step("build");
        ctx.set_message(format!("Building index for {}", reference.file_name()));
        self.builder.build(reference, mode, needed_mb).await?;

        ctx.set_step("verify build");
        let report = self.validator.validate(reference, mode)?;
        if !report.complete {
            return Err(FidxError::ArtifactsIncomplete {
                reference: reference.file_name().to_string(),
                missing: report.missing.join(", "),
            });
        }
        if !report.is_valid() {
            return Err(FidxError::CorruptArtifact {
                path: reference.artifact_path(&reference.dir(), ".canno"),
                reason: report.summary(),
            });
        }
        ctx.update_progress(90.0);
        Ok(IndexSource::Built)
    }

    fn note_takeover(&self, outcome: WaitOutcome, lock: &Path, ctx: &mut JobContext) {
        if !outcome.took_over() {
            return;
        }
        if outcome == WaitOutcome::RemovedStale {
            ctx.warn(format!("Removed stale lock {}", lock.display()));
        } else {
            ctx.warn(format!(
                "Lock {} outlived the maximum wait and was removed",
                lock.display()
            ));
        }
    }

    /// Update last-used markers and give the shared cache a chance to purge
    fn record_use(&self, reference: &ReferenceFile, mode: DecoyMode) {
        let now = self.clock.now();
        last_used::touch(
            &reference.marker_path(&reference.dir(), LAST_USED_EXTENSION),
            now,
        );

        if self.offline {
            return;
        }
        self.remote.touch_last_used(reference, mode, now);
        if let Some(root) = self.remote.root_for(reference) {
            let report = self.purger.purge_if_due(root);
            if !report.removed.is_empty() {
                info!(
                    root = %root.display(),
                    removed = report.removed.len(),
                    "Retention purge removed cached indexes"
                );
            }
        }
    }
}
