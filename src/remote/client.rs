//! Pulling index sets from, and publishing them to, the shared cache

use crate::artifact::{
    self, modified_utc, ArtifactValidator, DecoyMode, ReferenceFile, LAST_USED_EXTENSION,
    LOCK_EXTENSION, MANIFEST_EXTENSION,
};
use crate::config::Config;
use crate::error::{FidxError, FidxResult};
use crate::remote::copy::copy_with_lock;
use crate::remote::last_used;
use crate::remote::manifest::Manifest;
use crate::system::ResourceProbe;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of a pull attempt that did not hit a hard error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The set was copied and validated locally
    Fetched {
        /// Files copied
        files: usize,
        /// Bytes copied
        bytes: u64,
    },
    /// No usable set on the shared cache
    Unavailable(String),
}

impl PullOutcome {
    /// Whether the local set is now usable
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched { .. })
    }
}

/// Client for the shared index cache
#[derive(Debug, Clone)]
pub struct RemoteCache {
    generated_root: Option<PathBuf>,
    legacy_root: Option<PathBuf>,
    bucket_size: u64,
    disk_margin: u64,
    owner: String,
}

impl RemoteCache {
    /// Create a client for the given cache roots
    pub fn new(
        generated_root: Option<PathBuf>,
        legacy_root: Option<PathBuf>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            generated_root,
            legacy_root,
            bucket_size: 1000,
            disk_margin: 0,
            owner: owner.into(),
        }
    }

    /// Create a client from configuration
    pub fn from_config(config: &Config, owner: impl Into<String>) -> Self {
        Self::new(
            config.cache.generated_dir.clone(),
            config.cache.legacy_dir.clone(),
            owner,
        )
        .with_bucket_size(config.cache.bucket_size)
        .with_disk_margin(config.index.disk_margin_bytes())
    }

    /// Width of generated-ID buckets
    pub fn with_bucket_size(mut self, bucket_size: u64) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    /// Free space required beyond the set size before copying
    pub fn with_disk_margin(mut self, bytes: u64) -> Self {
        self.disk_margin = bytes;
        self
    }

    /// Cache root for this kind of reference
    pub fn root_for(&self, reference: &ReferenceFile) -> Option<&Path> {
        if reference.is_generated() {
            self.generated_root.as_deref()
        } else {
            self.legacy_root.as_deref()
        }
    }

    /// Directory holding the reference's set for `mode`
    pub fn set_dir(&self, reference: &ReferenceFile, mode: DecoyMode) -> Option<PathBuf> {
        self.root_for(reference).map(|root| {
            root.join(reference.bucket_name(self.bucket_size))
                .join(mode.key_space())
        })
    }

    /// Lock marker guarding the shared copy
    pub fn lock_path(&self, reference: &ReferenceFile, mode: DecoyMode) -> Option<PathBuf> {
        self.set_dir(reference, mode)
            .map(|dir| reference.marker_path(&dir, LOCK_EXTENSION))
    }

    /// Manifest of the shared copy
    pub fn manifest_path(&self, reference: &ReferenceFile, mode: DecoyMode) -> Option<PathBuf> {
        self.set_dir(reference, mode)
            .map(|dir| reference.marker_path(&dir, MANIFEST_EXTENSION))
    }

    /// Copy the shared set next to the local reference file
    ///
    /// Every listed file is checked (existence, size, and for legacy
    /// references freshness) before any byte is copied. Running out of local
    /// disk space is a hard `InsufficientDisk` error; every other reason the
    /// set can't be used, including a failed copy, is reported as
    /// [`PullOutcome::Unavailable`] and leaves no partial copies behind.
    pub fn pull(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
        validator: &ArtifactValidator,
        probe: &dyn ResourceProbe,
    ) -> FidxResult<PullOutcome> {
        let Some(remote_dir) = self.set_dir(reference, mode) else {
            return Ok(PullOutcome::Unavailable(
                "no shared cache configured for this reference".to_string(),
            ));
        };
        let manifest_path = reference.marker_path(&remote_dir, MANIFEST_EXTENSION);

        let manifest = match Manifest::read(&manifest_path) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                return Ok(PullOutcome::Unavailable(format!(
                    "manifest not found: {}",
                    manifest_path.display()
                )))
            }
            Err(FidxError::ManifestInvalid { reason, .. }) => {
                return Ok(PullOutcome::Unavailable(format!(
                    "manifest {} is invalid: {}",
                    manifest_path.display(),
                    reason
                )))
            }
            Err(e) => return Err(e),
        };

        if let Some(problem) = self.check_remote(reference, mode, &remote_dir, &manifest, validator)? {
            info!(reference = reference.file_name(), "Shared index unusable: {}", problem);
            return Ok(PullOutcome::Unavailable(problem));
        }

        let local_dir = reference.dir();
        let needed = manifest.total_size() + self.disk_margin;
        let available = probe.free_disk_bytes(&local_dir)?;
        if available < needed {
            return Err(FidxError::InsufficientDisk {
                path: local_dir,
                needed,
                available,
            });
        }

        info!(
            reference = reference.file_name(),
            files = manifest.entries.len(),
            bytes = manifest.total_size(),
            "Copying index from {}",
            remote_dir.display()
        );

        let mut bytes = 0;
        let mut copied = Vec::with_capacity(manifest.entries.len());
        for entry in &manifest.entries {
            let src = remote_dir.join(&entry.file_name);
            let dest = local_dir.join(&entry.file_name);
            match copy_with_lock(&src, &dest, &self.owner) {
                Ok(n) => {
                    bytes += n;
                    copied.push(dest);
                }
                Err(e) => {
                    warn!(
                        reference = reference.file_name(),
                        "Copy of {} failed: {}",
                        src.display(),
                        e
                    );
                    discard_partial(&copied);
                    return Ok(PullOutcome::Unavailable(format!(
                        "copying {} failed: {}",
                        src.display(),
                        e
                    )));
                }
            }
        }

        let report = validator.validate(reference, mode)?;
        if !report.is_valid() {
            warn!(
                reference = reference.file_name(),
                "Copied index failed validation: {}",
                report.summary()
            );
            return Ok(PullOutcome::Unavailable(format!(
                "copied index failed validation: {}",
                report.summary()
            )));
        }

        Ok(PullOutcome::Fetched {
            files: manifest.entries.len(),
            bytes,
        })
    }

    /// Verify the shared copy against its manifest without copying anything
    ///
    /// Returns a description of the first problem found.
    fn check_remote(
        &self,
        reference: &ReferenceFile,
        mode: DecoyMode,
        remote_dir: &Path,
        manifest: &Manifest,
        validator: &ArtifactValidator,
    ) -> FidxResult<Option<String>> {
        for suffix in mode.suffixes() {
            let name = format!("{}{}", reference.base_name(), suffix);
            if manifest.get(&name).is_none() {
                return Ok(Some(format!("manifest does not list {}", name)));
            }
        }

        let freshness_floor: Option<DateTime<Utc>> = if reference.is_generated() {
            None
        } else {
            let tolerance = chrono::Duration::from_std(validator.skew_tolerance())
                .unwrap_or(chrono::Duration::zero());
            Some(reference.modified()? - tolerance)
        };

        for entry in &manifest.entries {
            let path = remote_dir.join(&entry.file_name);
            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(_) => return Ok(Some(format!("{} is missing", path.display()))),
            };
            if !metadata.is_file() {
                return Ok(Some(format!("{} is not a regular file", path.display())));
            }
            if metadata.len() != entry.size {
                return Ok(Some(format!(
                    "{} is {} bytes; manifest says {}",
                    path.display(),
                    metadata.len(),
                    entry.size
                )));
            }
            if let Some(floor) = freshness_floor {
                let mtime = modified_utc(&path)
                    .map_err(|e| FidxError::io(format!("reading mtime of {}", path.display()), e))?;
                if mtime < floor {
                    return Ok(Some(format!("{} is older than the reference", path.display())));
                }
            }
        }

        Ok(None)
    }

    /// Copy the local set to the shared cache and write its manifest
    ///
    /// The old manifest is removed first and the new one written last.
    /// Returns the number of files published.
    pub fn publish(&self, reference: &ReferenceFile, mode: DecoyMode) -> FidxResult<usize> {
        let remote_dir = self
            .set_dir(reference, mode)
            .ok_or_else(|| FidxError::Internal("no shared cache configured".to_string()))?;
        fs::create_dir_all(&remote_dir)
            .map_err(|e| FidxError::io(format!("creating {}", remote_dir.display()), e))?;

        let local_files = artifact::related_files(&reference.dir(), reference)?;
        if local_files.is_empty() {
            return Err(FidxError::ArtifactsIncomplete {
                reference: reference.file_name().to_string(),
                missing: "all index files".to_string(),
            });
        }

        let manifest_path = reference.marker_path(&remote_dir, MANIFEST_EXTENSION);
        match fs::remove_file(&manifest_path) {
            Ok(()) => debug!("Removed superseded manifest {}", manifest_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(FidxError::io(
                    format!("removing manifest {}", manifest_path.display()),
                    e,
                ))
            }
        }

        let mut published = Vec::with_capacity(local_files.len());
        for src in &local_files {
            let Some(name) = src.file_name() else { continue };
            let dest = remote_dir.join(name);
            copy_with_lock(src, &dest, &self.owner)
                .map_err(|e| FidxError::io(format!("publishing {}", src.display()), e))?;
            published.push(dest);
        }

        Manifest::from_files(&published)?.write(&manifest_path)?;

        info!(
            reference = reference.file_name(),
            files = published.len(),
            "Published index to {}",
            remote_dir.display()
        );
        Ok(published.len())
    }

    /// Record a use of the shared copy
    pub fn touch_last_used(&self, reference: &ReferenceFile, mode: DecoyMode, now: DateTime<Utc>) {
        if let Some(dir) = self.set_dir(reference, mode) {
            if dir.is_dir() {
                last_used::touch(&reference.marker_path(&dir, LAST_USED_EXTENSION), now);
            }
        }
    }
}

/// Remove files copied by a pull that could not finish
fn discard_partial(copied: &[PathBuf]) {
    for path in copied {
        if let Err(e) = fs::remove_file(path) {
            debug!("Could not remove partial copy {}: {}", path.display(), e);
        }
    }
}
