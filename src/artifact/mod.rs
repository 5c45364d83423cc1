//! Reference files and their index artifact sets
//!
//! A FASTA reference file is indexed into a fixed set of sibling files that
//! share its base name. Which suffixes exist depends on whether the index
//! includes a reversed decoy copy of the database.
//!
//! | Suffix | Forward-only | Forward+reverse |
//! |--------|--------------|-----------------|
//! | `.canno`, `.cnlcp`, `.csarr`, `.cseq` | yes | yes |
//! | `.revCat.canno`, `.revCat.cnlcp`, `.revCat.csarr`, `.revCat.cseq`, `.revCat.fasta` | no | yes |

pub mod validate;

pub use validate::{ArtifactValidator, ValidationReport};

use crate::error::{FidxError, FidxResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffixes present in every index
pub const FORWARD_SUFFIXES: &[&str] = &[".canno", ".cnlcp", ".csarr", ".cseq"];

/// Suffixes present only when the tool appends reversed decoys
pub const DECOY_SUFFIXES: &[&str] = &[
    ".revCat.canno",
    ".revCat.cnlcp",
    ".revCat.csarr",
    ".revCat.cseq",
    ".revCat.fasta",
];

/// Extension of the manifest stored beside a shared-cache copy
pub const MANIFEST_EXTENSION: &str = "MSGFPlusIndexFileInfo";

/// Extension of the last-used marker
pub const LAST_USED_EXTENSION: &str = "LastUsed";

/// Extension of lock markers
pub const LOCK_EXTENSION: &str = "lock";

/// Extensions of bookkeeping files that are never part of an artifact set
const HOUSEKEEPING_EXTENSIONS: &[&str] = &[
    MANIFEST_EXTENSION,
    LAST_USED_EXTENSION,
    LOCK_EXTENSION,
    "tmp",
    "hashcheck",
];

/// Whether the index contains reversed decoy sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoyMode {
    /// Reference already carries its decoys (or none are wanted)
    ForwardOnly,
    /// Tool appends reversed sequences to the index
    ForwardReverse,
}

impl DecoyMode {
    /// Value passed to the tool's `-tda` switch
    pub fn tda_arg(&self) -> u8 {
        match self {
            Self::ForwardOnly => 0,
            Self::ForwardReverse => 2,
        }
    }

    /// Subdirectory of the shared cache holding this kind of index
    pub fn key_space(&self) -> &'static str {
        match self {
            Self::ForwardOnly => "ForwardOnly",
            Self::ForwardReverse => "ForwardReverse",
        }
    }

    /// Expected artifact suffixes
    pub fn suffixes(&self) -> Vec<&'static str> {
        let mut suffixes = FORWARD_SUFFIXES.to_vec();
        if matches!(self, Self::ForwardReverse) {
            suffixes.extend_from_slice(DECOY_SUFFIXES);
        }
        suffixes
    }
}

impl fmt::Display for DecoyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ForwardOnly => "forward-only",
            Self::ForwardReverse => "forward+reverse",
        };
        write!(f, "{}", name)
    }
}

/// A FASTA reference file and the identity derived from its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFile {
    path: PathBuf,
    file_name: String,
    base_name: String,
    generated_id: Option<u64>,
}

impl ReferenceFile {
    /// Describe the reference at `path` (existence is not checked)
    pub fn new(path: impl Into<PathBuf>) -> FidxResult<Self> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| FidxError::ReferenceNotFound(path.clone()))?;
        let base_name = path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.clone());
        let generated_id = parse_generated_id(&file_name);

        Ok(Self {
            path,
            file_name,
            base_name,
            generated_id,
        })
    }

    /// Full path to the FASTA file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name including extension
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// File name without its final extension
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Numeric ID for generated (`ID_<n>_<hash>`) references
    pub fn generated_id(&self) -> Option<u64> {
        self.generated_id
    }

    /// Generated references are named by content; their mtime says nothing
    /// about staleness
    pub fn is_generated(&self) -> bool {
        self.generated_id.is_some()
    }

    /// Directory holding the FASTA file and its local artifacts
    pub fn dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Shared-cache bucket: `floor(id / width) * width` or `Other`
    pub fn bucket_name(&self, bucket_size: u64) -> String {
        match self.generated_id {
            Some(id) if bucket_size > 0 => ((id / bucket_size) * bucket_size).to_string(),
            Some(id) => id.to_string(),
            None => "Other".to_string(),
        }
    }

    /// Path of the artifact with `suffix` inside `dir`
    pub fn artifact_path(&self, dir: &Path, suffix: &str) -> PathBuf {
        dir.join(format!("{}{}", self.base_name, suffix))
    }

    /// Path of a bookkeeping file (`<file name>.<extension>`) inside `dir`
    pub fn marker_path(&self, dir: &Path, extension: &str) -> PathBuf {
        dir.join(format!("{}.{}", self.file_name, extension))
    }

    /// Modification time of the FASTA file
    pub fn modified(&self) -> FidxResult<DateTime<Utc>> {
        modified_utc(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FidxError::ReferenceNotFound(self.path.clone()),
            _ => FidxError::io(format!("reading mtime of {}", self.path.display()), e),
        })
    }

    /// Size of the FASTA file in bytes
    pub fn size(&self) -> FidxResult<u64> {
        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FidxError::ReferenceNotFound(self.path.clone()),
                _ => FidxError::io(format!("reading size of {}", self.path.display()), e),
            })
    }
}

/// Parse `ID_<digits>_...` names
fn parse_generated_id(file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix("ID_")?;
    let end = rest.find('_')?;
    let digits = &rest[..end];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Modification time of `path` in UTC
pub fn modified_utc(path: &Path) -> std::io::Result<DateTime<Utc>> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Whether `name` ends in a bookkeeping extension
fn is_housekeeping(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            HOUSEKEEPING_EXTENSIONS
                .iter()
                .any(|h| ext.eq_ignore_ascii_case(h))
        })
        .unwrap_or(false)
}

/// Files in `dir` that belong to the reference's artifact set
///
/// Matches every file named `<base>.*`, excluding the FASTA file itself,
/// bookkeeping files (locks, manifests, markers, temporaries) and the sets of
/// other references whose names extend `<base>.`.
pub fn related_files(dir: &Path, reference: &ReferenceFile) -> FidxResult<Vec<PathBuf>> {
    let prefix = format!("{}.", reference.base_name());
    let own_decoy = format!("{}.revCat", reference.base_name());
    let entries = fs::read_dir(dir)
        .map_err(|e| FidxError::io(format!("listing {}", dir.display()), e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FidxError::io(format!("listing {}", dir.display()), e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(&prefix) || name == reference.file_name() || is_housekeeping(&name) {
            continue;
        }
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            candidates.push((name, entry.path()));
        }
    }

    // `yeast.v2.fasta` beside `yeast.fasta` owns its own `yeast.v2.*` files
    let siblings: Vec<String> = candidates
        .iter()
        .filter_map(|(name, _)| name.strip_suffix(".fasta"))
        .filter(|stem| *stem != own_decoy)
        .map(|stem| format!("{}.", stem))
        .collect();
    let mut files: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|(name, _)| !siblings.iter().any(|s| name.starts_with(s.as_str())))
        .map(|(_, path)| path)
        .collect();

    files.sort();
    Ok(files)
}

/// Delete every known artifact of the reference in `dir`
///
/// Removes the suffixes of both decoy modes so a partial or incompatible set
/// never survives a rebuild. Returns the number of files removed.
pub fn remove_artifacts(dir: &Path, reference: &ReferenceFile) -> usize {
    let mut removed = 0;
    for suffix in DecoyMode::ForwardReverse.suffixes() {
        let path = reference.artifact_path(dir, suffix);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed stale artifact {}", path.display());
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generated_reference_parses_id() {
        let reference = ReferenceFile::new("/org/ID_003456_9B916A8B.fasta").unwrap();
        assert_eq!(reference.generated_id(), Some(3456));
        assert!(reference.is_generated());
        assert_eq!(reference.base_name(), "ID_003456_9B916A8B");
        assert_eq!(reference.bucket_name(1000), "3000");
    }

    #[test]
    fn legacy_reference_goes_to_other() {
        let reference = ReferenceFile::new("/org/H_sapiens_Uniprot_2021.fasta").unwrap();
        assert!(!reference.is_generated());
        assert_eq!(reference.bucket_name(1000), "Other");
    }

    #[test]
    fn malformed_id_is_legacy() {
        assert_eq!(parse_generated_id("ID_abc_123.fasta"), None);
        assert_eq!(parse_generated_id("ID__123.fasta"), None);
        assert_eq!(parse_generated_id("ID_42.fasta"), None);
        assert_eq!(parse_generated_id("ID_999_x.fasta"), Some(999));
    }

    #[test]
    fn decoy_mode_suffixes() {
        assert_eq!(DecoyMode::ForwardOnly.suffixes().len(), 4);
        assert_eq!(DecoyMode::ForwardReverse.suffixes().len(), 9);
        assert_eq!(DecoyMode::ForwardOnly.tda_arg(), 0);
        assert_eq!(DecoyMode::ForwardReverse.tda_arg(), 2);
    }

    #[test]
    fn artifact_and_marker_paths() {
        let reference = ReferenceFile::new("/org/yeast.fasta").unwrap();
        let dir = Path::new("/cache");
        assert_eq!(
            reference.artifact_path(dir, ".revCat.cseq"),
            PathBuf::from("/cache/yeast.revCat.cseq")
        );
        assert_eq!(
            reference.marker_path(dir, LOCK_EXTENSION),
            PathBuf::from("/cache/yeast.fasta.lock")
        );
    }

    #[test]
    fn related_files_skips_housekeeping() {
        let dir = TempDir::new().unwrap();
        for name in [
            "yeast.fasta",
            "yeast.canno",
            "yeast.revCat.fasta",
            "yeast.fasta.lock",
            "yeast.fasta.LastUsed",
            "yeast.fasta.MSGFPlusIndexFileInfo",
            "yeast2.canno",
            "other.canno",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let reference = ReferenceFile::new(dir.path().join("yeast.fasta")).unwrap();

        let files = related_files(dir.path(), &reference).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["yeast.canno", "yeast.revCat.fasta"]);
    }

    #[test]
    fn related_files_leave_sibling_references_alone() {
        let dir = TempDir::new().unwrap();
        for name in [
            "yeast.fasta",
            "yeast.canno",
            "yeast.revCat.fasta",
            "yeast.revCat.cseq",
            "yeast.v2.fasta",
            "yeast.v2.canno",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let reference = ReferenceFile::new(dir.path().join("yeast.fasta")).unwrap();

        let files = related_files(dir.path(), &reference).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["yeast.canno", "yeast.revCat.cseq", "yeast.revCat.fasta"]);
    }

    #[test]
    fn remove_artifacts_deletes_both_modes() {
        let dir = TempDir::new().unwrap();
        let reference = ReferenceFile::new(dir.path().join("yeast.fasta")).unwrap();
        fs::write(dir.path().join("yeast.fasta"), b">p\nPEPTIDE\n").unwrap();
        fs::write(dir.path().join("yeast.canno"), b"x").unwrap();
        fs::write(dir.path().join("yeast.revCat.cseq"), b"x").unwrap();

        assert_eq!(remove_artifacts(dir.path(), &reference), 2);
        assert!(dir.path().join("yeast.fasta").exists());
        assert!(!dir.path().join("yeast.canno").exists());
    }
}
