//! Host resource probes (free disk, free memory)

use crate::error::{FidxError, FidxResult};
use std::path::Path;

/// Source of free-resource measurements
pub trait ResourceProbe: Send + Sync {
    /// Bytes available to unprivileged users on the filesystem holding `path`
    fn free_disk_bytes(&self, path: &Path) -> FidxResult<u64>;

    /// Memory available for new processes, in MB
    fn free_memory_mb(&self) -> FidxResult<u64>;
}

/// Probe that asks the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl ResourceProbe for HostProbe {
    fn free_disk_bytes(&self, path: &Path) -> FidxResult<u64> {
        // Directories that are about to be created report their parent's filesystem
        let existing = path
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or_else(|| Path::new("."));
        statvfs_available(existing)
            .map_err(|e| FidxError::io(format!("querying free space of {}", existing.display()), e))
    }

    fn free_memory_mb(&self) -> FidxResult<u64> {
        match std::fs::read_to_string("/proc/meminfo") {
            Ok(content) => Ok(parse_mem_available_mb(&content).unwrap_or(u64::MAX)),
            // No meminfo outside Linux; don't block builds on an unknown
            Err(_) => Ok(u64::MAX),
        }
    }
}

#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn statvfs_available(path: &Path) -> std::io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // SAFETY: statvfs only writes into the zeroed struct we own
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}

#[cfg(not(unix))]
fn statvfs_available(_path: &Path) -> std::io::Result<u64> {
    Ok(u64::MAX)
}

/// Extract `MemAvailable` from `/proc/meminfo` contents
fn parse_mem_available_mb(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
        Some(kb / 1024)
    })
}

/// Probe returning fixed values
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe {
    /// Reported free disk bytes
    pub disk_bytes: u64,
    /// Reported free memory MB
    pub memory_mb: u64,
}

impl FixedProbe {
    /// Effectively unlimited resources
    pub fn unlimited() -> Self {
        Self {
            disk_bytes: u64::MAX,
            memory_mb: u64::MAX,
        }
    }
}

impl ResourceProbe for FixedProbe {
    fn free_disk_bytes(&self, _path: &Path) -> FidxResult<u64> {
        Ok(self.disk_bytes)
    }

    fn free_memory_mb(&self) -> FidxResult<u64> {
        Ok(self.memory_mb)
    }
}
