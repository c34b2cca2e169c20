//! Space accountant: total / used / available bytes of a pool's filesystem.
//!
//! A pool whose root is missing, or whose root should be a mount point but
//! is not (removable media not attached), is reported as
//! [`StoreError::PoolUnavailable`]. Any other failure is
//! [`StoreError::MeasurementFailed`]. Both mean "skip this pool".

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tierkeep_core::pool::{SpaceUsage, StoragePool};

use crate::blocking::run_with_timeout;
use crate::error::StoreError;

/// Default bound on a single measurement.
pub const DEFAULT_MEASURE_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait SpaceAccountant: Send + Sync {
    async fn measure(&self, pool: &StoragePool) -> Result<SpaceUsage, StoreError>;
}

/// Reads capacity with `statvfs(3)` on the pool root.
#[derive(Debug, Clone)]
pub struct StatvfsAccountant {
    timeout: Duration,
}

impl Default for StatvfsAccountant {
    fn default() -> Self {
        Self::new(DEFAULT_MEASURE_TIMEOUT)
    }
}

impl StatvfsAccountant {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl SpaceAccountant for StatvfsAccountant {
    async fn measure(&self, pool: &StoragePool) -> Result<SpaceUsage, StoreError> {
        let pool_id = pool.id.clone();
        let root = pool.root.clone();
        let require_mount = pool.require_mount;

        let result = run_with_timeout("statvfs", self.timeout, move || {
            check_reachable(&pool_id, &root, require_mount)?;
            disk_stats(&root).map_err(|e| StoreError::MeasurementFailed {
                pool: pool_id.clone(),
                reason: e.to_string(),
            })
        })
        .await;

        match result {
            Ok(usage) => {
                tracing::debug!(
                    pool = %pool.id,
                    total_bytes = usage.total_bytes,
                    available_bytes = usage.available_bytes,
                    "Measured pool"
                );
                Ok(usage)
            }
            // A hung mount (stale NFS, sleeping USB disk) is a measurement failure.
            Err(StoreError::Timeout { elapsed_ms, .. }) => Err(StoreError::MeasurementFailed {
                pool: pool.id.clone(),
                reason: format!("statvfs timed out after {elapsed_ms}ms"),
            }),
            Err(e) => Err(e),
        }
    }
}

/// The root must exist, be a directory, and (optionally) be a mount point.
fn check_reachable(pool_id: &str, root: &Path, require_mount: bool) -> Result<(), StoreError> {
    let unavailable = |reason: String| StoreError::PoolUnavailable {
        pool: pool_id.to_string(),
        reason,
    };

    let meta = std::fs::metadata(root)
        .map_err(|e| unavailable(format!("{} is not reachable: {e}", root.display())))?;
    if !meta.is_dir() {
        return Err(unavailable(format!("{} is not a directory", root.display())));
    }

    if require_mount && !is_mount_point(root, &meta) {
        return Err(unavailable(format!(
            "{} is not a mount point (media not attached?)",
            root.display()
        )));
    }

    Ok(())
}

/// A directory is a mount point when it lives on a different device than
/// its parent. The filesystem root always counts.
#[cfg(unix)]
fn is_mount_point(root: &Path, meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;

    let parent: PathBuf = match root.canonicalize() {
        Ok(canonical) => match canonical.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return true,
        },
        Err(_) => return false,
    };
    match std::fs::metadata(&parent) {
        Ok(parent_meta) => parent_meta.dev() != meta.dev(),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_mount_point(_root: &Path, _meta: &std::fs::Metadata) -> bool {
    true
}

/// Read capacity for the filesystem holding `path`.
#[cfg(unix)]
fn disk_stats(path: &Path) -> std::io::Result<SpaceUsage> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    // Safety: `c_path` is a valid NUL-terminated string and `stat` points to
    // writable memory of the right size.
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // Safety: statvfs returned 0, so the struct is initialised.
    let stat = unsafe { stat.assume_init() };

    let block_size = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * block_size;
    let free = stat.f_bfree as u64 * block_size;
    let available = stat.f_bavail as u64 * block_size;

    Ok(SpaceUsage {
        total_bytes: total,
        used_bytes: total.saturating_sub(free),
        available_bytes: available,
    })
}

#[cfg(not(unix))]
fn disk_stats(_path: &Path) -> std::io::Result<SpaceUsage> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "statvfs is only available on Unix",
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
