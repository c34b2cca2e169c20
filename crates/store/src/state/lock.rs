//! Advisory per-pool lock, held across processes with `flock(2)`.
//!
//! Two overlapping runs (a manual `tierkeep run` while the scheduled one is
//! still deleting) must not work on the same pool at once. The lock is
//! released when the guard is dropped or the process exits.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use super::StateDir;
use crate::blocking::run_with_timeout;
use crate::error::StoreError;

/// Pause between attempts while another holder has the lock.
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub struct PoolLock {
    pool_id: String,
    path: PathBuf,
    file: File,
}

impl PoolLock {
    pub fn pool_id(&self) -> &str {
        &self.pool_id
    }
}

impl StateDir {
    /// Take the lock for `pool_id`, waiting up to `timeout` for a current
    /// holder to let go.
    pub async fn lock_pool(
        &self,
        pool_id: &str,
        timeout: Duration,
    ) -> Result<PoolLock, StoreError> {
        let path = self.lock_path(pool_id);
        let file = {
            let path = path.clone();
            run_with_timeout("open pool lock", self.timeout, move || {
                OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&path)
                    .map_err(|e| StoreError::io(&path, e))
            })
            .await?
        };

        let deadline = Instant::now() + timeout;
        loop {
            match try_lock(&file) {
                Ok(true) => {
                    tracing::debug!(pool = %pool_id, "Acquired pool lock");
                    return Ok(PoolLock {
                        pool_id: pool_id.to_string(),
                        path,
                        file,
                    });
                }
                Ok(false) => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
            if Instant::now() >= deadline {
                return Err(StoreError::LockTimeout {
                    pool: pool_id.to_string(),
                });
            }
            tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
        }
    }
}

impl Drop for PoolLock {
    fn drop(&mut self) {
        if let Err(e) = unlock(&self.file) {
            tracing::warn!(
                pool = %self.pool_id,
                path = %self.path.display(),
                error = %e,
                "Failed to release pool lock"
            );
        }
    }
}

/// `Ok(false)` when someone else holds the lock.
#[cfg(unix)]
fn try_lock(file: &File) -> std::io::Result<bool> {
    use std::os::fd::AsRawFd;

    // Safety: the descriptor is owned by `file` and valid for this call.
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if ret == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(unix)]
fn unlock(file: &File) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    // Safety: as above.
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> std::io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn unlock(_file: &File) -> std::io::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
