//! Filesystem-backed unit catalog.
//!
//! A pool root holds one entry per unit, named per
//! [`tierkeep_core::unit::unit_name`], plus optional `<unit>.base` sidecars
//! recording which unit an incremental snapshot was linked against. The
//! listing is rebuilt from disk on every call and only reads names; a unit
//! tree is walked only when [`UnitStore::unit_size`] asks for it.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tierkeep_core::pool::StoragePool;
use tierkeep_core::unit::{parse_unit_name, sort_newest_first, BackupUnit};

use crate::blocking::run_with_timeout;
use crate::error::StoreError;

/// Default bound on listing or deleting one unit. Removing a large snapshot
/// tree on a slow disk can take a while.
pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Suffix of the sidecar holding an incremental unit's base id.
const BASE_SIDECAR_SUFFIX: &str = ".base";

/// Catalog plus the mutating commands the engine issues against a pool.
#[async_trait]
pub trait UnitStore: Send + Sync {
    /// Units in the pool, newest first, with `size_bytes` unset. Empty
    /// pool → empty vec.
    async fn list(&self, pool: &StoragePool) -> Result<Vec<BackupUnit>, StoreError>;

    /// Delete a unit (directory or file) and its sidecar. Deleting a unit
    /// that is already gone succeeds.
    async fn remove(&self, pool: &StoragePool, unit_id: &str) -> Result<(), StoreError>;

    /// Record the base an incremental unit was linked against.
    async fn record_base(
        &self,
        pool: &StoragePool,
        unit_id: &str,
        base: &str,
    ) -> Result<(), StoreError>;

    /// Bytes deleting this unit would free: its files minus anything still
    /// hard-linked from outside it.
    async fn unit_size(&self, pool: &StoragePool, unit_id: &str) -> Result<u64, StoreError>;

    /// Where a unit with this id lives.
    fn unit_path(&self, pool: &StoragePool, unit_id: &str) -> Result<PathBuf, StoreError> {
        unit_path(&pool.root, unit_id)
    }
}

/// Resolve a unit id under the pool root, refusing anything that could
/// escape it.
pub fn unit_path(root: &Path, unit_id: &str) -> Result<PathBuf, StoreError> {
    if unit_id.is_empty()
        || unit_id.starts_with('.')
        || unit_id.contains('/')
        || unit_id.contains('\\')
        || unit_id.contains('\0')
    {
        return Err(StoreError::InvalidUnitId(unit_id.to_string()));
    }
    Ok(root.join(unit_id))
}

#[derive(Debug, Clone)]
pub struct FsUnitStore {
    timeout: Duration,
}

impl Default for FsUnitStore {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_TIMEOUT)
    }
}

impl FsUnitStore {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl UnitStore for FsUnitStore {
    async fn list(&self, pool: &StoragePool) -> Result<Vec<BackupUnit>, StoreError> {
        let pool = pool.clone();
        run_with_timeout("list units", self.timeout, move || list_blocking(&pool)).await
    }

    async fn remove(&self, pool: &StoragePool, unit_id: &str) -> Result<(), StoreError> {
        let path = unit_path(&pool.root, unit_id)?;
        let sidecar = sidecar_path(&pool.root, unit_id);
        run_with_timeout("remove unit", self.timeout, move || {
            remove_path(&path)?;
            match fs::remove_file(&sidecar) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::io(sidecar, e)),
            }
        })
        .await
    }

    async fn record_base(
        &self,
        pool: &StoragePool,
        unit_id: &str,
        base: &str,
    ) -> Result<(), StoreError> {
        unit_path(&pool.root, unit_id)?;
        unit_path(&pool.root, base)?;
        let sidecar = sidecar_path(&pool.root, unit_id);
        let contents = format!("{base}\n");
        run_with_timeout("record base", self.timeout, move || {
            fs::write(&sidecar, contents).map_err(|e| StoreError::io(sidecar, e))
        })
        .await
    }

    async fn unit_size(&self, pool: &StoragePool, unit_id: &str) -> Result<u64, StoreError> {
        let path = unit_path(&pool.root, unit_id)?;
        run_with_timeout("size unit", self.timeout, move || {
            reclaimable_size(&path).map_err(|e| StoreError::io(path, e))
        })
        .await
    }
}

fn sidecar_path(root: &Path, unit_id: &str) -> PathBuf {
    root.join(format!("{unit_id}{BASE_SIDECAR_SUFFIX}"))
}

fn list_blocking(pool: &StoragePool) -> Result<Vec<BackupUnit>, StoreError> {
    let entries = fs::read_dir(&pool.root).map_err(|e| StoreError::io(&pool.root, e))?;

    let mut units = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(&pool.root, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let Some(created_at) = parse_unit_name(pool.kind, name) else {
            tracing::debug!(pool = %pool.id, entry = name, "Ignoring non-unit entry");
            continue;
        };

        let base = read_base(&sidecar_path(&pool.root, name));

        units.push(BackupUnit {
            pool_id: pool.id.clone(),
            id: name.to_string(),
            created_at,
            size_bytes: None,
            base,
            kind: pool.kind,
        });
    }

    sort_newest_first(&mut units);
    Ok(units)
}

fn read_base(sidecar: &Path) -> Option<String> {
    let text = fs::read_to_string(sidecar).ok()?;
    let base = text.trim();
    (!base.is_empty()).then(|| base.to_string())
}

fn remove_path(path: &Path) -> Result<(), StoreError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| StoreError::io(path, e))
}

/// Bytes freed by deleting `path`.
///
/// A file hard-linked from elsewhere (an older or newer snapshot sharing it
/// through `--link-dest`) keeps its data after the unit is gone, so an
/// inode counts only when every one of its links lies inside the unit.
fn reclaimable_size(path: &Path) -> io::Result<u64> {
    let meta = fs::symlink_metadata(path)?;
    let mut tally = LinkTally::default();
    if !meta.is_dir() {
        tally.add(&meta);
        return Ok(tally.total());
    }

    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else if meta.is_file() {
                tally.add(&meta);
            }
        }
    }
    Ok(tally.total())
}

/// Regular files seen while walking one unit.
#[derive(Debug, Default)]
struct LinkTally {
    /// Files with a single link.
    private_bytes: u64,
    /// Multiply-linked inodes by `(dev, ino)`.
    linked: HashMap<(u64, u64), LinkedInode>,
}

#[derive(Debug)]
struct LinkedInode {
    len: u64,
    nlink: u64,
    seen: u64,
}

impl LinkTally {
    #[cfg(unix)]
    fn add(&mut self, meta: &fs::Metadata) {
        use std::os::unix::fs::MetadataExt;

        if meta.nlink() <= 1 {
            self.private_bytes += meta.len();
            return;
        }
        let inode = self
            .linked
            .entry((meta.dev(), meta.ino()))
            .or_insert(LinkedInode {
                len: meta.len(),
                nlink: meta.nlink(),
                seen: 0,
            });
        inode.seen += 1;
    }

    #[cfg(not(unix))]
    fn add(&mut self, meta: &fs::Metadata) {
        self.private_bytes += meta.len();
    }

    fn total(&self) -> u64 {
        let owned: u64 = self
            .linked
            .values()
            .filter(|inode| inode.seen >= inode.nlink)
            .map(|inode| inode.len)
            .sum();
        self.private_bytes + owned
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
