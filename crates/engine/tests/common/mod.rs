//! In-memory stand-ins for the store traits.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tierkeep_core::clock::FixedClock;
use tierkeep_core::config::ResolvedConfig;
use tierkeep_core::policy::RetentionPolicy;
use tierkeep_core::pool::{CreationPolicy, PoolKind, SpaceUsage, StoragePool};
use tierkeep_core::types::Timestamp;
use tierkeep_core::unit::{parse_unit_name, sort_newest_first, unit_name, BackupUnit};
use tierkeep_engine::Services;
use tierkeep_store::{
    ArchiveRequest, ArchiveResult, Archiver, CollaboratorError, CopyRequest, CopyResult,
    DeltaCopier, RepoProbe, SpaceAccountant, StateDir, StoreError, UnitStore,
};

pub const GB: u64 = 1024 * 1024 * 1024;

pub fn ts(s: &str) -> Timestamp {
    s.parse().expect("timestamp")
}

pub fn now() -> Timestamp {
    // A Saturday in ISO week 2026-W42.
    ts("2026-10-17T12:00:00Z")
}

pub fn pool(id: &str, kind: PoolKind, creation: Option<CreationPolicy>) -> StoragePool {
    StoragePool {
        id: id.into(),
        kind,
        root: PathBuf::from("/fake").join(id),
        warning_threshold: 50 * GB,
        critical_threshold: 10 * GB,
        require_mount: false,
        cloud_mirror: false,
        creation,
    }
}

pub fn config(pools: Vec<StoragePool>) -> ResolvedConfig {
    ResolvedConfig {
        pools,
        policy: RetentionPolicy::default(),
        repositories: Vec::new(),
        monthly_window_days: 7,
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct FakePool {
    id: String,
    root: PathBuf,
    kind: PoolKind,
    total: u64,
    available: u64,
    units: Vec<BackupUnit>,
    /// What deleting each unit frees. Listings never carry it.
    sizes: HashMap<String, u64>,
    unavailable: bool,
    list_fails: bool,
    record_base_fails: bool,
    failing_deletes: HashSet<String>,
}

/// Pools, their units and their free space. Deleting a unit frees its size.
#[derive(Debug, Default)]
pub struct FakeStorage {
    pools: Mutex<HashMap<String, FakePool>>,
    /// Every unit id passed to `unit_size`, in call order.
    pub sized: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub fn add_pool(&self, pool: &StoragePool, total: u64, available: u64) {
        self.pools.lock().unwrap().insert(
            pool.id.clone(),
            FakePool {
                id: pool.id.clone(),
                root: pool.root.clone(),
                kind: pool.kind,
                total,
                available,
                units: Vec::new(),
                sizes: HashMap::new(),
                unavailable: false,
                list_fails: false,
                record_base_fails: false,
                failing_deletes: HashSet::new(),
            },
        );
    }

    /// Add a unit created `at`; returns its id.
    pub fn add_unit(&self, pool: &StoragePool, at: Timestamp, size: u64) -> String {
        let id = unit_name(pool.kind, at);
        let mut pools = self.pools.lock().unwrap();
        let fake = pools.get_mut(&pool.id).expect("pool registered");
        fake.units.push(BackupUnit {
            pool_id: pool.id.clone(),
            id: id.clone(),
            created_at: at,
            size_bytes: None,
            base: None,
            kind: pool.kind,
        });
        fake.sizes.insert(id.clone(), size);
        id
    }

    pub fn units(&self, pool_id: &str) -> Vec<BackupUnit> {
        let pools = self.pools.lock().unwrap();
        let mut units = pools[pool_id].units.clone();
        sort_newest_first(&mut units);
        units
    }

    pub fn unit_ids(&self, pool_id: &str) -> Vec<String> {
        self.units(pool_id).into_iter().map(|u| u.id).collect()
    }

    pub fn available(&self, pool_id: &str) -> u64 {
        self.pools.lock().unwrap()[pool_id].available
    }

    pub fn set_unavailable(&self, pool_id: &str) {
        self.pools.lock().unwrap().get_mut(pool_id).unwrap().unavailable = true;
    }

    pub fn fail_listing(&self, pool_id: &str) {
        self.pools.lock().unwrap().get_mut(pool_id).unwrap().list_fails = true;
    }

    pub fn fail_record_base(&self, pool_id: &str) {
        self.pools.lock().unwrap().get_mut(pool_id).unwrap().record_base_fails = true;
    }

    pub fn sized_units(&self) -> Vec<String> {
        self.sized.lock().unwrap().clone()
    }

    pub fn fail_delete(&self, pool_id: &str, unit_id: &str) {
        self.pools
            .lock()
            .unwrap()
            .get_mut(pool_id)
            .unwrap()
            .failing_deletes
            .insert(unit_id.to_string());
    }

    /// Register whatever a collaborator wrote at `dest`.
    fn insert_written(&self, dest: &Path, size: u64) {
        let mut pools = self.pools.lock().unwrap();
        let fake = pools
            .values_mut()
            .find(|p| Some(p.root.as_path()) == dest.parent())
            .expect("destination inside a registered pool");
        let name = dest.file_name().unwrap().to_str().unwrap().to_string();
        let created_at = parse_unit_name(fake.kind, &name).expect("well-formed unit name");
        fake.sizes.insert(name.clone(), size);
        fake.units.push(BackupUnit {
            pool_id: fake.id.clone(),
            id: name,
            created_at,
            size_bytes: None,
            base: None,
            kind: fake.kind,
        });
        fake.available = fake.available.saturating_sub(size);
    }
}

fn io_error(pool: &StoragePool, kind: std::io::ErrorKind, msg: &str) -> StoreError {
    StoreError::Io {
        path: pool.root.clone(),
        source: std::io::Error::new(kind, msg.to_string()),
    }
}

#[async_trait]
impl SpaceAccountant for FakeStorage {
    async fn measure(&self, pool: &StoragePool) -> Result<SpaceUsage, StoreError> {
        let pools = self.pools.lock().unwrap();
        let fake = &pools[&pool.id];
        if fake.unavailable {
            return Err(StoreError::PoolUnavailable {
                pool: pool.id.clone(),
                reason: "not mounted".into(),
            });
        }
        Ok(SpaceUsage {
            total_bytes: fake.total,
            used_bytes: fake.total - fake.available,
            available_bytes: fake.available,
        })
    }
}

#[async_trait]
impl UnitStore for FakeStorage {
    async fn list(&self, pool: &StoragePool) -> Result<Vec<BackupUnit>, StoreError> {
        if self.pools.lock().unwrap()[&pool.id].list_fails {
            return Err(io_error(pool, std::io::ErrorKind::PermissionDenied, "listing denied"));
        }
        Ok(self.units(&pool.id))
    }

    async fn remove(&self, pool: &StoragePool, unit_id: &str) -> Result<(), StoreError> {
        let mut pools = self.pools.lock().unwrap();
        let fake = pools.get_mut(&pool.id).unwrap();
        if fake.failing_deletes.contains(unit_id) {
            return Err(io_error(pool, std::io::ErrorKind::PermissionDenied, "unit busy"));
        }
        if let Some(pos) = fake.units.iter().position(|u| u.id == unit_id) {
            fake.units.remove(pos);
            fake.available += fake.sizes.remove(unit_id).unwrap_or(0);
        }
        Ok(())
    }

    async fn record_base(
        &self,
        pool: &StoragePool,
        unit_id: &str,
        base: &str,
    ) -> Result<(), StoreError> {
        let mut pools = self.pools.lock().unwrap();
        let fake = pools.get_mut(&pool.id).unwrap();
        if fake.record_base_fails {
            return Err(io_error(pool, std::io::ErrorKind::TimedOut, "sidecar write stalled"));
        }
        match fake.units.iter_mut().find(|u| u.id == unit_id) {
            Some(unit) => {
                unit.base = Some(base.to_string());
                Ok(())
            }
            None => Err(io_error(pool, std::io::ErrorKind::NotFound, "no such unit")),
        }
    }

    async fn unit_size(&self, pool: &StoragePool, unit_id: &str) -> Result<u64, StoreError> {
        self.sized.lock().unwrap().push(unit_id.to_string());
        let pools = self.pools.lock().unwrap();
        pools[&pool.id]
            .sizes
            .get(unit_id)
            .copied()
            .ok_or_else(|| io_error(pool, std::io::ErrorKind::NotFound, "no such unit"))
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Writes a unit of `size` bytes per copy. When failing, it leaves a
/// partial unit behind, like an interrupted rsync would.
pub struct FakeCopier {
    storage: Arc<FakeStorage>,
    pub requests: Mutex<Vec<CopyRequest>>,
    pub fail: AtomicBool,
    size: u64,
}

#[async_trait]
impl DeltaCopier for FakeCopier {
    async fn copy(&self, request: &CopyRequest) -> Result<CopyResult, CollaboratorError> {
        self.requests.lock().unwrap().push(request.clone());
        self.storage.insert_written(&request.dest, self.size);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Failed {
                program: "rsync".into(),
                exit_code: 23,
                stderr: "partial transfer".into(),
            });
        }
        Ok(CopyResult {
            bytes_transferred: Some(self.size),
            duration_ms: 5,
        })
    }
}

pub struct FakeArchiver {
    storage: Arc<FakeStorage>,
    pub requests: Mutex<Vec<ArchiveRequest>>,
    pub fail: AtomicBool,
    size: u64,
}

#[async_trait]
impl Archiver for FakeArchiver {
    async fn create(&self, request: &ArchiveRequest) -> Result<ArchiveResult, CollaboratorError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Verification {
                path: request.dest.clone(),
                reason: "archive is empty".into(),
            });
        }
        self.storage.insert_written(&request.dest, self.size);
        Ok(ArchiveResult {
            size_bytes: self.size,
            entries: 12,
        })
    }
}

/// Every repository reports the same status.
pub struct StaticProbe(pub bool);

#[async_trait]
impl RepoProbe for StaticProbe {
    async fn has_pending(&self, _repo: &Path) -> Result<bool, CollaboratorError> {
        Ok(self.0)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub storage: Arc<FakeStorage>,
    pub copier: Arc<FakeCopier>,
    pub archiver: Arc<FakeArchiver>,
    pub clock: Arc<FixedClock>,
    pub services: Services,
    _state_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let storage = Arc::new(FakeStorage::default());
        let copier = Arc::new(FakeCopier {
            storage: Arc::clone(&storage),
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            size: GB,
        });
        let archiver = Arc::new(FakeArchiver {
            storage: Arc::clone(&storage),
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            size: GB,
        });
        let clock = Arc::new(FixedClock::new(now()));
        let state_dir = tempfile::tempdir().expect("state dir");
        let state = StateDir::open(state_dir.path()).expect("open state dir");

        let services = Services {
            space: storage.clone(),
            units: storage.clone(),
            copier: copier.clone(),
            archiver: archiver.clone(),
            probe: Arc::new(StaticProbe(false)),
            state,
            clock: clock.clone(),
        };

        Self {
            storage,
            copier,
            archiver,
            clock,
            services,
            _state_dir: state_dir,
        }
    }
}
