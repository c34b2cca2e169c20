//! `tierkeep-store` -- everything that touches durable storage or spawns
//! an external tool.
//!
//! The engine only sees the traits defined here ([`SpaceAccountant`],
//! [`UnitStore`], [`DeltaCopier`], [`Archiver`], [`RepoProbe`]), so tests can
//! swap in in-memory fakes. Every blocking call runs under a bounded timeout.

pub mod catalog;
pub mod collaborators;
pub mod error;
pub mod space;
pub mod state;

mod blocking;

pub use catalog::{FsUnitStore, UnitStore};
pub use collaborators::git::{count_pending, GitProbe, RepoProbe};
pub use collaborators::CollaboratorError;
pub use collaborators::rsync::{CopyRequest, CopyResult, DeltaCopier, RsyncCopier};
pub use collaborators::tar::{ArchiveRequest, ArchiveResult, Archiver, TarArchiver};
pub use error::StoreError;
pub use space::{SpaceAccountant, StatvfsAccountant};
pub use state::{EventAction, EventLog, EventRecord, PoolLock, StateDir, DEFAULT_STATE_TIMEOUT};
