//! The collaborators a run works through, bundled so tests can swap any of
//! them for an in-memory fake.

use std::sync::Arc;
use std::time::Duration;

use tierkeep_core::clock::{Clock, SystemClock};
use tierkeep_store::catalog::DEFAULT_UNIT_TIMEOUT;
use tierkeep_store::collaborators::git::DEFAULT_PROBE_TIMEOUT;
use tierkeep_store::collaborators::rsync::DEFAULT_COPY_TIMEOUT;
use tierkeep_store::collaborators::tar::DEFAULT_ARCHIVE_TIMEOUT;
use tierkeep_store::space::DEFAULT_MEASURE_TIMEOUT;
use tierkeep_store::{
    Archiver, DeltaCopier, FsUnitStore, GitProbe, RepoProbe, RsyncCopier, SpaceAccountant,
    StateDir, StatvfsAccountant, TarArchiver, UnitStore, DEFAULT_STATE_TIMEOUT,
};

/// Upper bounds on every blocking or external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Measuring a pool.
    pub measure: Duration,
    /// Listing, sizing or deleting units.
    pub io: Duration,
    /// Markers, last reports, the event log and lock files.
    pub state: Duration,
    pub copy: Duration,
    pub archive: Duration,
    pub probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            measure: DEFAULT_MEASURE_TIMEOUT,
            io: DEFAULT_UNIT_TIMEOUT,
            state: DEFAULT_STATE_TIMEOUT,
            copy: DEFAULT_COPY_TIMEOUT,
            archive: DEFAULT_ARCHIVE_TIMEOUT,
            probe: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct Services {
    pub space: Arc<dyn SpaceAccountant>,
    pub units: Arc<dyn UnitStore>,
    pub copier: Arc<dyn DeltaCopier>,
    pub archiver: Arc<dyn Archiver>,
    pub probe: Arc<dyn RepoProbe>,
    pub state: StateDir,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Real filesystem, `rsync`, `tar` and `git`, with the wall clock.
    pub fn system(state: StateDir, timeouts: Timeouts) -> Self {
        let state = state.with_timeout(timeouts.state);
        Self {
            space: Arc::new(StatvfsAccountant::new(timeouts.measure)),
            units: Arc::new(FsUnitStore::new(timeouts.io)),
            copier: Arc::new(RsyncCopier::new("rsync", timeouts.copy)),
            archiver: Arc::new(TarArchiver::new("tar", timeouts.archive)),
            probe: Arc::new(GitProbe::new("git", timeouts.probe)),
            state,
            clock: Arc::new(SystemClock),
        }
    }
}
