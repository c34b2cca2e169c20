//! Last outcome per pool, read back by `tierkeep report`.

use tierkeep_core::report::PoolOutcome;

use super::StateDir;
use crate::error::StoreError;

impl StateDir {
    pub async fn write_report(&self, outcome: &PoolOutcome) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(outcome)?;
        self.write_atomic(self.report_path(outcome.pool_id()), bytes).await
    }

    /// `None` when the pool has never been processed.
    pub async fn read_report(&self, pool_id: &str) -> Result<Option<PoolOutcome>, StoreError> {
        match self.read_optional(self.report_path(pool_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use tierkeep_core::report::SkipReason;

    use super::*;

    #[tokio::test]
    async fn report_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = StateDir::open(dir.path()).expect("open");
        let outcome = PoolOutcome::Skipped {
            pool_id: "usb".into(),
            reason: SkipReason::PoolUnavailable,
            detail: "not mounted".into(),
        };

        state.write_report(&outcome).await.expect("write");
        assert_eq!(state.read_report("usb").await.expect("read"), Some(outcome));
        assert_eq!(state.read_report("other").await.expect("read"), None);
    }
}
