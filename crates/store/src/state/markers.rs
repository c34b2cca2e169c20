//! Last-archived period per pool.
//!
//! The marker lets an archive pool stay "satisfied" for a period even after
//! its unit has been cleaned up, so a purge never triggers a re-archive.

use tierkeep_core::archive::PeriodKey;

use super::StateDir;
use crate::error::StoreError;

impl StateDir {
    pub async fn read_marker(&self, pool_id: &str) -> Result<Option<PeriodKey>, StoreError> {
        let Some(bytes) = self.read_optional(self.marker_path(pool_id)).await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        let key = text.trim();
        Ok((!key.is_empty()).then(|| PeriodKey(key.to_string())))
    }

    pub async fn write_marker(&self, pool_id: &str, key: &PeriodKey) -> Result<(), StoreError> {
        self.write_atomic(self.marker_path(pool_id), format!("{key}\n").into_bytes())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_marker_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = StateDir::open(dir.path()).expect("open");
        assert_eq!(state.read_marker("weekly").await.expect("read"), None);
    }

    #[tokio::test]
    async fn marker_overwrites_previous_period() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = StateDir::open(dir.path()).expect("open");
        state
            .write_marker("weekly", &PeriodKey("2026-W41".into()))
            .await
            .expect("write");
        state
            .write_marker("weekly", &PeriodKey("2026-W42".into()))
            .await
            .expect("write");
        assert_eq!(
            state.read_marker("weekly").await.expect("read"),
            Some(PeriodKey("2026-W42".into()))
        );
        assert_eq!(state.read_marker("monthly").await.expect("read"), None);
    }
}
