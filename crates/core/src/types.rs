/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Pools are addressed by the short identifier used in config and on disk.
pub type PoolId = String;
