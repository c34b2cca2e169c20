//! `tierkeep-core` -- pure retention domain logic.
//!
//! Nothing in this crate touches the filesystem or spawns processes. The
//! store crate supplies measurements and catalog listings, the engine crate
//! feeds them through the decisions defined here.

pub mod archive;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod error;
pub mod phase;
pub mod policy;
pub mod pool;
pub mod report;
pub mod size;
pub mod snapshot;
pub mod tier;
pub mod types;
pub mod unit;
