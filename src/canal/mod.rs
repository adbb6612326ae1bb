//! Replication progress tracking.
mod master;

pub use master::{CheckpointError, MasterInfo};
