// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::{Snapshot, StateDelta, StateError};
use std::fmt::Debug;

/// Point-in-time reads over a store.
///
/// A `None` result is a lookup miss, not an error.
pub trait StateReader {
    /// Value of `key` before any delta of the current unit of work touched it
    fn get_first(&self, key: &str) -> Option<&[u8]>;

    /// Value of `key` including every write of the current unit of work
    fn get_last(&self, key: &str) -> Option<&[u8]>;

    /// Value of `key` right after every write with an ordinal lower or equal to `ordinal`
    fn get_at(&self, ordinal: u64, key: &str) -> Option<&[u8]>;
}

/// Durable storage of snapshot and delta artifacts, named by `(block, store)`
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait CheckpointIO: Send + Sync + Debug {
    /// Persists a full dump of a store table
    fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StateError>;

    /// Reads back the snapshot of `store` taken at `block`, `None` if there is none
    fn read_snapshot(&self, store: &str, block: u64) -> Result<Option<Snapshot>, StateError>;

    /// Blocks at which a snapshot of `store` exists, ascending
    fn list_snapshots(&self, store: &str) -> Result<Vec<u64>, StateError>;

    /// Removes the snapshot of `store` taken at `block`
    fn delete_snapshot(&self, store: &str, block: u64) -> Result<(), StateError>;

    /// Persists the deltas committed by `store` for `block`, in emission order
    fn write_deltas(&self, store: &str, block: u64, deltas: &[StateDelta])
        -> Result<(), StateError>;

    /// Reads back the deltas of `store` for `block`, `None` if there is no artifact
    fn read_deltas(&self, store: &str, block: u64) -> Result<Option<Vec<StateDelta>>, StateError>;

    /// Removes every delta artifact of `store` strictly before `block`
    fn delete_deltas_before(&self, store: &str, block: u64) -> Result<(), StateError>;
}
