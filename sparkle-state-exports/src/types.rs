// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Core value types shared by stores, the merge engine and checkpoint artifacts.

use crate::StateError;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use std::collections::BTreeMap;
use std::fmt;

/// Store key. Composite keys are built by callers (`"pair:0xabc"`).
pub type Key = String;

/// Store value. Opaque bytes, the engine assigns no meaning to them.
pub type Value = Vec<u8>;

/// Live table of a store
pub type Table = BTreeMap<Key, Value>;

/// Kind of mutation recorded by a `StateDelta`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum DeltaOp {
    /// the key did not exist before
    #[serde(rename = "c")]
    #[strum(serialize = "CREATE")]
    Create,
    /// the key existed and got a new value
    #[serde(rename = "u")]
    #[strum(serialize = "UPDATE")]
    Update,
    /// the key existed and got removed
    #[serde(rename = "d")]
    #[strum(serialize = "DELETE")]
    Delete,
}

/// One recorded mutation of a store.
///
/// `old_value` is absent for creations, `new_value` is absent for deletions.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDelta {
    /// create / update / delete
    pub op: DeltaOp,
    /// caller supplied position of the triggering event inside its block
    pub ordinal: u64,
    /// mutated key
    pub key: Key,
    /// value before the mutation
    #[serde_as(as = "Option<Base64>")]
    pub old_value: Option<Value>,
    /// value after the mutation
    #[serde_as(as = "Option<Base64>")]
    pub new_value: Option<Value>,
}

impl StateDelta {
    /// Delta for a key that did not exist yet
    pub fn create(ordinal: u64, key: Key, value: Value) -> Self {
        StateDelta {
            op: DeltaOp::Create,
            ordinal,
            key,
            old_value: None,
            new_value: Some(value),
        }
    }

    /// Delta overwriting an existing value
    pub fn update(ordinal: u64, key: Key, old_value: Value, new_value: Value) -> Self {
        StateDelta {
            op: DeltaOp::Update,
            ordinal,
            key,
            old_value: Some(old_value),
            new_value: Some(new_value),
        }
    }

    /// Delta removing an existing value
    pub fn delete(ordinal: u64, key: Key, old_value: Value) -> Self {
        StateDelta {
            op: DeltaOp::Delete,
            ordinal,
            key,
            old_value: Some(old_value),
            new_value: None,
        }
    }

    /// Checks that the values carried by the delta match its op.
    ///
    /// Deltas built through the constructors above always pass. Deltas read back from an artifact
    /// may not, and applying them would silently corrupt the table.
    pub fn check(&self) -> Result<(), StateError> {
        let consistent = match self.op {
            DeltaOp::Create => self.old_value.is_none() && self.new_value.is_some(),
            DeltaOp::Update => self.old_value.is_some() && self.new_value.is_some(),
            DeltaOp::Delete => self.old_value.is_some() && self.new_value.is_none(),
        };
        if consistent {
            Ok(())
        } else {
            Err(StateError::CorruptedDelta(format!(
                "{} delta on key {:?} at ordinal {} carries inconsistent values",
                self.op, self.key, self.ordinal
            )))
        }
    }

    /// Value the key holds once the delta is applied (`None` = absent)
    pub fn after(&self) -> Option<&[u8]> {
        self.new_value.as_deref()
    }

    /// Value the key held before the delta was applied (`None` = absent)
    pub fn before(&self) -> Option<&[u8]> {
        self.old_value.as_deref()
    }
}

/// Half-open range of block numbers `[start, end)` covered by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    /// first block of the range
    pub start: u64,
    /// first block after the range
    pub end: u64,
}

impl BlockRange {
    /// Creates a new range. `end` is exclusive.
    pub fn new(start: u64, end: u64) -> Self {
        BlockRange { start, end }
    }

    /// Empty range anchored at `start`
    pub fn starting_at(start: u64) -> Self {
        BlockRange { start, end: start }
    }

    /// Number of blocks in the range
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// true if no block was processed yet
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// true if `next` starts exactly where `self` ends
    pub fn is_followed_by(&self, next: &BlockRange) -> bool {
        self.end == next.start
    }

    /// true if `block` lies inside the range
    pub fn contains(&self, block: u64) -> bool {
        block >= self.start && block < self.end
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Lifecycle of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum StoreStatus {
    /// created, nothing loaded nor written
    Fresh,
    /// replaying a checkpoint
    Loading,
    /// processing blocks
    Live,
    /// folded into a continuous store, terminal
    Merged,
    /// dropped by its owner, terminal
    Discarded,
}

impl StoreStatus {
    /// true if writes are still accepted
    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            StoreStatus::Fresh | StoreStatus::Loading | StoreStatus::Live
        )
    }
}

/// Full dump of a store table, taken at the start of `block`
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// name of the store
    pub store: String,
    /// the snapshot holds the state before this block was processed
    pub block: u64,
    /// creation time, unix milliseconds
    pub created_at: u64,
    /// store table
    #[serde_as(as = "BTreeMap<_, Base64>")]
    pub entries: Table,
}
