// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This file defines the store: a named key/value table plus the deltas staged on top of it.

use crate::bundler::Bundler;
use crate::delta_log::DeltaLog;
use sparkle_state_exports::{
    BlockRange, DeltaOp, Key, MergeStrategy, Snapshot, StateDelta, StateError, StateReader,
    StoreConfig, StoreStatus, Table, Value,
};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Block-range scoped key/value store with point-in-time reads.
///
/// Writes are staged in the delta log and only reach the committed table when the unit of work is
/// flushed, so a failed block can be rolled back without touching the table. Every read observes
/// the staged writes.
///
/// A store has a single writer: it is owned by the worker driving its block range and is never
/// shared between threads while live.
#[derive(Debug, Clone)]
pub struct Store {
    name: String,
    strategy: MergeStrategy,
    /// committed table, state at the start of the current unit of work
    table: Table,
    /// deltas of the current unit of work
    log: DeltaLog,
    /// blocks committed into the table
    range: BlockRange,
    /// ordinal of the latest committed write
    last_ordinal: u64,
    status: StoreStatus,
    bundler: Bundler,
}

impl Store {
    /// Creates an empty store whose first block is `start_block`
    pub fn new(name: impl Into<String>, strategy: MergeStrategy, start_block: u64) -> Self {
        Store {
            name: name.into(),
            strategy,
            table: Table::new(),
            log: DeltaLog::new(),
            range: BlockRange::starting_at(start_block),
            last_ordinal: 0,
            status: StoreStatus::Fresh,
            bundler: Bundler::new(),
        }
    }

    pub fn from_config(config: &StoreConfig, start_block: u64) -> Self {
        Store::new(config.name.clone(), config.merge_strategy, start_block)
    }

    /// Store seeded with the table of a snapshot, ready to replay the blocks that follow it
    pub(crate) fn from_snapshot(snapshot: Snapshot, strategy: MergeStrategy) -> Self {
        Store {
            name: snapshot.store,
            strategy,
            table: snapshot.entries,
            log: DeltaLog::new(),
            range: BlockRange::starting_at(snapshot.block),
            last_ordinal: 0,
            status: StoreStatus::Loading,
            bundler: Bundler::resumed_at(snapshot.block),
        }
    }

    /// Result of a merge: live, nothing staged, no open checkpoint window
    pub(crate) fn from_merge(
        name: String,
        strategy: MergeStrategy,
        table: Table,
        range: BlockRange,
        last_ordinal: u64,
    ) -> Self {
        Store {
            name,
            strategy,
            table,
            log: DeltaLog::new(),
            range,
            last_ordinal,
            status: StoreStatus::Live,
            bundler: Bundler::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    pub fn range(&self) -> BlockRange {
        self.range
    }

    pub fn status(&self) -> StoreStatus {
        self.status
    }

    /// Ordinal of the latest accepted write, staged or committed
    pub fn last_ordinal(&self) -> u64 {
        self.log
            .deltas()
            .last()
            .map_or(self.last_ordinal, |delta| delta.ordinal)
    }

    /// Committed table, without the staged writes
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Deltas staged by the current unit of work, in emission order
    pub fn staged(&self) -> &[StateDelta] {
        self.log.deltas()
    }

    pub fn bundler(&self) -> &Bundler {
        &self.bundler
    }

    pub(crate) fn bundler_mut(&mut self) -> &mut Bundler {
        &mut self.bundler
    }

    fn ensure_writable(&self) -> Result<(), StateError> {
        if self.status.is_writable() {
            Ok(())
        } else {
            Err(StateError::StoreClosed(self.name.clone(), self.status))
        }
    }

    fn stage(&mut self, delta: StateDelta) -> Result<(), StateError> {
        self.log.push(delta)?;
        if self.status == StoreStatus::Fresh {
            self.status = StoreStatus::Live;
        }
        Ok(())
    }

    /// Stages a write of `value` on `key`.
    ///
    /// Emits an update if the key currently holds a value, even an identical one, and a creation
    /// otherwise.
    pub fn set(
        &mut self,
        ordinal: u64,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<(), StateError> {
        self.ensure_writable()?;
        let key = key.into();
        let value = value.into();
        let delta = match self.get_last(&key) {
            Some(old) => StateDelta::update(ordinal, key, old.to_vec(), value),
            None => StateDelta::create(ordinal, key, value),
        };
        self.stage(delta)
    }

    /// Stages the deletion of `key`. No-op if the key is absent.
    pub fn del(&mut self, ordinal: u64, key: &str) -> Result<(), StateError> {
        self.ensure_writable()?;
        let Some(old) = self.get_last(key) else {
            return Ok(());
        };
        let delta = StateDelta::delete(ordinal, key.to_string(), old.to_vec());
        self.stage(delta)
    }

    /// Applies the staged deltas to the table in one step and returns them.
    ///
    /// Flushing an empty log does nothing.
    pub fn flush(&mut self) -> Vec<StateDelta> {
        let deltas = self.log.take();
        for delta in &deltas {
            apply(&mut self.table, delta);
        }
        if let Some(delta) = deltas.last() {
            self.last_ordinal = delta.ordinal;
        }
        deltas
    }

    /// Drops the staged deltas, leaving the table as it was at the start of the unit of work
    pub fn rollback(&mut self) -> Vec<StateDelta> {
        let dropped = self.log.take();
        if !dropped.is_empty() {
            debug!(
                "store {}: rolled back {} staged deltas",
                self.name,
                dropped.len()
            );
        }
        dropped
    }

    pub(crate) fn check_block(&self, block: u64) -> Result<(), StateError> {
        self.ensure_writable()?;
        if block < self.range.end {
            return Err(StateError::BlockOrder {
                store: self.name.clone(),
                block,
                expected: self.range.end,
            });
        }
        Ok(())
    }

    /// Flushes the staged deltas as the changes of `block` and returns them.
    ///
    /// Blocks must be committed in increasing order.
    pub fn commit_block(&mut self, block: u64) -> Result<Vec<StateDelta>, StateError> {
        self.check_block(block)?;
        let deltas = self.flush();
        self.range.end = block + 1;
        if self.status == StoreStatus::Fresh {
            self.status = StoreStatus::Live;
        }
        debug!(
            "store {}: committed block {} with {} deltas",
            self.name,
            block,
            deltas.len()
        );
        Ok(deltas)
    }

    /// Replays the deltas persisted for `block`, checking each against the current state.
    ///
    /// On failure nothing is committed and the store is left as before the call.
    pub fn replay_block(&mut self, block: u64, deltas: Vec<StateDelta>) -> Result<(), StateError> {
        self.check_block(block)?;
        for delta in deltas {
            let consistent = match delta.op {
                DeltaOp::Create => self.get_last(&delta.key).is_none(),
                DeltaOp::Update | DeltaOp::Delete => {
                    delta.before().is_some() && self.get_last(&delta.key) == delta.before()
                }
            };
            if !consistent {
                self.rollback();
                return Err(StateError::CorruptedDelta(format!(
                    "{} delta on key {} in block {} of store {} does not match the store state",
                    delta.op, delta.key, block, self.name
                )));
            }
            if let Err(err) = self.stage(delta) {
                self.rollback();
                return Err(err);
            }
        }
        self.commit_block(block)?;
        Ok(())
    }

    /// Ends a checkpoint load: every block before `start_block` is accounted for
    pub(crate) fn finish_loading(&mut self, start_block: u64) {
        self.range.end = self.range.end.max(start_block);
        self.status = StoreStatus::Live;
    }

    /// Full dump of the committed table, labelled as the state at the start of `block`
    pub fn snapshot(&self, block: u64) -> Snapshot {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Snapshot {
            store: self.name.clone(),
            block,
            created_at,
            entries: self.table.clone(),
        }
    }

    /// Logs the staged deltas
    pub fn print_deltas(&self) {
        if self.log.is_empty() {
            return;
        }
        info!("store {}: {} staged deltas", self.name, self.log.len());
        for delta in self.log.deltas() {
            info!(
                "  {} ordinal={} key={} old={:?} new={:?}",
                delta.op,
                delta.ordinal,
                delta.key,
                delta.before().map(String::from_utf8_lossy),
                delta.after().map(String::from_utf8_lossy),
            );
        }
    }

    /// Marks the store as folded into a continuous store. Terminal.
    pub fn mark_merged(&mut self) {
        self.status = StoreStatus::Merged;
    }

    /// Drops the staged deltas and closes the store. Terminal.
    pub fn discard(&mut self) {
        self.log.take();
        self.status = StoreStatus::Discarded;
    }
}

impl StateReader for Store {
    /// The committed table holds the state at the start of the unit of work
    fn get_first(&self, key: &str) -> Option<&[u8]> {
        self.table.get(key).map(Vec::as_slice)
    }

    fn get_last(&self, key: &str) -> Option<&[u8]> {
        match self.log.last_for(key) {
            Some(delta) => delta.after(),
            None => self.table.get(key).map(Vec::as_slice),
        }
    }

    /// Undoes, newest first, the staged deltas on `key` whose ordinal is above `ordinal`
    fn get_at(&self, ordinal: u64, key: &str) -> Option<&[u8]> {
        let mut value = self.get_last(key);
        for delta in self.log.for_key(key).rev() {
            if delta.ordinal <= ordinal {
                break;
            }
            value = delta.before();
        }
        value
    }
}

/// Applies a checked delta to a table
fn apply(table: &mut Table, delta: &StateDelta) {
    match (delta.op, &delta.new_value) {
        (DeltaOp::Delete, _) => {
            table.remove(&delta.key);
        }
        (DeltaOp::Create | DeltaOp::Update, Some(value)) => {
            table.insert(delta.key.clone(), value.clone());
        }
        // rejected when the delta was staged
        (DeltaOp::Create | DeltaOp::Update, None) => {}
    }
}
