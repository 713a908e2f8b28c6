// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Periodic persistence of stores and resumption at an arbitrary block.

use crate::disk_io::DiskCheckpointIO;
use crate::store::Store;
use sparkle_logging::sparkle_trace;
use sparkle_state_exports::{CheckpointConfig, CheckpointIO, MergeStrategy, StateDelta, StateError};
use std::sync::Arc;
use tracing::{debug, info};

/// Writes snapshots and per-block delta artifacts of stores, and rebuilds stores from them.
///
/// A snapshot taken at block `B` holds the state at the start of `B`. Every committed block gets a
/// delta artifact, even an empty one.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    config: CheckpointConfig,
    io: Arc<dyn CheckpointIO>,
}

impl Checkpointer {
    pub fn new(config: CheckpointConfig, io: Arc<dyn CheckpointIO>) -> Self {
        Checkpointer { config, io }
    }

    /// Checkpointer writing into `config.data_folder`
    pub fn on_disk(config: CheckpointConfig) -> Result<Self, StateError> {
        let io = DiskCheckpointIO::new(config.data_folder.clone())?;
        Ok(Checkpointer::new(config, Arc::new(io)))
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Persists and commits the deltas staged by `store` for `block`.
    ///
    /// A full snapshot precedes the delta artifact on interval boundaries and when the store has no
    /// open checkpoint window. If an artifact cannot be written, the store keeps its staged deltas
    /// and the call may be retried.
    pub fn commit_block(&self, store: &mut Store, block: u64) -> Result<Vec<StateDelta>, StateError> {
        store.check_block(block)?;
        if store.bundler().needs_snapshot(block, self.config.interval) {
            self.snapshot_at(store, block)?;
        }
        self.io.write_deltas(store.name(), block, store.staged())?;
        let deltas = store.commit_block(block)?;
        store.bundler_mut().record(block);
        Ok(deltas)
    }

    /// Writes a full snapshot of the committed table at the end of the store range
    pub fn write_snapshot(&self, store: &mut Store) -> Result<(), StateError> {
        let block = store.range().end;
        self.snapshot_at(store, block)
    }

    fn snapshot_at(&self, store: &mut Store, block: u64) -> Result<(), StateError> {
        let snapshot = store.snapshot(block);
        self.io.write_snapshot(&snapshot)?;
        store.bundler_mut().open_window(block);
        debug!(
            "store {}: snapshot of {} keys written at block {}",
            store.name(),
            snapshot.entries.len(),
            block
        );
        sparkle_trace!("sparkle_state.checkpoint.snapshot", {
            "store": store.name(),
            "block": block,
            "keys": snapshot.entries.len()
        });
        self.prune(store.name())
    }

    /// Keeps the newest snapshots and the delta artifacts that follow the oldest kept one
    fn prune(&self, name: &str) -> Result<(), StateError> {
        let snapshots = self.io.list_snapshots(name)?;
        let max = self.config.max_snapshots.max(1);
        if snapshots.len() <= max {
            return Ok(());
        }
        let (expired, kept) = snapshots.split_at(snapshots.len() - max);
        for block in expired {
            self.io.delete_snapshot(name, *block)?;
        }
        if let Some(oldest) = kept.first() {
            self.io.delete_deltas_before(name, *oldest)?;
        }
        debug!("store {}: pruned {} snapshots", name, expired.len());
        Ok(())
    }

    /// Block of the latest snapshot of store `name` at or before `block`
    pub fn latest_snapshot(&self, name: &str, block: u64) -> Result<Option<u64>, StateError> {
        Ok(self
            .io
            .list_snapshots(name)?
            .into_iter()
            .rev()
            .find(|snapshot| *snapshot <= block))
    }

    /// Rebuilds store `name` as it was at the start of `start_block`.
    ///
    /// Loads the latest snapshot at or before `start_block`, then replays the delta artifacts of
    /// the blocks between the snapshot and `start_block`. Without any snapshot the store starts
    /// empty at `start_block`. Fails with `MissingArtifact` if snapshots exist but all of them
    /// follow `start_block`, or if a block of the replayed span has no delta artifact.
    pub fn load(
        &self,
        name: &str,
        strategy: MergeStrategy,
        start_block: u64,
    ) -> Result<Store, StateError> {
        let snapshots = self.io.list_snapshots(name)?;
        let snapshot_block = snapshots
            .iter()
            .rev()
            .find(|block| **block <= start_block)
            .copied();
        let snapshot_block = match (snapshot_block, snapshots.first()) {
            (Some(block), _) => block,
            (None, Some(oldest)) => {
                return Err(StateError::MissingArtifact(format!(
                    "no snapshot of store {} at or before block {}, the oldest kept is at block {}",
                    name, start_block, oldest
                )));
            }
            (None, None) => {
                info!(
                    "store {}: no checkpoint before block {}, starting empty",
                    name, start_block
                );
                return Ok(Store::new(name, strategy, start_block));
            }
        };
        let snapshot = self.io.read_snapshot(name, snapshot_block)?.ok_or_else(|| {
            StateError::IOError(format!(
                "snapshot of store {} at block {} is listed but missing",
                name, snapshot_block
            ))
        })?;

        let mut store = Store::from_snapshot(snapshot, strategy);
        for block in snapshot_block..start_block {
            let deltas = self.io.read_deltas(name, block)?.ok_or_else(|| {
                StateError::MissingArtifact(format!(
                    "no delta artifact of store {} for block {} after the snapshot of block {}",
                    name, block, snapshot_block
                ))
            })?;
            store.replay_block(block, deltas)?;
        }
        store.finish_loading(start_block);
        info!(
            "store {}: loaded snapshot of block {} and replayed {} blocks up to block {}",
            name,
            snapshot_block,
            start_block - snapshot_block,
            start_block
        );
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_io::NoopCheckpointIO;
    use assert_matches::assert_matches;
    use sparkle_state_exports::{MockCheckpointIO, StateReader, StoreStatus};
    use tempfile::TempDir;

    fn config(dir: &TempDir, interval: u64, max_snapshots: usize) -> CheckpointConfig {
        CheckpointConfig {
            data_folder: dir.path().to_path_buf(),
            interval,
            max_snapshots,
        }
    }

    /// Deterministic writes for `block`: counters, overwrites and deletions
    fn write_block(store: &mut Store, block: u64) {
        store
            .set(0, format!("block:{}", block % 7), block.to_string())
            .unwrap();
        store.set(1, "last", block.to_string()).unwrap();
        if block % 3 == 0 {
            store.del(2, &format!("block:{}", (block + 1) % 7)).unwrap();
        }
    }

    #[test]
    fn load_matches_replay_from_genesis() {
        let dir = TempDir::new().unwrap();
        let checkpointer = Checkpointer::on_disk(config(&dir, 10, 100)).unwrap();

        let mut store = Store::new("pairs", MergeStrategy::LastKey, 0);
        let mut history = Vec::new();
        for block in 0..45 {
            write_block(&mut store, block);
            checkpointer.commit_block(&mut store, block).unwrap();
            history.push(store.table().clone());
        }
        let io = DiskCheckpointIO::new(dir.path()).unwrap();
        assert_eq!(io.list_snapshots("pairs").unwrap(), vec![0, 10, 20, 30, 40]);

        for start in [0, 1, 10, 23, 40, 44, 45] {
            let loaded = checkpointer
                .load("pairs", MergeStrategy::LastKey, start)
                .unwrap();
            let mut genesis = Store::new("pairs", MergeStrategy::LastKey, 0);
            for block in 0..start {
                write_block(&mut genesis, block);
                genesis.commit_block(block).unwrap();
            }
            assert_eq!(loaded.table(), genesis.table(), "start block {}", start);
            if start > 0 {
                assert_eq!(loaded.table(), &history[start as usize - 1]);
            }
            assert_eq!(loaded.range().end, start);
            assert_eq!(loaded.status(), StoreStatus::Live);
        }
    }

    #[test]
    fn resumed_store_follows_original() {
        let dir = TempDir::new().unwrap();
        let checkpointer = Checkpointer::on_disk(config(&dir, 10, 100)).unwrap();
        let mut store = Store::new("pairs", MergeStrategy::LastKey, 0);
        for block in 0..15 {
            write_block(&mut store, block);
            checkpointer.commit_block(&mut store, block).unwrap();
        }

        let mut resumed = checkpointer
            .load("pairs", MergeStrategy::LastKey, 15)
            .unwrap();
        assert_eq!(resumed.bundler().window_start(), Some(10));

        let shadow = Checkpointer::new(config(&dir, 10, 100), Arc::new(NoopCheckpointIO));
        for block in 15..25 {
            write_block(&mut store, block);
            checkpointer.commit_block(&mut store, block).unwrap();
            write_block(&mut resumed, block);
            shadow.commit_block(&mut resumed, block).unwrap();
        }
        assert_eq!(resumed.table(), store.table());
        assert_eq!(resumed.range().end, store.range().end);
        assert_eq!(resumed.bundler().window_start(), Some(20));
    }

    #[test]
    fn fresh_store_snapshots_on_first_block() {
        let dir = TempDir::new().unwrap();
        let checkpointer = Checkpointer::on_disk(config(&dir, 100, 10)).unwrap();
        let mut store = Store::new("volumes", MergeStrategy::SumFloat, 250);
        store.set(1, "v", "1.5").unwrap();
        checkpointer.commit_block(&mut store, 250).unwrap();
        checkpointer.commit_block(&mut store, 251).unwrap();

        let io = DiskCheckpointIO::new(dir.path()).unwrap();
        assert_eq!(io.list_snapshots("volumes").unwrap(), vec![250]);
        assert_eq!(io.read_snapshot("volumes", 250).unwrap().unwrap().entries.len(), 0);

        let loaded = checkpointer
            .load("volumes", MergeStrategy::SumFloat, 270)
            .unwrap();
        assert_eq!(loaded.get_last("v"), Some(&b"1.5"[..]));
        assert_eq!(loaded.range().end, 270);

        let empty = checkpointer.load("prices", MergeStrategy::LastKey, 42).unwrap();
        assert!(empty.table().is_empty());
        assert_eq!(empty.range().start, 42);
        assert_eq!(empty.status(), StoreStatus::Fresh);
    }

    #[test]
    fn retention_prunes_old_artifacts() {
        let dir = TempDir::new().unwrap();
        let checkpointer = Checkpointer::on_disk(config(&dir, 10, 2)).unwrap();
        let mut store = Store::new("pairs", MergeStrategy::LastKey, 0);
        for block in 0..35 {
            write_block(&mut store, block);
            checkpointer.commit_block(&mut store, block).unwrap();
        }
        let io = DiskCheckpointIO::new(dir.path()).unwrap();
        assert_eq!(io.list_snapshots("pairs").unwrap(), vec![20, 30]);
        assert_eq!(io.read_deltas("pairs", 19).unwrap(), None);
        assert!(io.read_deltas("pairs", 20).unwrap().is_some());
    }

    #[test]
    fn load_before_oldest_kept_snapshot_fails() {
        let dir = TempDir::new().unwrap();
        let checkpointer = Checkpointer::on_disk(config(&dir, 10, 2)).unwrap();
        let mut store = Store::new("pairs", MergeStrategy::LastKey, 0);
        for block in 0..35 {
            store.set(1, format!("key:{}", block), block.to_string()).unwrap();
            checkpointer.commit_block(&mut store, block).unwrap();
        }

        let err = checkpointer
            .load("pairs", MergeStrategy::LastKey, 15)
            .unwrap_err();
        assert_matches!(err, StateError::MissingArtifact(_));
        assert!(!err.is_fatal());

        let loaded = checkpointer
            .load("pairs", MergeStrategy::LastKey, 25)
            .unwrap();
        assert_eq!(loaded.table().len(), 25);
    }

    #[test]
    fn load_fails_on_missing_delta_artifact() {
        let dir = TempDir::new().unwrap();
        let checkpointer = Checkpointer::on_disk(config(&dir, 10, 100)).unwrap();
        let mut store = Store::new("pairs", MergeStrategy::LastKey, 0);
        for block in 0..20 {
            write_block(&mut store, block);
            checkpointer.commit_block(&mut store, block).unwrap();
        }

        let mut io = MockCheckpointIO::new();
        let disk = DiskCheckpointIO::new(dir.path()).unwrap();
        let snapshot = disk.read_snapshot("pairs", 10).unwrap();
        io.expect_list_snapshots().returning(|_| Ok(vec![0, 10]));
        io.expect_read_snapshot()
            .returning(move |_, _| Ok(snapshot.clone()));
        io.expect_read_deltas().returning(move |name, block| {
            if block == 13 {
                Ok(None)
            } else {
                disk.read_deltas(name, block)
            }
        });
        let gapped = Checkpointer::new(config(&dir, 10, 100), Arc::new(io));

        assert!(gapped.load("pairs", MergeStrategy::LastKey, 13).is_ok());
        let err = gapped
            .load("pairs", MergeStrategy::LastKey, 17)
            .unwrap_err();
        assert_matches!(err, StateError::MissingArtifact(_));
        assert!(!err.is_fatal());
    }

    #[test]
    fn merged_store_snapshot() {
        let dir = TempDir::new().unwrap();
        let checkpointer = Checkpointer::on_disk(config(&dir, 100, 10)).unwrap();
        let mut base = Store::new("totals", MergeStrategy::SumInt, 0);
        base.set(1, "x", "5").unwrap();
        base.commit_block(99).unwrap();
        let mut next = Store::new("totals", MergeStrategy::SumInt, 100);
        next.set(1, "x", "3").unwrap();
        next.commit_block(199).unwrap();

        let mut merged = crate::merge::merge(&base, &next).unwrap();
        checkpointer.write_snapshot(&mut merged).unwrap();
        assert_eq!(merged.bundler().window_start(), Some(200));

        let loaded = checkpointer.load("totals", MergeStrategy::SumInt, 200).unwrap();
        assert_eq!(loaded.get_last("x"), Some(&b"8"[..]));
    }

    #[test]
    fn io_errors_are_recoverable() {
        let mut io = MockCheckpointIO::new();
        io.expect_write_snapshot().returning(|_| Ok(()));
        io.expect_list_snapshots().returning(|_| Ok(vec![0]));
        let mut calls = 0;
        io.expect_write_deltas().returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Err(StateError::IOError("disk full".to_string()))
            } else {
                Ok(())
            }
        });

        let checkpointer = Checkpointer::new(CheckpointConfig::new("unused".into()), Arc::new(io));
        let mut store = Store::new("pairs", MergeStrategy::LastKey, 0);
        store.set(1, "k", "v").unwrap();

        let err = checkpointer.commit_block(&mut store, 0).unwrap_err();
        assert_matches!(err, StateError::IOError(_));
        assert!(!err.is_fatal());
        assert_eq!(store.staged().len(), 1);
        assert!(store.table().is_empty());

        // retry
        let deltas = checkpointer.commit_block(&mut store, 0).unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(store.get_first("k"), Some(&b"v"[..]));
    }

    #[test]
    fn closed_store_writes_nothing() {
        let checkpointer = Checkpointer::new(
            CheckpointConfig::new("unused".into()),
            Arc::new(NoopCheckpointIO),
        );
        let mut store = Store::new("pairs", MergeStrategy::LastKey, 0);
        store.mark_merged();
        assert_matches!(
            checkpointer.commit_block(&mut store, 0),
            Err(StateError::StoreClosed(..))
        );
    }
}
