// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Checkpoint artifact storage backends.

use serde_json::Value as JsonValue;
use sparkle_state_exports::{
    CheckpointIO, Snapshot, StateDelta, StateError, DELTA_EXTENSION, SNAPSHOT_EXTENSION,
};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stores artifacts as JSON files of a single folder.
///
/// Snapshots are named `<block>-<store>.kv`, delta artifacts `<block>-<store>.delta`.
/// Files are written to a temporary name first and renamed once complete.
#[derive(Debug, Clone)]
pub struct DiskCheckpointIO {
    folder: PathBuf,
}

impl DiskCheckpointIO {
    /// Opens the artifact folder, creating it if needed
    pub fn new(folder: impl Into<PathBuf>) -> Result<Self, StateError> {
        let folder = folder.into();
        fs::create_dir_all(&folder).map_err(|err| {
            StateError::IOError(format!(
                "could not create checkpoint folder {}: {}",
                folder.display(),
                err
            ))
        })?;
        Ok(DiskCheckpointIO { folder })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn file_name(store: &str, block: u64, extension: &str) -> String {
        format!("{}-{}.{}", block, store, extension)
    }

    fn path(&self, store: &str, block: u64, extension: &str) -> PathBuf {
        self.folder.join(Self::file_name(store, block, extension))
    }

    fn write_file(&self, store: &str, block: u64, extension: &str, bytes: &[u8]) -> Result<(), StateError> {
        let name = Self::file_name(store, block, extension);
        let tmp = self.folder.join(format!(".{}.tmp", name));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.folder.join(name))?;
        Ok(())
    }

    fn read_file(&self, store: &str, block: u64, extension: &str) -> Result<Option<Vec<u8>>, StateError> {
        match fs::read(self.path(store, block, extension)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn remove_file(&self, store: &str, block: u64, extension: &str) -> Result<(), StateError> {
        match fs::remove_file(self.path(store, block, extension)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    /// Blocks of the artifacts of `store` with the given extension, ascending
    fn list(&self, store: &str, extension: &str) -> Result<Vec<u64>, StateError> {
        let suffix = format!("-{}.{}", store, extension);
        let mut blocks = Vec::new();
        for entry in fs::read_dir(&self.folder)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(block) = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(&suffix))
                .and_then(|prefix| prefix.parse::<u64>().ok())
            else {
                continue;
            };
            blocks.push(block);
        }
        blocks.sort_unstable();
        Ok(blocks)
    }
}

impl CheckpointIO for DiskCheckpointIO {
    fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StateError> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.write_file(&snapshot.store, snapshot.block, SNAPSHOT_EXTENSION, &bytes)
    }

    fn read_snapshot(&self, store: &str, block: u64) -> Result<Option<Snapshot>, StateError> {
        let Some(bytes) = self.read_file(store, block, SNAPSHOT_EXTENSION)? else {
            return Ok(None);
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.store != store || snapshot.block != block {
            return Err(StateError::SerializationError(format!(
                "snapshot file {} holds store {} at block {}",
                Self::file_name(store, block, SNAPSHOT_EXTENSION),
                snapshot.store,
                snapshot.block
            )));
        }
        Ok(Some(snapshot))
    }

    fn list_snapshots(&self, store: &str) -> Result<Vec<u64>, StateError> {
        self.list(store, SNAPSHOT_EXTENSION)
    }

    fn delete_snapshot(&self, store: &str, block: u64) -> Result<(), StateError> {
        self.remove_file(store, block, SNAPSHOT_EXTENSION)
    }

    fn write_deltas(
        &self,
        store: &str,
        block: u64,
        deltas: &[StateDelta],
    ) -> Result<(), StateError> {
        let bytes = serde_json::to_vec(deltas)?;
        self.write_file(store, block, DELTA_EXTENSION, &bytes)
    }

    fn read_deltas(&self, store: &str, block: u64) -> Result<Option<Vec<StateDelta>>, StateError> {
        let Some(bytes) = self.read_file(store, block, DELTA_EXTENSION)? else {
            return Ok(None);
        };
        let name = Self::file_name(store, block, DELTA_EXTENSION);
        let records: Vec<JsonValue> = serde_json::from_slice(&bytes)?;
        let mut deltas = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            let delta: StateDelta = serde_json::from_value(record).map_err(|err| {
                StateError::CorruptedDelta(format!("record {} of {}: {}", idx, name, err))
            })?;
            delta.check()?;
            deltas.push(delta);
        }
        Ok(Some(deltas))
    }

    fn delete_deltas_before(&self, store: &str, block: u64) -> Result<(), StateError> {
        for expired in self
            .list(store, DELTA_EXTENSION)?
            .into_iter()
            .take_while(|b| *b < block)
        {
            self.remove_file(store, expired, DELTA_EXTENSION)?;
        }
        Ok(())
    }
}

/// Backend that persists nothing, for stores that never need to resume
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCheckpointIO;

impl CheckpointIO for NoopCheckpointIO {
    fn write_snapshot(&self, _snapshot: &Snapshot) -> Result<(), StateError> {
        Ok(())
    }

    fn read_snapshot(&self, _store: &str, _block: u64) -> Result<Option<Snapshot>, StateError> {
        Ok(None)
    }

    fn list_snapshots(&self, _store: &str) -> Result<Vec<u64>, StateError> {
        Ok(Vec::new())
    }

    fn delete_snapshot(&self, _store: &str, _block: u64) -> Result<(), StateError> {
        Ok(())
    }

    fn write_deltas(&self, _store: &str, _block: u64, _deltas: &[StateDelta]) -> Result<(), StateError> {
        Ok(())
    }

    fn read_deltas(&self, _store: &str, _block: u64) -> Result<Option<Vec<StateDelta>>, StateError> {
        Ok(None)
    }

    fn delete_deltas_before(&self, _store: &str, _block: u64) -> Result<(), StateError> {
        Ok(())
    }
}
