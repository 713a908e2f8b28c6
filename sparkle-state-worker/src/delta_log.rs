// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Append-only log of the deltas staged by the current unit of work.

use sparkle_state_exports::{Key, StateDelta, StateError};
use std::collections::HashMap;

/// Deltas staged since the last flush, in emission order.
///
/// Positions of the deltas of each key are indexed so that point-in-time reads only walk the
/// deltas of the key they target.
#[derive(Debug, Clone, Default)]
pub struct DeltaLog {
    deltas: Vec<StateDelta>,
    by_key: HashMap<Key, Vec<usize>>,
}

impl DeltaLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a delta.
    ///
    /// Fails without recording anything if the delta is malformed or if its ordinal is lower than
    /// the last ordinal staged for the same key.
    pub fn push(&mut self, delta: StateDelta) -> Result<(), StateError> {
        delta.check()?;
        if let Some(previous) = self.last_for(&delta.key) {
            if delta.ordinal < previous.ordinal {
                return Err(StateError::OrdinalRegression {
                    key: delta.key,
                    ordinal: delta.ordinal,
                    previous: previous.ordinal,
                });
            }
        }
        self.by_key
            .entry(delta.key.clone())
            .or_default()
            .push(self.deltas.len());
        self.deltas.push(delta);
        Ok(())
    }

    /// Deltas staged on `key`, oldest first
    pub fn for_key<'a>(&'a self, key: &str) -> impl DoubleEndedIterator<Item = &'a StateDelta> + 'a {
        self.by_key
            .get(key)
            .into_iter()
            .flatten()
            .map(move |idx| &self.deltas[*idx])
    }

    /// First delta staged on `key`
    pub fn first_for(&self, key: &str) -> Option<&StateDelta> {
        self.for_key(key).next()
    }

    /// Latest delta staged on `key`
    pub fn last_for(&self, key: &str) -> Option<&StateDelta> {
        self.for_key(key).next_back()
    }

    pub fn deltas(&self) -> &[StateDelta] {
        &self.deltas
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Empties the log and hands back its deltas in emission order
    pub fn take(&mut self) -> Vec<StateDelta> {
        self.by_key.clear();
        std::mem::take(&mut self.deltas)
    }
}
