// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::PipelineError;
use crate::records::Block;
use sparkle_state_exports::{StoreConfig, StoreStatus};
use sparkle_state_worker::Store;
use std::collections::BTreeMap;

/// The stores driven by one worker, by name
#[derive(Debug, Clone, Default)]
pub struct StoreSet {
    stores: BTreeMap<String, Store>,
}

impl StoreSet {
    /// Fresh stores starting at `start_block`
    pub fn new(configs: &[StoreConfig], start_block: u64) -> Self {
        StoreSet::from_stores(
            configs
                .iter()
                .map(|config| Store::from_config(config, start_block)),
        )
    }

    pub fn from_stores(stores: impl IntoIterator<Item = Store>) -> Self {
        StoreSet {
            stores: stores
                .into_iter()
                .map(|store| (store.name().to_string(), store))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&Store, PipelineError> {
        self.stores
            .get(name)
            .ok_or_else(|| PipelineError::UnknownStore(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Store, PipelineError> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| PipelineError::UnknownStore(name.to_string()))
    }

    /// Removes store `name` from the set
    pub fn take(&mut self, name: &str) -> Result<Store, PipelineError> {
        self.stores
            .remove(name)
            .ok_or_else(|| PipelineError::UnknownStore(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Store> {
        self.stores.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Store> {
        self.stores.values_mut()
    }

    /// Drops the writes staged by a failed block in every store
    pub fn rollback(&mut self) {
        for store in self.stores.values_mut() {
            store.rollback();
        }
    }

    pub fn discard(&mut self) {
        for store in self.stores.values_mut() {
            store.discard();
        }
    }

    /// true if every store can still be written to
    pub fn is_live(&self) -> bool {
        self.stores
            .values()
            .all(|store| store.status() == StoreStatus::Live || store.status() == StoreStatus::Fresh)
    }

    pub fn into_stores(self) -> Vec<Store> {
        self.stores.into_values().collect()
    }
}

/// Extraction step: turns the records of a block into store writes.
///
/// A handler is cloned into every shard worker. It must derive its writes from the block and the
/// stores it is given only, so that shards computed independently merge into the result of a
/// sequential run.
pub trait BlockHandler: Clone + Send + 'static {
    /// Stores the handler writes to, with the merge strategy its writes rely on
    fn stores(&self) -> Vec<StoreConfig>;

    /// Stages the writes of `block`. The driver commits or rolls them back.
    fn handle_block(&mut self, block: &Block, stores: &mut StoreSet) -> Result<(), PipelineError>;
}
