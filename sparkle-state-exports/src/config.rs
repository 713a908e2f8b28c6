// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This file defines the configuration structures of the state store system

use crate::{
    MergeStrategy, CHECKPOINT_INTERVAL, MAX_SNAPSHOTS, SUBSCRIBER_CAPACITY,
    SUBSCRIBER_SEND_TIMEOUT_MS,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Declaration of one store
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// name of the derived dataset (`pairs`, `prices`...)
    pub name: String,
    /// rule used to merge two shards of this store
    pub merge_strategy: MergeStrategy,
}

/// Checkpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    /// folder holding snapshot and delta artifacts
    pub data_folder: PathBuf,
    /// number of blocks between two snapshots
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// number of snapshots kept per store
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,
}

impl CheckpointConfig {
    /// Default checkpoint configuration writing into `data_folder`
    pub fn new(data_folder: PathBuf) -> Self {
        CheckpointConfig {
            data_folder,
            interval: CHECKPOINT_INTERVAL,
            max_snapshots: MAX_SNAPSHOTS,
        }
    }

    /// First block of the interval window containing `block`
    pub fn boundary_of(&self, block: u64) -> u64 {
        (block / self.interval) * self.interval
    }

    /// true if a snapshot is due at the start of `block`
    pub fn is_boundary(&self, block: u64) -> bool {
        block % self.interval == 0
    }
}

fn default_interval() -> u64 {
    CHECKPOINT_INTERVAL
}

fn default_max_snapshots() -> usize {
    MAX_SNAPSHOTS
}

/// What a broadcast does when a subscriber queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlowSubscriberPolicy {
    /// wait until the subscriber makes room, stalls block processing
    Block,
    /// evict the oldest queued delta to make room
    DropOldest,
    /// wait up to `send_timeout_ms`, then disconnect the subscriber
    Disconnect,
}

/// Delta hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// capacity of each subscriber queue
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    /// behaviour on a full subscriber queue
    #[serde(default = "default_policy")]
    pub slow_subscriber_policy: SlowSubscriberPolicy,
    /// wait budget of the disconnect policy
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

impl HubConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            subscriber_capacity: SUBSCRIBER_CAPACITY,
            slow_subscriber_policy: SlowSubscriberPolicy::Block,
            send_timeout_ms: SUBSCRIBER_SEND_TIMEOUT_MS,
        }
    }
}

fn default_subscriber_capacity() -> usize {
    SUBSCRIBER_CAPACITY
}

fn default_policy() -> SlowSubscriberPolicy {
    SlowSubscriberPolicy::Block
}

fn default_send_timeout_ms() -> u64 {
    SUBSCRIBER_SEND_TIMEOUT_MS
}

/// Configuration of the state store system
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub hub: HubConfig,
    /// declared stores
    pub stores: Vec<StoreConfig>,
}

impl StateConfig {
    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|store| store.name == name)
    }
}
