// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # General description
//!
//! Implementation of the sparkle state store: stores with point-in-time reads over a staged delta
//! log, the merge engine reconciling stores of adjacent block ranges, checkpointing and the delta
//! fan-out hub.

mod bundler;
mod checkpoint;
mod delta_log;
mod disk_io;
mod hub;
mod merge;
mod store;
mod writers;

pub use bundler::Bundler;
pub use checkpoint::Checkpointer;
pub use delta_log::DeltaLog;
pub use disk_io::{DiskCheckpointIO, NoopCheckpointIO};
pub use hub::{DeltaHub, DeltaSubscriber};
pub use merge::{merge, merge_all};
pub use store::Store;
