// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This file defines all error types for the state store

use crate::{BlockRange, MergeStrategy, StoreStatus};
use displaydoc::Display;
use thiserror::Error;

/// State store error
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// ordinal {ordinal} on key {key} is lower than the ordinal {previous} already staged for it
    OrdinalRegression {
        /// written key
        key: String,
        /// rejected ordinal
        ordinal: u64,
        /// last ordinal staged for the key
        previous: u64,
    },
    /// block {block} is before the next expected block {expected} of store {store}
    BlockOrder {
        /// store name
        store: String,
        /// committed block
        block: u64,
        /// first block not yet committed
        expected: u64,
    },
    /// store {0} does not accept writes in status {1}
    StoreClosed(String, StoreStatus),
    /// incompatible merge strategies: {base} cannot be merged with {next}
    IncompatibleStrategies {
        /// strategy of the earlier store
        base: MergeStrategy,
        /// strategy of the later store
        next: MergeStrategy,
    },
    /// block ranges {base} and {next} are not contiguous
    NonContiguousRanges {
        /// range of the earlier store
        base: BlockRange,
        /// range of the later store
        next: BlockRange,
    },
    /// store {0} still holds unflushed deltas
    UnflushedDeltas(String),
    /// unsupported merge strategy {0}
    UnknownMergeStrategy(String),
    /// value {value} of key {key} is not a valid number
    InvalidNumber {
        /// offending key
        key: String,
        /// offending value, lossy utf8
        value: String,
    },
    /// unknown delta topic {0}
    UnknownTopic(String),
    /// corrupted delta: {0}
    CorruptedDelta(String),
    /// checkpoint artifact error: {0}
    SerializationError(String),
    /// checkpoint io error: {0}
    IOError(String),
    /// missing checkpoint artifact: {0}
    MissingArtifact(String),
}

impl StateError {
    /// Fatal errors leave the unit of work in an undefined state and must abort it.
    /// I/O errors are recoverable, the driver may retry the boundary. A missing artifact leaves
    /// nothing behind, the driver may resume from another block.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StateError::IOError(_) | StateError::MissingArtifact(_))
    }
}

impl From<std::io::Error> for StateError {
    fn from(err: std::io::Error) -> Self {
        StateError::IOError(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::SerializationError(err.to_string())
    }
}
