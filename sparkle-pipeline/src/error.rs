// Copyright (c) 2022 MASSA LABS <info@massa.net>

use displaydoc::Display;
use sparkle_state_exports::StateError;
use thiserror::Error;

/// Settings error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum SettingsError {
    /// could not load settings: {0}
    ConfigError(#[from] config::ConfigError),
    /// invalid settings: {0}
    Invalid(String),
}

/// Pipeline error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum PipelineError {
    /// state error: {0}
    StateError(#[from] StateError),
    /// settings error: {0}
    SettingsError(#[from] SettingsError),
    /// store {0} is not declared
    UnknownStore(String),
    /// store {name} is declared with {declared} but the handler needs {required}
    StoreMismatch {
        /// store name
        name: String,
        /// strategy found in the settings
        declared: String,
        /// strategy the handler relies on
        required: String,
    },
    /// invalid shard plan: {0}
    InvalidPlan(String),
    /// invalid record in block {block}: {reason}
    InvalidRecord {
        /// block holding the record
        block: u64,
        /// what is wrong with it
        reason: String,
    },
    /// block source error: {0}
    SourceError(String),
    /// shard worker {0} panicked
    WorkerPanicked(String),
}

impl PipelineError {
    /// Only checkpoint I/O failures may be retried, everything else aborts the run
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::StateError(err) => err.is_fatal(),
            PipelineError::SourceError(_) => false,
            _ => true,
        }
    }
}
