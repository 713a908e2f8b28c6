// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Build here the pipeline settings from the configuration file toml

use crate::error::SettingsError;
use serde::Deserialize;
use sparkle_state_exports::{BlockRange, StateConfig};
use std::collections::HashSet;
use std::path::Path;

pub const BASE_CONFIG_PATH: &str = "base_config/config.toml";
pub const OVERRIDE_CONFIG_PATH: &str = "config/config.toml";
pub const ENV_PREFIX: &str = "SPARKLE";

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LoggingSettings {
    pub level: usize,
}

/// Parallel backfill of a historical block range
#[derive(Debug, Deserialize, Clone)]
pub struct BackfillConfig {
    pub start_block: u64,
    /// first block after the backfilled range
    pub end_block: u64,
    /// number of workers, each owning a contiguous block range
    pub shards: usize,
}

impl BackfillConfig {
    pub fn range(&self) -> BlockRange {
        BlockRange::new(self.start_block, self.end_block)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub state: StateConfig,
    pub backfill: BackfillConfig,
}

impl Settings {
    /// Checks what deserialization cannot
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.state.checkpoint.interval == 0 {
            return Err(SettingsError::Invalid(
                "state.checkpoint.interval must be positive".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for store in &self.state.stores {
            if store.name.is_empty()
                || !store
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(SettingsError::Invalid(format!(
                    "store name {:?} must be made of [a-zA-Z0-9_-]",
                    store.name
                )));
            }
            if !names.insert(store.name.as_str()) {
                return Err(SettingsError::Invalid(format!(
                    "store {} is declared twice",
                    store.name
                )));
            }
        }
        if self.backfill.end_block <= self.backfill.start_block {
            return Err(SettingsError::Invalid(format!(
                "backfill range {} is empty",
                self.backfill.range()
            )));
        }
        if self.backfill.shards == 0 {
            return Err(SettingsError::Invalid(
                "backfill.shards must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads the settings file at `path`, the optional override file, then environment variables
/// prefixed by `env_prefix` (`SPARKLE_BACKFILL__SHARDS=8`).
pub fn build_settings(path: &Path, env_prefix: &str) -> Result<Settings, SettingsError> {
    let mut builder = config::Config::builder().add_source(config::File::from(path));

    let override_path = std::env::var("SPARKLE_CONFIG_OVERRIDE_PATH")
        .unwrap_or_else(|_| OVERRIDE_CONFIG_PATH.to_string());
    if Path::new(&override_path).is_file() {
        builder = builder.add_source(config::File::with_name(&override_path));
    }

    let settings: Settings = builder
        .add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
