// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # General description
//!
//! Driver of the sparkle state stores: turns decoded exchange records into store writes, block
//! after block, and backfills historical ranges with parallel shards merged into continuous
//! stores.
//!
//! Settings are loaded from `base_config/config.toml` by `build_settings`.

mod coordinator;
mod error;
mod exchange;
mod handler;
mod pair_index;
mod records;
mod settings;
mod shard;
mod worker;

pub use coordinator::{Coordinator, PARTIAL_FOLDER};
pub use error::{PipelineError, SettingsError};
pub use exchange::{
    ExchangeHandler, FIRST_SEEN_STORE, PAIRS_STORE, TRANSACTIONS_STORE, VOLUMES_STORE,
};
pub use handler::{BlockHandler, StoreSet};
pub use pair_index::{pair_key, tokens_key, TokenPairIndex, PAIR_KEY_PREFIX};
pub use records::{
    Block, BlockSource, Burn, MemoryBlockSource, Mint, PairCreated, Record, Swap, Token,
    SECONDS_PER_DAY,
};
pub use settings::{
    build_settings, BackfillConfig, LoggingSettings, Settings, BASE_CONFIG_PATH, ENV_PREFIX,
    OVERRIDE_CONFIG_PATH,
};
pub use shard::ShardPlan;
pub use worker::ShardWorker;

#[cfg(test)]
mod tests;
