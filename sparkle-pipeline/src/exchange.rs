// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Reference handler of a constant-product exchange: pair directory, activity counters, volumes
//! and first-seen watermarks.

use crate::error::PipelineError;
use crate::handler::{BlockHandler, StoreSet};
use crate::pair_index::{pair_key, tokens_key, TokenPairIndex};
use crate::records::{Block, Record};
use bigdecimal::BigDecimal;
use num::{BigInt, Zero};
use sparkle_state_exports::{MergeStrategy, StoreConfig};
use std::str::FromStr;
use std::sync::Arc;

pub const PAIRS_STORE: &str = "pairs";
pub const TRANSACTIONS_STORE: &str = "transactions";
pub const VOLUMES_STORE: &str = "volumes";
pub const FIRST_SEEN_STORE: &str = "first_seen";

/// Writes, for every block:
/// * `pairs` (last key): `pair:<address>` -> pair record json, `tokens:<a>:<b>` -> pair address
/// * `transactions` (sum of integers): `pairs`, `pair:<address>:{swaps,mints,burns}`
/// * `volumes` (sum of decimals): `pair:<address>:<day>`, `token:<address>:<day>` in USD
/// * `first_seen` (min of integers): `pair:<address>`, `token:<address>` -> block number
///
/// Token volumes are only tracked for the pairs known to the token-pair index.
#[derive(Debug, Clone)]
pub struct ExchangeHandler {
    index: Arc<TokenPairIndex>,
}

impl ExchangeHandler {
    pub fn new(index: Arc<TokenPairIndex>) -> Self {
        ExchangeHandler { index }
    }

    pub fn index(&self) -> &TokenPairIndex {
        &self.index
    }
}

impl BlockHandler for ExchangeHandler {
    fn stores(&self) -> Vec<StoreConfig> {
        [
            (PAIRS_STORE, MergeStrategy::LastKey),
            (TRANSACTIONS_STORE, MergeStrategy::SumInt),
            (VOLUMES_STORE, MergeStrategy::SumFloat),
            (FIRST_SEEN_STORE, MergeStrategy::MinInt),
        ]
        .into_iter()
        .map(|(name, merge_strategy)| StoreConfig {
            name: name.to_string(),
            merge_strategy,
        })
        .collect()
    }

    fn handle_block(&mut self, block: &Block, stores: &mut StoreSet) -> Result<(), PipelineError> {
        let one = BigInt::from(1);
        let block_number = BigInt::from(block.number);
        let day = block.day_id();

        for record in block.sorted_records() {
            let ordinal = record.ordinal();
            match record {
                Record::PairCreated(pair) => {
                    let encoded = serde_json::to_vec(pair).map_err(|err| {
                        PipelineError::InvalidRecord {
                            block: block.number,
                            reason: err.to_string(),
                        }
                    })?;
                    let pairs = stores.get_mut(PAIRS_STORE)?;
                    pairs.set(ordinal, pair_key(&pair.address), encoded)?;
                    pairs.set(
                        ordinal,
                        tokens_key(&pair.token0.address, &pair.token1.address),
                        pair.address.clone(),
                    )?;

                    stores
                        .get_mut(TRANSACTIONS_STORE)?
                        .add_int(ordinal, "pairs", &one)?;

                    let first_seen = stores.get_mut(FIRST_SEEN_STORE)?;
                    first_seen.set_min_int(ordinal, pair_key(&pair.address), &block_number)?;
                    for token in [&pair.token0.address, &pair.token1.address] {
                        first_seen.set_min_int(ordinal, format!("token:{}", token), &block_number)?;
                    }
                }
                Record::Swap(swap) => {
                    stores.get_mut(TRANSACTIONS_STORE)?.add_int(
                        ordinal,
                        format!("pair:{}:swaps", swap.pair),
                        &one,
                    )?;
                    stores.get_mut(FIRST_SEEN_STORE)?.set_min_int(
                        ordinal,
                        pair_key(&swap.pair),
                        &block_number,
                    )?;

                    // swaps of unpriced tokens carry no usd amount
                    if swap.amount_usd.is_empty() {
                        continue;
                    }
                    let amount = BigDecimal::from_str(&swap.amount_usd).map_err(|err| {
                        PipelineError::InvalidRecord {
                            block: block.number,
                            reason: format!("swap amount {:?}: {}", swap.amount_usd, err),
                        }
                    })?;
                    if amount.is_zero() {
                        continue;
                    }
                    let volumes = stores.get_mut(VOLUMES_STORE)?;
                    volumes.add_float(ordinal, format!("pair:{}:{}", swap.pair, day), &amount)?;
                    if let Some((token0, token1)) = self.index.tokens_of(&swap.pair) {
                        volumes.add_float(ordinal, format!("token:{}:{}", token0, day), &amount)?;
                        volumes.add_float(ordinal, format!("token:{}:{}", token1, day), &amount)?;
                    }
                }
                Record::Mint(mint) => {
                    stores.get_mut(TRANSACTIONS_STORE)?.add_int(
                        ordinal,
                        format!("pair:{}:mints", mint.pair),
                        &one,
                    )?;
                }
                Record::Burn(burn) => {
                    stores.get_mut(TRANSACTIONS_STORE)?.add_int(
                        ordinal,
                        format!("pair:{}:burns", burn.pair),
                        &one,
                    )?;
                }
            }
        }
        Ok(())
    }
}
