// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::PipelineError;
use crate::exchange::ExchangeHandler;
use crate::handler::{BlockHandler, StoreSet};
use crate::pair_index::TokenPairIndex;
use crate::records::{Block, BlockSource, Burn, MemoryBlockSource, Mint, PairCreated, Record, Swap, Token};
use sparkle_state_exports::{CheckpointConfig, HubConfig, StateConfig, Table};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const TOKENS: [&str; 5] = ["wbnb", "busd", "cake", "eth", "btcb"];

fn token(address: &str) -> Token {
    Token {
        address: address.to_string(),
        symbol: address.to_uppercase(),
        decimals: 18,
    }
}

/// Deterministic exchange activity over blocks `0..blocks`, one block per hour.
///
/// A pair is created every 7 blocks. Existing pairs see swaps, mints and burns at varying rates,
/// some swaps carry no usd amount.
pub fn history(blocks: u64) -> Vec<Block> {
    let mut pairs: Vec<String> = Vec::new();
    let mut history = Vec::new();
    for number in 0..blocks {
        let mut block = Block::new(number, number * 3_600);
        let mut ordinal = 0;
        if number % 7 == 0 {
            let n = pairs.len();
            let address = format!("0xpair{}", n);
            block.records.push(Record::PairCreated(PairCreated {
                address: address.clone(),
                token0: token(TOKENS[n % TOKENS.len()]),
                token1: token(&format!("0xtoken{}", n)),
                transaction: format!("0xtx{}", number),
                log_ordinal: ordinal,
            }));
            ordinal += 1;
            pairs.push(address);
        }
        for (i, pair) in pairs.iter().enumerate() {
            let seed = number + i as u64;
            if seed % 3 == 0 {
                let amount_usd = if seed % 11 == 0 {
                    String::new()
                } else {
                    format!("{}.{}", (number * 7 + i as u64) % 50, seed % 10)
                };
                block.records.push(Record::Swap(Swap {
                    pair: pair.clone(),
                    transaction: format!("0xtx{}", number),
                    amount_usd,
                    log_ordinal: ordinal,
                }));
                ordinal += 1;
            }
            if seed % 5 == 0 {
                block.records.push(Record::Mint(Mint {
                    pair: pair.clone(),
                    transaction: format!("0xtx{}", number),
                    amount0: "10".to_string(),
                    amount1: "20".to_string(),
                    log_ordinal: ordinal,
                }));
                ordinal += 1;
            }
            if seed % 13 == 0 {
                block.records.push(Record::Burn(Burn {
                    pair: pair.clone(),
                    transaction: format!("0xtx{}", number),
                    amount0: "1".to_string(),
                    amount1: "2".to_string(),
                    log_ordinal: ordinal,
                }));
                ordinal += 1;
            }
        }
        history.push(block);
    }
    history
}

/// Index of every pair created in `blocks`
pub fn index_of(blocks: &[Block]) -> TokenPairIndex {
    TokenPairIndex::from_pairs(blocks.iter().flat_map(Block::pairs_created))
}

pub fn exchange(blocks: &[Block]) -> (ExchangeHandler, Arc<dyn BlockSource>) {
    let handler = ExchangeHandler::new(Arc::new(index_of(blocks)));
    let source: Arc<dyn BlockSource> = Arc::new(MemoryBlockSource::new(blocks.to_vec()));
    (handler, source)
}

pub fn state_config(folder: &Path, interval: u64, handler: &impl BlockHandler) -> StateConfig {
    StateConfig {
        checkpoint: CheckpointConfig {
            data_folder: folder.to_path_buf(),
            interval,
            max_snapshots: 100,
        },
        hub: HubConfig::default(),
        stores: handler.stores(),
    }
}

/// Committed tables by store name
pub fn tables(stores: &StoreSet) -> BTreeMap<String, Table> {
    stores
        .iter()
        .map(|store| (store.name().to_string(), store.table().clone()))
        .collect()
}

/// Source failing on one block
pub struct FailingSource {
    pub inner: MemoryBlockSource,
    pub failing_block: u64,
}

impl BlockSource for FailingSource {
    fn block(&self, number: u64) -> Result<Block, PipelineError> {
        if number == self.failing_block {
            return Err(PipelineError::SourceError(format!(
                "block {} is unavailable",
                number
            )));
        }
        self.inner.block(number)
    }
}
