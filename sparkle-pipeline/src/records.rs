// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Decoded exchange records, as handed over by the extraction layer.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub symbol: String,
    pub decimals: u32,
}

/// A pair contract deployed by the factory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCreated {
    pub address: String,
    pub token0: Token,
    pub token1: Token,
    pub transaction: String,
    pub log_ordinal: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swap {
    pub pair: String,
    pub transaction: String,
    /// decimal string, may be empty when no price was known
    pub amount_usd: String,
    pub log_ordinal: u64,
}

/// Liquidity added to a pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mint {
    pub pair: String,
    pub transaction: String,
    pub amount0: String,
    pub amount1: String,
    pub log_ordinal: u64,
}

/// Liquidity removed from a pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Burn {
    pub pair: String,
    pub transaction: String,
    pub amount0: String,
    pub amount1: String,
    pub log_ordinal: u64,
}

/// Every kind of record a block can carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    PairCreated(PairCreated),
    Swap(Swap),
    Mint(Mint),
    Burn(Burn),
}

impl Record {
    /// Position of the emitting log inside its block
    pub fn ordinal(&self) -> u64 {
        match self {
            Record::PairCreated(pair) => pair.log_ordinal,
            Record::Swap(swap) => swap.log_ordinal,
            Record::Mint(mint) => mint.log_ordinal,
            Record::Burn(burn) => burn.log_ordinal,
        }
    }

    /// Address of the pair the record is about
    pub fn pair(&self) -> &str {
        match self {
            Record::PairCreated(pair) => &pair.address,
            Record::Swap(swap) => &swap.pair,
            Record::Mint(mint) => &mint.pair,
            Record::Burn(burn) => &burn.pair,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    /// unix seconds
    pub timestamp: u64,
    pub records: Vec<Record>,
}

impl Block {
    /// Empty block
    pub fn new(number: u64, timestamp: u64) -> Self {
        Block {
            number,
            timestamp,
            records: Vec::new(),
        }
    }

    pub fn day_id(&self) -> u64 {
        self.timestamp / SECONDS_PER_DAY
    }

    /// Records in emission order. The sort is stable: records sharing an ordinal keep their order.
    pub fn sorted_records(&self) -> Vec<&Record> {
        let mut records: Vec<&Record> = self.records.iter().collect();
        records.sort_by_key(|record| record.ordinal());
        records
    }

    /// Pairs deployed in this block
    pub fn pairs_created(&self) -> impl Iterator<Item = &PairCreated> {
        self.records.iter().filter_map(|record| match record {
            Record::PairCreated(pair) => Some(pair),
            _ => None,
        })
    }
}

/// Provider of decoded blocks. Must be callable from every shard worker.
pub trait BlockSource: Send + Sync {
    /// Block `number`. Blocks without any record may be returned empty.
    fn block(&self, number: u64) -> Result<Block, PipelineError>;
}

/// Blocks held in memory, missing numbers are empty blocks
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockSource {
    blocks: BTreeMap<u64, Block>,
}

impl MemoryBlockSource {
    pub fn new(blocks: impl IntoIterator<Item = Block>) -> Self {
        MemoryBlockSource {
            blocks: blocks.into_iter().map(|block| (block.number, block)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockSource for MemoryBlockSource {
    fn block(&self, number: u64) -> Result<Block, PipelineError> {
        Ok(self
            .blocks
            .get(&number)
            .cloned()
            .unwrap_or_else(|| Block::new(number, 0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap(pair: &str, log_ordinal: u64) -> Record {
        Record::Swap(Swap {
            pair: pair.to_string(),
            transaction: "0xt".to_string(),
            amount_usd: "1".to_string(),
            log_ordinal,
        })
    }

    #[test]
    fn records_sort_by_ordinal() {
        let mut block = Block::new(7, 3 * SECONDS_PER_DAY + 5);
        block.records = vec![swap("b", 4), swap("a", 1), swap("c", 4), swap("d", 2)];
        let pairs: Vec<&str> = block.sorted_records().into_iter().map(Record::pair).collect();
        assert_eq!(pairs, vec!["a", "d", "b", "c"]);
        assert_eq!(block.day_id(), 3);
    }

    #[test]
    fn tagged_json() {
        let json = serde_json::to_value(swap("0xp", 3)).unwrap();
        assert_eq!(json["kind"], "swap");
        assert_eq!(json["pair"], "0xp");
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back.ordinal(), 3);
    }

    #[test]
    fn memory_source_fills_gaps() {
        let source = MemoryBlockSource::new(vec![Block::new(3, 10)]);
        assert_eq!(source.block(3).unwrap().timestamp, 10);
        assert!(source.block(4).unwrap().records.is_empty());
    }
}
