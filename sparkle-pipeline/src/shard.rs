// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::PipelineError;
use sparkle_state_exports::BlockRange;

/// Split of a block range into contiguous shard ranges.
///
/// Inner boundaries fall on checkpoint intervals so that every shard starts on a snapshot block.
/// A range too short to be split gives fewer shards than requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPlan {
    range: BlockRange,
    shards: Vec<BlockRange>,
}

impl ShardPlan {
    pub fn split(range: BlockRange, shards: usize, interval: u64) -> Result<Self, PipelineError> {
        if range.is_empty() {
            return Err(PipelineError::InvalidPlan(format!("empty range {}", range)));
        }
        if shards == 0 {
            return Err(PipelineError::InvalidPlan(
                "at least one shard is required".to_string(),
            ));
        }
        if interval == 0 {
            return Err(PipelineError::InvalidPlan(
                "checkpoint interval must be positive".to_string(),
            ));
        }

        let size = range.len().div_ceil(shards as u64);
        let mut ranges = Vec::with_capacity(shards);
        let mut start = range.start;
        for index in 1..shards as u64 {
            let target = range.start + index * size;
            let end = target.div_ceil(interval) * interval;
            if end >= range.end {
                break;
            }
            if end > start {
                ranges.push(BlockRange::new(start, end));
                start = end;
            }
        }
        ranges.push(BlockRange::new(start, range.end));
        Ok(ShardPlan {
            range,
            shards: ranges,
        })
    }

    pub fn range(&self) -> BlockRange {
        self.range
    }

    pub fn shards(&self) -> &[BlockRange] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}
