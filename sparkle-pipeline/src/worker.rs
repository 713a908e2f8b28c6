// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Drives the stores of one block range, block after block.

use crate::error::PipelineError;
use crate::handler::{BlockHandler, StoreSet};
use crate::records::{Block, BlockSource};
use sparkle_logging::sparkle_trace;
use sparkle_state_exports::{BlockRange, StateDelta, StateError};
use sparkle_state_worker::{Checkpointer, DeltaHub, Store};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Attempts at writing the checkpoint artifacts of a block before giving up
const COMMIT_ATTEMPTS: usize = 3;

/// Owns the stores of a shard and advances them over its block range
pub struct ShardWorker<H: BlockHandler> {
    range: BlockRange,
    handler: H,
    stores: StoreSet,
    source: Arc<dyn BlockSource>,
    checkpointer: Checkpointer,
    hub: Option<Arc<DeltaHub>>,
}

impl<H: BlockHandler> ShardWorker<H> {
    /// `stores` must all end at `range.start`, fresh or loaded from a checkpoint
    pub fn new(
        range: BlockRange,
        handler: H,
        stores: StoreSet,
        source: Arc<dyn BlockSource>,
        checkpointer: Checkpointer,
        hub: Option<Arc<DeltaHub>>,
    ) -> Self {
        ShardWorker {
            range,
            handler,
            stores,
            source,
            checkpointer,
            hub,
        }
    }

    pub fn range(&self) -> BlockRange {
        self.range
    }

    /// Runs the worker on a dedicated thread
    pub fn spawn(self) -> JoinHandle<Result<StoreSet, PipelineError>> {
        let name = format!("shard-{}-{}", self.range.start, self.range.end);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let res = self.run();
                if let Err(ref err) = res {
                    error!("{} stopped: {}", name, err);
                }
                res
            })
            .expect("in `ShardWorker::spawn`, OS failed to spawn shard thread")
    }

    /// Processes every block of the range and hands back the stores
    pub fn run(mut self) -> Result<StoreSet, PipelineError> {
        info!("shard {}: processing {} blocks", self.range, self.range.len());
        for number in self.range.start..self.range.end {
            let block = self.source.block(number)?;
            if block.number != number {
                return Err(PipelineError::SourceError(format!(
                    "asked for block {}, got block {}",
                    number, block.number
                )));
            }
            self.process_block(&block)?;
        }
        sparkle_trace!("sparkle_pipeline.shard.done", {
            "start": self.range.start,
            "end": self.range.end
        });
        Ok(self.stores)
    }

    /// Stages the writes of `block`, then commits and broadcasts them store by store
    fn process_block(&mut self, block: &Block) -> Result<(), PipelineError> {
        if let Err(err) = self.handler.handle_block(block, &mut self.stores) {
            self.stores.rollback();
            return Err(err);
        }

        let mut committed = 0;
        for store in self.stores.iter_mut() {
            let deltas = commit_with_retry(&self.checkpointer, store, block.number)?;
            committed += deltas.len();
            if let Some(hub) = &self.hub {
                hub.broadcast(store.name(), &deltas)?;
            }
        }
        debug!("block {}: committed {} deltas", block.number, committed);
        Ok(())
    }
}

fn commit_with_retry(
    checkpointer: &Checkpointer,
    store: &mut Store,
    block: u64,
) -> Result<Vec<StateDelta>, StateError> {
    let mut attempt = 1;
    loop {
        match checkpointer.commit_block(store, block) {
            Ok(deltas) => return Ok(deltas),
            Err(err) if !err.is_fatal() && attempt < COMMIT_ATTEMPTS => {
                warn!(
                    "store {}: checkpoint of block {} failed (attempt {}): {}",
                    store.name(),
                    block,
                    attempt,
                    err
                );
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
