// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Sequential and sharded runs of a block handler over a block range.

use crate::error::PipelineError;
use crate::handler::{BlockHandler, StoreSet};
use crate::records::BlockSource;
use crate::shard::ShardPlan;
use crate::worker::ShardWorker;
use sparkle_logging::sparkle_trace;
use sparkle_state_exports::{BlockRange, CheckpointConfig, StateConfig, StateError, StoreConfig};
use sparkle_state_worker::{merge, Checkpointer, DeltaHub};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Folder, under the data folder, holding the checkpoints of the shards of a parallel run
pub const PARTIAL_FOLDER: &str = "partial";

/// Runs a block handler over block ranges and reconciles the stores of parallel shards.
///
/// The continuous stores are checkpointed in `state.checkpoint.data_folder`. During a sharded run
/// the first shard extends them, the other shards checkpoint under `partial/<start>-<end>`.
pub struct Coordinator<H: BlockHandler> {
    config: StateConfig,
    handler: H,
    source: Arc<dyn BlockSource>,
    hub: Option<Arc<DeltaHub>>,
    checkpointer: Checkpointer,
}

impl<H: BlockHandler> std::fmt::Debug for Coordinator<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("checkpointer", &self.checkpointer)
            .finish_non_exhaustive()
    }
}

impl<H: BlockHandler> Coordinator<H> {
    /// Checks that every store the handler writes is declared with the strategy it relies on
    pub fn new(
        config: StateConfig,
        handler: H,
        source: Arc<dyn BlockSource>,
        hub: Option<Arc<DeltaHub>>,
    ) -> Result<Self, PipelineError> {
        for required in handler.stores() {
            let declared = config
                .store(&required.name)
                .ok_or_else(|| PipelineError::UnknownStore(required.name.clone()))?;
            if declared.merge_strategy != required.merge_strategy {
                return Err(PipelineError::StoreMismatch {
                    name: required.name,
                    declared: declared.merge_strategy.to_string(),
                    required: required.merge_strategy.to_string(),
                });
            }
            if let Some(hub) = &hub {
                hub.register_topic(&required.name);
            }
        }
        let checkpointer = Checkpointer::on_disk(config.checkpoint.clone())?;
        Ok(Coordinator {
            config,
            handler,
            source,
            hub,
            checkpointer,
        })
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    fn store_configs(&self) -> Vec<StoreConfig> {
        self.handler.stores()
    }

    /// Continuous stores as they were at the start of `block`.
    ///
    /// If the continuous checkpoints lack the delta artifacts between the latest snapshot and
    /// `block`, as they do inside the later shards of a backfill, the missing blocks are processed
    /// again from the block source and checkpointed.
    pub fn load_stores(&self, block: u64) -> Result<StoreSet, PipelineError> {
        let reason = match self.load_checkpointed(block) {
            Err(PipelineError::StateError(StateError::MissingArtifact(reason))) => reason,
            res => return res,
        };
        let mut resume = block;
        for config in self.store_configs() {
            match self.checkpointer.latest_snapshot(&config.name, block)? {
                Some(snapshot) => resume = resume.min(snapshot),
                None => return Err(StateError::MissingArtifact(reason).into()),
            }
        }
        warn!("{}, processing blocks {} to {} again", reason, resume, block);
        let stores = self.load_checkpointed(resume)?;
        ShardWorker::new(
            BlockRange::new(resume, block),
            self.handler.clone(),
            stores,
            self.source.clone(),
            self.checkpointer.clone(),
            None,
        )
        .run()
    }

    fn load_checkpointed(&self, block: u64) -> Result<StoreSet, PipelineError> {
        let mut stores = Vec::new();
        for config in self.store_configs() {
            stores.push(
                self.checkpointer
                    .load(&config.name, config.merge_strategy, block)?,
            );
        }
        Ok(StoreSet::from_stores(stores))
    }

    /// Processes `range` on the current thread, resuming the continuous stores at `range.start`
    pub fn run_sequential(&self, range: BlockRange) -> Result<StoreSet, PipelineError> {
        let stores = self.load_stores(range.start)?;
        ShardWorker::new(
            range,
            self.handler.clone(),
            stores,
            self.source.clone(),
            self.checkpointer.clone(),
            self.hub.clone(),
        )
        .run()
    }

    fn partial_checkpointer(&self, range: BlockRange) -> Result<Checkpointer, PipelineError> {
        let folder = self
            .config
            .checkpoint
            .data_folder
            .join(PARTIAL_FOLDER)
            .join(format!("{}-{}", range.start, range.end));
        Ok(Checkpointer::on_disk(CheckpointConfig {
            data_folder: folder,
            ..self.config.checkpoint.clone()
        })?)
    }

    /// Processes `range` split in up to `shards` parallel workers, then merges their stores left
    /// to right into the continuous stores. The running merge is snapshotted at every shard
    /// boundary and at `range.end`.
    ///
    /// The result equals the one of `run_sequential` over the same range.
    pub fn backfill(&self, range: BlockRange, shards: usize) -> Result<StoreSet, PipelineError> {
        let plan = ShardPlan::split(range, shards, self.config.checkpoint.interval)?;
        info!("backfill of {} over {} shards", range, plan.len());
        sparkle_trace!("sparkle_pipeline.backfill.start", {
            "start": range.start,
            "end": range.end,
            "shards": plan.len()
        });

        let mut handles = Vec::with_capacity(plan.len());
        for (index, shard) in plan.shards().iter().enumerate() {
            let (stores, checkpointer) = if index == 0 {
                (self.load_stores(shard.start)?, self.checkpointer.clone())
            } else {
                (
                    StoreSet::new(&self.store_configs(), shard.start),
                    self.partial_checkpointer(*shard)?,
                )
            };
            let worker = ShardWorker::new(
                *shard,
                self.handler.clone(),
                stores,
                self.source.clone(),
                checkpointer,
                self.hub.clone(),
            );
            handles.push((*shard, worker.spawn()));
        }

        // join every worker before reporting a failure
        let mut results = Vec::with_capacity(handles.len());
        for (shard, handle) in handles {
            let res = handle
                .join()
                .unwrap_or_else(|_| Err(PipelineError::WorkerPanicked(shard.to_string())));
            results.push(res);
        }
        let mut shard_stores = Vec::with_capacity(results.len());
        let mut failure = None;
        for res in results {
            match res {
                Ok(stores) => shard_stores.push(stores),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = failure {
            for stores in shard_stores.iter_mut() {
                stores.discard();
            }
            return Err(err);
        }

        let mut merged = Vec::new();
        for config in self.store_configs() {
            let parts = shard_stores
                .iter_mut()
                .map(|stores| stores.take(&config.name))
                .collect::<Result<Vec<_>, _>>()?;
            let mut parts = parts.into_iter();
            let Some(mut store) = parts.next() else {
                continue;
            };
            for mut next in parts {
                self.checkpointer.write_snapshot(&mut store)?;
                let folded = merge(&store, &next)?;
                store.mark_merged();
                next.mark_merged();
                store = folded;
            }
            self.checkpointer.write_snapshot(&mut store)?;
            debug!(
                "store {}: merged {} shards into {} keys over {}",
                store.name(),
                plan.len(),
                store.table().len(),
                store.range()
            );
            merged.push(store);
        }
        info!("backfill of {} merged", range);
        Ok(StoreSet::from_stores(merged))
    }
}
