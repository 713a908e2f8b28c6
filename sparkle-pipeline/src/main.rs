// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! Sparkle pipeline: runs the reference exchange handler over a file of decoded blocks
#![warn(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;
use sparkle_logging::init_logging;
use sparkle_pipeline::{
    build_settings, Block, Coordinator, ExchangeHandler, MemoryBlockSource, TokenPairIndex,
    BASE_CONFIG_PATH, ENV_PREFIX,
};
use sparkle_state_worker::DeltaHub;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Runs the exchange handler over a range of decoded blocks
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Settings file
    #[arg(long, default_value = BASE_CONFIG_PATH)]
    config: PathBuf,
    /// JSON array of decoded blocks
    #[arg(long)]
    blocks: PathBuf,
    /// Process the range on a single worker instead of parallel shards
    #[arg(long)]
    sequential: bool,
    /// Log the deltas committed to these stores
    #[arg(long = "watch")]
    watched_stores: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = build_settings(&args.config, ENV_PREFIX)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    init_logging(settings.logging.level);

    let raw = std::fs::read(&args.blocks)
        .with_context(|| format!("reading blocks from {}", args.blocks.display()))?;
    let blocks: Vec<Block> = serde_json::from_slice(&raw).context("decoding blocks")?;
    let index = TokenPairIndex::from_pairs(blocks.iter().flat_map(Block::pairs_created));
    info!("{} blocks loaded, {} pairs indexed", blocks.len(), index.len());

    let hub = Arc::new(DeltaHub::new(settings.state.hub.clone()));
    let coordinator = Coordinator::new(
        settings.state.clone(),
        ExchangeHandler::new(Arc::new(index)),
        Arc::new(MemoryBlockSource::new(blocks)),
        Some(hub.clone()),
    )?;

    let mut watchers = Vec::new();
    for store in &args.watched_stores {
        let subscriber = hub.subscribe(store)?;
        watchers.push(
            thread::Builder::new()
                .name(format!("watch-{}", store))
                .spawn(move || {
                    while let Some(delta) = subscriber.recv() {
                        info!(
                            "{} {} ordinal={} key={} new={:?}",
                            subscriber.topic(),
                            delta.op,
                            delta.ordinal,
                            delta.key,
                            delta.after().map(String::from_utf8_lossy)
                        );
                    }
                })
                .expect("OS failed to spawn watcher thread"),
        );
    }
    drop(hub);

    let range = settings.backfill.range();
    let stores = if args.sequential {
        coordinator.run_sequential(range)?
    } else {
        coordinator.backfill(range, settings.backfill.shards)?
    };
    drop(coordinator);
    join_watchers(watchers);

    for store in stores.iter() {
        info!(
            "store {} ({}): {} keys over {}",
            store.name(),
            store.strategy(),
            store.table().len(),
            store.range()
        );
    }
    Ok(())
}

/// Waits for the delta watchers and returns how many of them panicked
fn join_watchers(watchers: Vec<JoinHandle<()>>) -> usize {
    let mut panicked = 0;
    for watcher in watchers {
        let name = watcher.thread().name().unwrap_or("watcher").to_string();
        if watcher.join().is_err() {
            warn!("delta watcher thread {} panicked", name);
            panicked += 1;
        }
    }
    panicked
}
