// Copyright (c) 2022 MASSA LABS <info@massa.net>

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

#[macro_export]
macro_rules! sparkle_trace {
    ($evt:expr, $params:tt) => {
        tracing::trace!("sparkle_trace:{}:{}", $evt, serde_json::json!($params));
    };
}

/// Maps the numeric `logging.level` setting (0 = error .. 4 = trace) to a level filter
pub fn level_filter(level: usize) -> LevelFilter {
    match level {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` directives take precedence over `level`.
///
/// Does nothing if a subscriber is already installed, so tests may call it repeatedly.
pub fn init_logging(level: usize) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(level).into())
        .from_env_lossy();
    let tracing_layer = tracing_subscriber::fmt::layer().with_filter(filter);
    let _ = tracing_subscriber::registry().with(tracing_layer).try_init();
}
