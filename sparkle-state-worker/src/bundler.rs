// Copyright (c) 2022 MASSA LABS <info@massa.net>

/// Tracks the checkpoint window a store is currently writing into.
///
/// A window opens with a full snapshot and collects the per-block delta artifacts written after it.
/// A reset bundler has no open window: the next checkpointed block dumps the whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundler {
    window_start: Option<u64>,
    bundled_blocks: Vec<u64>,
}

impl Bundler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundler whose window was opened by an existing snapshot
    pub fn resumed_at(window_start: u64) -> Self {
        Bundler {
            window_start: Some(window_start),
            bundled_blocks: Vec::new(),
        }
    }

    /// Block of the snapshot that opened the current window
    pub fn window_start(&self) -> Option<u64> {
        self.window_start
    }

    /// Blocks whose delta artifact was written in the current window
    pub fn bundled_blocks(&self) -> &[u64] {
        &self.bundled_blocks
    }

    /// true if `block` must be preceded by a full snapshot
    pub fn needs_snapshot(&self, block: u64, interval: u64) -> bool {
        self.window_start.is_none() || block % interval == 0
    }

    pub fn open_window(&mut self, block: u64) {
        self.window_start = Some(block);
        self.bundled_blocks.clear();
    }

    pub fn record(&mut self, block: u64) {
        self.bundled_blocks.push(block);
    }

    pub fn reset(&mut self) {
        self.window_start = None;
        self.bundled_blocks.clear();
    }
}
