// Copyright (c) 2022 MASSA LABS <info@massa.net>

/// Number of blocks between two snapshots
pub const CHECKPOINT_INTERVAL: u64 = 100;

/// Snapshots kept per store before the oldest ones are pruned
pub const MAX_SNAPSHOTS: usize = 10;

/// Default capacity of a delta subscriber queue
pub const SUBSCRIBER_CAPACITY: usize = 100;

/// Default time a broadcast waits on a full subscriber queue with the disconnect policy
pub const SUBSCRIBER_SEND_TIMEOUT_MS: u64 = 1000;

// Artifact names
pub const SNAPSHOT_EXTENSION: &str = "kv";
pub const DELTA_EXTENSION: &str = "delta";
