// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Bounded crossbeam channels instrumented with prometheus gauges.
//!
//! The sender keeps a handle on the queue so that it can evict the oldest message when a
//! consumer falls behind. Receiver liveness is therefore tracked through a reference counter
//! instead of crossbeam disconnection.

use std::sync::Arc;

use receiver::SparkleReceiver;
use sender::SparkleSender;

pub mod receiver;
pub mod sender;

#[derive(Clone)]
pub struct SparkleChannel {}

impl SparkleChannel {
    #[allow(clippy::new_ret_no_self)]
    pub fn new<T>(name: String, capacity: Option<usize>) -> (SparkleSender<T>, SparkleReceiver<T>) {
        use prometheus::{Counter, Gauge};
        use tracing::warn;

        let (s, r) = if let Some(capacity) = capacity {
            crossbeam::channel::bounded::<T>(capacity)
        } else {
            crossbeam::channel::unbounded::<T>()
        };

        let metric_name = metric_name(&name);

        // set when sending, reset from the queue length when receiving
        let actual_len = Gauge::new(
            format!("{}_channel_actual_size", metric_name),
            "Actual length of channel",
        )
        .expect("sanitized metric names are always valid");

        let received = Counter::new(
            format!("{}_channel_total_receive", metric_name),
            "Total received messages",
        )
        .expect("sanitized metric names are always valid");

        let evicted = Counter::new(
            format!("{}_channel_total_evicted", metric_name),
            "Messages evicted to make room for newer ones",
        )
        .expect("sanitized metric names are always valid");

        // fails if a channel with the same name is alive, metrics are then shared
        let collectors: [Box<dyn prometheus::core::Collector>; 3] = [
            Box::new(actual_len.clone()),
            Box::new(received.clone()),
            Box::new(evicted.clone()),
        ];
        for collector in collectors {
            if let Err(e) = prometheus::register(collector) {
                warn!("Failed to register metrics of channel {} : {}", name, e);
            }
        }

        let ref_counter = Arc::new(());

        let sender = SparkleSender {
            sender: s,
            evictor: r.clone(),
            name: name.clone(),
            actual_len: actual_len.clone(),
            evicted: evicted.clone(),
            receiver_alive: Arc::downgrade(&ref_counter),
        };

        let receiver = SparkleReceiver {
            receiver: r,
            name,
            actual_len,
            received,
            evicted,
            ref_counter,
        };

        (sender, receiver)
    }
}

/// Prometheus only accepts `[a-zA-Z0-9_:]` in metric names
fn metric_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("sparkle_{}", sanitized)
}
