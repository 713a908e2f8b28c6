// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! In-process fan-out of committed deltas to observers.

use parking_lot::RwLock;
use sparkle_channel::{receiver::SparkleReceiver, sender::SparkleSender, SparkleChannel};
use sparkle_state_exports::{HubConfig, SlowSubscriberPolicy, StateDelta, StateError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
struct Subscription {
    id: u64,
    sender: SparkleSender<StateDelta>,
}

enum Delivery {
    Delivered { evicted: usize },
    Gone,
}

/// Broadcasts the deltas of named topics (usually one per store) to bounded subscriber queues.
///
/// What happens when a queue is full depends on the configured `SlowSubscriberPolicy`.
/// Subscribers that went away are pruned during broadcasts.
pub struct DeltaHub {
    config: HubConfig,
    topics: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl DeltaHub {
    pub fn new(config: HubConfig) -> Self {
        DeltaHub {
            config,
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Declares a topic. Registering an existing topic keeps its subscribers.
    pub fn register_topic(&self, topic: &str) {
        self.topics.write().entry(topic.to_string()).or_default();
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }

    pub fn subscribe(&self, topic: &str) -> Result<DeltaSubscriber, StateError> {
        let mut topics = self.topics.write();
        let subscriptions = topics
            .get_mut(topic)
            .ok_or_else(|| StateError::UnknownTopic(topic.to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = SparkleChannel::new(
            format!("{}_subscriber_{}", topic, id),
            Some(self.config.subscriber_capacity.max(1)),
        );
        subscriptions.push(Subscription { id, sender });
        debug!("topic {}: new subscriber {}", topic, id);
        Ok(DeltaSubscriber {
            topic: topic.to_string(),
            id,
            receiver,
        })
    }

    /// Delivers `deltas`, in order, to every subscriber of `topic`.
    ///
    /// Returns the number of subscribers still attached. With the `Block` policy this waits as long
    /// as a live subscriber keeps its queue full.
    pub fn broadcast(&self, topic: &str, deltas: &[StateDelta]) -> Result<usize, StateError> {
        let subscriptions = self
            .topics
            .read()
            .get(topic)
            .cloned()
            .ok_or_else(|| StateError::UnknownTopic(topic.to_string()))?;
        if deltas.is_empty() {
            return Ok(subscriptions.len());
        }

        let mut gone = Vec::new();
        for subscription in &subscriptions {
            match self.deliver(subscription, deltas) {
                Delivery::Delivered { evicted: 0 } => {}
                Delivery::Delivered { evicted } => warn!(
                    "topic {}: subscriber {} is lagging, dropped its {} oldest deltas",
                    topic, subscription.id, evicted
                ),
                Delivery::Gone => gone.push(subscription.id),
            }
        }

        if !gone.is_empty() {
            if let Some(subscriptions) = self.topics.write().get_mut(topic) {
                subscriptions.retain(|s| !gone.contains(&s.id));
            }
            debug!("topic {}: pruned subscribers {:?}", topic, gone);
        }
        Ok(subscriptions.len() - gone.len())
    }

    fn deliver(&self, subscription: &Subscription, deltas: &[StateDelta]) -> Delivery {
        let sender = &subscription.sender;
        let mut evicted = 0;
        for delta in deltas {
            let delivered = match self.config.slow_subscriber_policy {
                SlowSubscriberPolicy::Block => sender.send(delta.clone()).is_ok(),
                SlowSubscriberPolicy::DropOldest => match sender.send_evicting_oldest(delta.clone()) {
                    Ok(dropped) => {
                        evicted += usize::from(dropped.is_some());
                        true
                    }
                    Err(_) => false,
                },
                SlowSubscriberPolicy::Disconnect => {
                    match sender.send_timeout(delta.clone(), self.config.send_timeout()) {
                        Ok(()) => true,
                        Err(err) => {
                            if err.is_timeout() {
                                warn!(
                                    "subscriber {} stalled for {:?}, disconnecting it",
                                    subscription.id,
                                    self.config.send_timeout()
                                );
                            }
                            false
                        }
                    }
                }
            };
            if !delivered {
                return Delivery::Gone;
            }
        }
        Delivery::Delivered { evicted }
    }
}

/// Receiving end of a topic subscription
pub struct DeltaSubscriber {
    topic: String,
    id: u64,
    receiver: SparkleReceiver<StateDelta>,
}

impl std::fmt::Debug for DeltaSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaSubscriber")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl DeltaSubscriber {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next delta. `None` once the hub dropped the subscription and the queue is empty.
    pub fn recv(&self) -> Option<StateDelta> {
        self.receiver.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<StateDelta> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<StateDelta> {
        self.receiver.try_recv().ok()
    }

    /// Deltas currently queued
    pub fn drain(&self) -> Vec<StateDelta> {
        self.receiver.drain()
    }
}
