// Copyright (c) 2022 MASSA LABS <info@massa.net>

use std::{
    ops::Deref,
    sync::Arc,
    time::Duration,
};

use crossbeam::channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use prometheus::{Counter, Gauge};

#[derive(Clone)]
pub struct SparkleReceiver<T> {
    pub(crate) receiver: Receiver<T>,
    pub(crate) name: String,
    /// channel size
    pub(crate) actual_len: Gauge,
    /// total received messages
    pub(crate) received: Counter,
    /// total messages evicted by the sender
    pub(crate) evicted: Counter,
    /// reference counter to know how many receiver are cloned
    pub(crate) ref_counter: Arc<()>,
}

impl<T> Drop for SparkleReceiver<T> {
    fn drop(&mut self) {
        if Arc::strong_count(&self.ref_counter) == 1 {
            // this is the last ref so we can unregister metrics
            let _ = prometheus::unregister(Box::new(self.actual_len.clone()));
            let _ = prometheus::unregister(Box::new(self.received.clone()));
            let _ = prometheus::unregister(Box::new(self.evicted.clone()));
        }
    }
}

impl<T> SparkleReceiver<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn on_received(&self) {
        // the sender may evict messages, so the gauge follows the queue length
        self.actual_len.set(self.receiver.len() as f64);
        self.received.inc();
    }

    /// attempt to receive a message from the channel
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let msg = self.receiver.try_recv()?;
        self.on_received();
        Ok(msg)
    }

    pub fn recv(&self) -> Result<T, RecvError> {
        let msg = self.receiver.recv()?;
        self.on_received();
        Ok(msg)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let msg = self.receiver.recv_timeout(timeout)?;
        self.on_received();
        Ok(msg)
    }

    /// Drains the messages currently queued, without waiting
    pub fn drain(&self) -> Vec<T> {
        std::iter::from_fn(|| self.try_recv().ok()).collect()
    }
}

impl<T> Deref for SparkleReceiver<T> {
    type Target = Receiver<T>;

    fn deref(&self) -> &Self::Target {
        &self.receiver
    }
}
