// Copyright (c) 2022 MASSA LABS <info@massa.net>

use std::{
    ops::Deref,
    sync::Weak,
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, SendError, SendTimeoutError, Sender, TrySendError};
use prometheus::{Counter, Gauge};

/// Blocking sends wake up at this pace to notice a receiver that went away
const LIVENESS_TICK: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct SparkleSender<T> {
    pub(crate) sender: Sender<T>,
    /// handle on the queue used to evict the oldest message
    pub(crate) evictor: Receiver<T>,
    #[allow(dead_code)]
    pub(crate) name: String,
    /// channel size
    pub(crate) actual_len: Gauge,
    /// total evicted messages
    pub(crate) evicted: Counter,
    /// dead once every receiver clone is dropped
    pub(crate) receiver_alive: Weak<()>,
}

impl<T> SparkleSender<T> {
    /// true once every receiver of the channel was dropped
    pub fn is_disconnected(&self) -> bool {
        self.receiver_alive.strong_count() == 0
    }

    /// Send a message, waiting for room as long as the receiver is alive
    pub fn send(&self, msg: T) -> Result<(), SendError<T>> {
        let mut msg = msg;
        loop {
            if self.is_disconnected() {
                return Err(SendError(msg));
            }
            match self.sender.send_timeout(msg, LIVENESS_TICK) {
                Ok(()) => {
                    self.actual_len.set(self.sender.len() as f64);
                    return Ok(());
                }
                Err(SendTimeoutError::Timeout(m)) => msg = m,
                Err(SendTimeoutError::Disconnected(m)) => return Err(SendError(m)),
            }
        }
    }

    pub fn send_timeout(&self, msg: T, duration: Duration) -> Result<(), SendTimeoutError<T>> {
        self.send_deadline(msg, Instant::now() + duration)
    }

    pub fn send_deadline(&self, msg: T, deadline: Instant) -> Result<(), SendTimeoutError<T>> {
        let mut msg = msg;
        loop {
            if self.is_disconnected() {
                return Err(SendTimeoutError::Disconnected(msg));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SendTimeoutError::Timeout(msg));
            }
            let wait = LIVENESS_TICK.min(deadline - now);
            match self.sender.send_timeout(msg, wait) {
                Ok(()) => {
                    self.actual_len.set(self.sender.len() as f64);
                    return Ok(());
                }
                Err(SendTimeoutError::Timeout(m)) => msg = m,
                Err(e @ SendTimeoutError::Disconnected(_)) => return Err(e),
            }
        }
    }

    pub fn try_send(&self, msg: T) -> Result<(), TrySendError<T>> {
        if self.is_disconnected() {
            return Err(TrySendError::Disconnected(msg));
        }
        self.sender.try_send(msg)?;
        self.actual_len.set(self.sender.len() as f64);
        Ok(())
    }

    /// Send a message without ever waiting, evicting the oldest queued message if the channel is full.
    /// Returns the evicted message, if any.
    pub fn send_evicting_oldest(&self, msg: T) -> Result<Option<T>, SendError<T>> {
        let mut msg = msg;
        let mut evicted = None;
        loop {
            if self.is_disconnected() {
                return Err(SendError(msg));
            }
            match self.sender.try_send(msg) {
                Ok(()) => {
                    self.actual_len.set(self.sender.len() as f64);
                    return Ok(evicted);
                }
                Err(TrySendError::Full(m)) => {
                    msg = m;
                    // the consumer may have drained the queue in between
                    if let Ok(old) = self.evictor.try_recv() {
                        self.evicted.inc();
                        evicted = Some(old);
                    }
                }
                Err(TrySendError::Disconnected(m)) => return Err(SendError(m)),
            }
        }
    }
}

impl<T> Deref for SparkleSender<T> {
    type Target = Sender<T>;

    fn deref(&self) -> &Self::Target {
        &self.sender
    }
}
