//! Invalidation sinks.
//!
//! A sink receives the targets produced for each change event. Delivery is
//! synchronous and fire-and-forget: a sink must not block and cannot fail.

use crate::lock::mutex_lock;
use chatsync_types::InvalidationTarget;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Consumer of invalidation targets.
pub trait InvalidationSink: Send + Sync {
    /// Mark everything under `target` stale.
    fn invalidate(&self, target: InvalidationTarget);
}

impl<T: InvalidationSink + ?Sized> InvalidationSink for Arc<T> {
    fn invalidate(&self, target: InvalidationTarget) {
        (**self).invalidate(target)
    }
}

/// Forwards targets into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<InvalidationTarget>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InvalidationTarget>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl InvalidationSink for ChannelSink {
    fn invalidate(&self, target: InvalidationTarget) {
        if let Err(mpsc::error::SendError(target)) = self.tx.send(target) {
            debug!(%target, "invalidation receiver dropped");
        }
    }
}

/// Captures every target in delivery order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    targets: Arc<Mutex<Vec<InvalidationTarget>>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets received so far.
    pub fn targets(&self) -> Vec<InvalidationTarget> {
        mutex_lock(&self.targets, "invalidation", "targets").clone()
    }

    /// Forget everything received.
    pub fn clear(&self) {
        mutex_lock(&self.targets, "invalidation", "clear").clear();
    }
}

impl InvalidationSink for RecordingSink {
    fn invalidate(&self, target: InvalidationTarget) {
        mutex_lock(&self.targets, "invalidation", "invalidate").push(target);
    }
}
