//! Buffered, non-blocking publishing of encoded payloads
pub mod kafka;
pub mod memory;

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;
use tracing::warn;

use crate::error::{PublisherError, SendError};

/// Buffered sender of encoded payloads.
///
/// `send` only enqueues; `poll` services delivery callbacks and frees buffer
/// slots; `drain_and_close` is the one call that blocks on the broker.
pub trait Publisher {
    /// Enqueues one payload. [`SendError::QueueFull`] means the high-water mark
    /// is reached and the caller should `poll` and retry.
    fn send(&mut self, payload: &[u8]) -> Result<(), SendError>;

    fn poll(&mut self, timeout: Duration);

    /// Waits until every enqueued payload is acknowledged or failed, or until
    /// `timeout`; leftovers are purged and reported once each as failed.
    fn drain_and_close(self, timeout: Duration);
}

/// Creates one publisher per run, wired to that run's tracker.
pub trait PublisherFactory {
    type Publisher: Publisher;

    fn create(&self, tracker: DeliveryTracker) -> Result<Self::Publisher, PublisherError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

/// Run-owned delivery counters, fed from the publisher's callbacks.
#[derive(Debug, Clone, Default)]
pub struct DeliveryTracker {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: u64,
    pub failed: u64,
}

impl DeliveryTracker {
    pub fn new() -> DeliveryTracker {
        DeliveryTracker::default()
    }

    pub fn record(&self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => {
                self.inner.delivered.fetch_add(1, Ordering::Relaxed);
            }
            DeliveryOutcome::Failed { reason } => {
                self.inner.failed.fetch_add(1, Ordering::Relaxed);
                warn!("delivery failed: {reason}");
            }
        }
    }

    pub fn report(&self) -> DeliveryReport {
        DeliveryReport {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }
}
