//! In-process publisher for dry runs and tests.
//!
//! Keeps the same contract as the Kafka publisher: a bounded queue that
//! rejects with [`SendError::QueueFull`], acknowledgements issued on `poll`,
//! and a full drain at close.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use super::{DeliveryOutcome, DeliveryTracker, Publisher, PublisherFactory};
use crate::error::{PublisherError, SendError};

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// queue high-water mark
    pub capacity: usize,
    /// acknowledgements per `poll`; 0 acknowledges everything pending
    pub acks_per_poll: usize,
    /// when set, every delivery fails with this reason
    pub failure: Option<String>,
    /// keep delivered payloads for inspection
    pub retain: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            capacity: 100_000,
            acks_per_poll: 0,
            failure: None,
            retain: false,
        }
    }
}

type Sink = Arc<Mutex<Vec<Vec<u8>>>>;

pub struct MemoryPublisher {
    pending: VecDeque<Vec<u8>>,
    config: MemoryConfig,
    sink: Sink,
    tracker: DeliveryTracker,
}

impl MemoryPublisher {
    fn acknowledge(&mut self, n: usize) {
        for payload in self.pending.drain(..n.min(self.pending.len())) {
            match &self.config.failure {
                Some(reason) => self.tracker.record(DeliveryOutcome::Failed {
                    reason: reason.clone(),
                }),
                None => {
                    if self.config.retain {
                        self.sink
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(payload);
                    }
                    self.tracker.record(DeliveryOutcome::Delivered);
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Publisher for MemoryPublisher {
    fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        if self.pending.len() >= self.config.capacity {
            return Err(SendError::QueueFull);
        }
        self.pending.push_back(payload.to_vec());
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) {
        let n = match self.config.acks_per_poll {
            0 => self.pending.len(),
            n => n,
        };
        self.acknowledge(n);
    }

    fn drain_and_close(mut self, _timeout: Duration) {
        self.acknowledge(self.pending.len());
    }
}

/// Factory whose publishers share one delivered-payload sink.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    config: MemoryConfig,
    sink: Sink,
}

impl MemoryBroker {
    pub fn new(config: MemoryConfig) -> MemoryBroker {
        MemoryBroker {
            config,
            sink: Sink::default(),
        }
    }

    /// Payloads delivered so far, in submission order (only when `retain` is set).
    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PublisherFactory for MemoryBroker {
    type Publisher = MemoryPublisher;

    fn create(&self, tracker: DeliveryTracker) -> Result<MemoryPublisher, PublisherError> {
        Ok(MemoryPublisher {
            pending: VecDeque::with_capacity(self.config.capacity.min(4096)),
            config: self.config.clone(),
            sink: self.sink.clone(),
            tracker,
        })
    }
}
