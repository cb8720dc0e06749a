use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    encoder::AvroEncoder,
    error::{SendError, SourceReadError},
    normalizer::Normalizer,
    publisher::Publisher,
    reader::{ChunkedReader, SourceFormat},
    value::RawRow,
};

/// How long to service callbacks before retrying a send rejected for backpressure.
const BACKPRESSURE_POLL: Duration = Duration::from_millis(100);

/// Cooperative stop signal, checked between batches and while waiting on backpressure.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Reading,
    Normalizing,
    Encoding,
    Publishing,
    Draining,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    /// rows taken from the source, counted against the record limit
    pub records_read: u64,
    /// payloads accepted by the publisher
    pub records_sent: u64,
    pub normalization_errors: u64,
    pub encode_errors: u64,
    pub send_errors: u64,
    pub backpressure_waits: u64,
    pub batches: u64,
}

/// Drives one source through normalize, encode and publish.
pub struct Ingester<'a, P: Publisher> {
    normalizer: &'a Normalizer,
    encoder: &'a AvroEncoder,
    publisher: P,
    record_limit: u64,
    cancel: &'a CancelFlag,
    format: SourceFormat,
    state: RunState,
    counts: RecordCounts,
}

impl<'a, P: Publisher> Ingester<'a, P> {
    pub fn new(
        normalizer: &'a Normalizer,
        encoder: &'a AvroEncoder,
        publisher: P,
        record_limit: u64,
        cancel: &'a CancelFlag,
        format: SourceFormat,
    ) -> Ingester<'a, P> {
        Ingester {
            normalizer,
            encoder,
            publisher,
            record_limit,
            cancel,
            format,
            state: RunState::NotStarted,
            counts: RecordCounts::default(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn counts(&self) -> RecordCounts {
        self.counts
    }

    fn enter(&mut self, state: RunState) {
        debug!(from = ?self.state, to = ?state, "run state");
        self.state = state;
    }

    /// Pulls batches until the source ends, the record limit is hit, or the
    /// run is cancelled. Records within a run are sent in source order.
    pub fn run(&mut self, reader: &mut dyn ChunkedReader) -> Result<(), SourceReadError> {
        while self.counts.records_read < self.record_limit {
            if self.cancel.is_cancelled() {
                warn!("[{}] cancelled after {} records", self.format, self.counts.records_read);
                break;
            }
            self.enter(RunState::Reading);
            let batch = match reader.next_batch() {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    self.enter(RunState::Failed);
                    return Err(e);
                }
            };
            self.counts.batches += 1;
            let remaining = (self.record_limit - self.counts.records_read) as usize;
            for row in batch.iter().take(remaining) {
                self.process(row);
            }
            self.publisher.poll(Duration::ZERO);
            info!("  [{}] records sent: {}", self.format, self.counts.records_sent);
        }
        Ok(())
    }

    fn process(&mut self, row: &RawRow) {
        self.counts.records_read += 1;

        self.enter(RunState::Normalizing);
        let record = match self.normalizer.normalize(row) {
            Ok(record) => record,
            Err(e) => {
                self.counts.normalization_errors += 1;
                warn!("[{}] record {} skipped: {e}", self.format, self.counts.records_read);
                return;
            }
        };

        self.enter(RunState::Encoding);
        let payload = match self.encoder.encode(&record) {
            Ok(payload) => payload,
            Err(e) => {
                self.counts.encode_errors += 1;
                warn!("[{}] record {} not encoded: {e}", self.format, self.counts.records_read);
                return;
            }
        };

        self.enter(RunState::Publishing);
        self.try_send(&payload);
    }

    /// Keeps offering the payload until the publisher accepts it; a full
    /// queue is never a reason to drop a record.
    fn try_send(&mut self, payload: &[u8]) {
        loop {
            match self.publisher.send(payload) {
                Ok(()) => {
                    self.counts.records_sent += 1;
                    return;
                }
                Err(SendError::QueueFull) => {
                    if self.cancel.is_cancelled() {
                        self.counts.send_errors += 1;
                        warn!("[{}] record {} dropped: cancelled while queue full", self.format, self.counts.records_read);
                        return;
                    }
                    self.counts.backpressure_waits += 1;
                    self.publisher.poll(BACKPRESSURE_POLL);
                }
                Err(e @ SendError::Rejected(_)) => {
                    self.counts.send_errors += 1;
                    warn!("[{}] record {} not sent: {e}", self.format, self.counts.records_read);
                    return;
                }
            }
        }
    }

    /// Drain barrier: blocks until every accepted payload is settled, then
    /// ends in `Completed`, or `Failed` if reading broke off.
    pub fn finish(mut self, drain_timeout: Duration) -> (RunState, RecordCounts) {
        let failed = self.state == RunState::Failed;
        self.enter(RunState::Draining);
        self.publisher.drain_and_close(drain_timeout);
        // `drain_and_close` consumed the publisher, so `enter` (which borrows
        // all of `self`) is inlined here over the remaining fields.
        let next = if failed {
            RunState::Failed
        } else {
            RunState::Completed
        };
        debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
        (self.state, self.counts)
    }
}
