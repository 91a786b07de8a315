//! Bounded ingest queue shared by producers and the transport worker.
//!
//! Producers push records from any thread; the single transport worker pops
//! them with a bounded wait that a stop signal can interrupt. When the queue is
//! saturated the oldest record is discarded to make room for the newest. The
//! worker signals a condition variable whenever it observes the queue empty so
//! shutdown can wait for a drain without polling.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, select};
use log::warn;
use parking_lot::{Condvar, Mutex};

use crate::{
    error::OverflowError,
    rate_limited_warner::RateLimitedWarner,
    record::{MAX_RECORD_LEN, split_into_chunks},
};

/// Default number of slots in the ingest queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32_768;

const DRAIN_WAIT_SLICE: Duration = Duration::from_millis(100);

/// Outcome of a timed pop by the worker.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Poll {
    Record(String),
    Idle,
    Stopped,
}

#[derive(Default)]
struct DrainSignal {
    lock: Mutex<()>,
    cond: Condvar,
}

/// Bounded, thread-safe FIFO of pending records.
pub struct IngestQueue {
    tx: Sender<String>,
    rx: Receiver<String>,
    capacity: usize,
    drained: DrainSignal,
    warner: RateLimitedWarner,
}

impl IngestQueue {
    /// Create a queue holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self::with_warner(capacity, RateLimitedWarner::default())
    }

    /// Create a queue reporting drops through the supplied warner.
    pub fn with_warner(capacity: usize, warner: RateLimitedWarner) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            drained: DrainSignal::default(),
            warner,
        }
    }

    /// Maximum number of queued records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no records are queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Records discarded by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.warner.total_dropped()
    }

    /// Split `record` into chunks of at most [`MAX_RECORD_LEN`] bytes and push
    /// each in order.
    ///
    /// # Errors
    ///
    /// Returns [`OverflowError`] when a chunk cannot be queued even after the
    /// oldest record was dropped. Chunks pushed before the failure stay queued.
    pub fn enqueue(&self, record: &str) -> Result<(), OverflowError> {
        for chunk in split_into_chunks(record, MAX_RECORD_LEN) {
            self.push(chunk.to_owned())?;
        }
        Ok(())
    }

    /// Push a single record, dropping the oldest queued record when full.
    ///
    /// # Errors
    ///
    /// Returns [`OverflowError`] if the queue is still full after the drop,
    /// which only happens when other producers refill the freed slot first.
    pub fn push(&self, record: String) -> Result<(), OverflowError> {
        let record = match self.tx.try_send(record) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(record) | TrySendError::Disconnected(record)) => record,
        };
        if self.rx.try_recv().is_ok() {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| {
                warn!("femtoship: ingest queue full; dropped {count} oldest records");
            });
        }
        match self.tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!("femtoship: ingest queue overflow; record rejected");
                Err(OverflowError)
            }
        }
    }

    /// Pop without waiting.
    pub(crate) fn try_pop(&self) -> Option<String> {
        match self.rx.try_recv() {
            Ok(record) => Some(record),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Pop the next record, waiting at most `timeout` or until `stop` fires.
    pub(crate) fn poll(&self, stop: &Receiver<()>, timeout: Duration) -> Poll {
        let outcome = select! {
            recv(stop) -> _ => Poll::Stopped,
            recv(self.rx) -> msg => match msg {
                Ok(record) => Poll::Record(record),
                Err(_) => Poll::Stopped,
            },
            default(timeout) => Poll::Idle,
        };
        self.notify_if_drained();
        outcome
    }

    /// Wake shutdown waiters if the queue is empty.
    pub(crate) fn notify_if_drained(&self) {
        if self.rx.is_empty() {
            self.notify_waiters();
        }
    }

    /// Wake shutdown waiters unconditionally (the consumer is going away).
    pub(crate) fn notify_waiters(&self) {
        let _guard = self.drained.lock.lock();
        self.drained.cond.notify_all();
    }

    /// Block until the queue is empty.
    ///
    /// Waits at most `timeout` when given, otherwise without limit. Returns
    /// early with `false` as soon as `abandon` reports that no consumer is left.
    pub(crate) fn wait_until_drained(
        &self,
        timeout: Option<Duration>,
        abandon: impl Fn() -> bool,
    ) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.drained.lock.lock();
        loop {
            if self.rx.is_empty() {
                return true;
            }
            if abandon() {
                return false;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    remaining.min(DRAIN_WAIT_SLICE)
                }
                None => DRAIN_WAIT_SLICE,
            };
            self.drained.cond.wait_for(&mut guard, slice);
        }
    }

    /// Emit any pending drop warning immediately.
    pub(crate) fn flush_warnings(&self) {
        self.warner.flush(|count| {
            warn!("femtoship: ingest queue dropped {count} oldest records");
        });
    }
}

impl Default for IngestQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for IngestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;
