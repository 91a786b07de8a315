//! Producer-facing client.
//!
//! A [`LogClient`] owns the configuration, the ingest queue and at most one
//! transport worker. The worker is started lazily by the first
//! [`LogClient::enqueue`] and stopped by [`LogClient::close`] or when the
//! client is dropped; a later `enqueue` starts a fresh worker.

mod builder;
mod config;
mod file_config;

use std::{sync::Arc, time::Duration};

use delegate::delegate;
use log::{error, warn};
use parking_lot::Mutex;

use crate::{
    error::OverflowError,
    identity::IdentityProvider,
    queue::IngestQueue,
    rate_limited_warner::RateLimitedWarner,
    record::sanitize,
    spill::{FileSpillStore, SpillStore},
    worker::{StatusSnapshot, WorkerHandle, WorkerParts, WorkerState, WorkerStatus, spawn_worker},
};

pub use builder::ClientBuilder;
pub use config::{ClientConfig, DEFAULT_DEVICE_ID_FILE, default_device_id_path};

/// Embeddable log-shipping client.
///
/// Cheap to share behind an [`Arc`]: every method takes `&self` and producers
/// may call [`enqueue`](Self::enqueue) from any thread.
pub struct LogClient<S = FileSpillStore>
where
    S: SpillStore + Clone + 'static,
{
    config: ClientConfig,
    queue: Arc<IngestQueue>,
    store: S,
    identity: Arc<dyn IdentityProvider>,
    worker: Mutex<Option<WorkerHandle>>,
    status: Mutex<WorkerStatus>,
}

impl LogClient {
    /// Start configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<S> LogClient<S>
where
    S: SpillStore + Clone + 'static,
{
    pub(crate) fn from_parts(
        config: ClientConfig,
        store: S,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let warner = RateLimitedWarner::new(config.warn_interval);
        let queue = Arc::new(IngestQueue::with_warner(config.queue_capacity, warner));
        Self {
            config,
            queue,
            store,
            identity,
            worker: Mutex::new(None),
            status: Mutex::new(WorkerStatus::default()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    delegate! {
        to self.queue {
            /// Number of records waiting for the transport worker.
            #[call(len)]
            pub fn queued(&self) -> usize;
            /// Records discarded by the queue's drop-oldest policy.
            #[call(dropped)]
            pub fn dropped_by_queue(&self) -> u64;
        }
    }

    /// Queue `record` for delivery, starting the transport worker if needed.
    ///
    /// Records longer than the maximum record length are split into ordered
    /// chunks. When the queue is full the oldest queued record is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`OverflowError`] if the queue stayed full despite the drop.
    pub fn enqueue(&self, record: &str) -> Result<(), OverflowError> {
        self.ensure_worker();
        self.queue.enqueue(record)
    }

    /// Worker state and delivery counters of the current (or last) worker.
    pub fn status(&self) -> StatusSnapshot {
        self.status.lock().snapshot()
    }

    /// Drain the queue, then stop the transport worker.
    ///
    /// Waits at most `flush_timeout_ms` for queued records to be consumed, or
    /// without limit when zero. Records still queued afterwards are written to
    /// the spill store for the next run. Idempotent.
    pub fn close(&self, flush_timeout_ms: u64) {
        let status = match self.worker.lock().as_ref() {
            Some(handle) => handle.status().clone(),
            None => return,
        };
        let timeout = (flush_timeout_ms > 0).then(|| Duration::from_millis(flush_timeout_ms));
        let drained = self
            .queue
            .wait_until_drained(timeout, || status.state() == WorkerState::Stopped);
        if !drained {
            warn!(
                "femtoship: {} records still queued at shutdown; persisting them",
                self.queue.len()
            );
        }
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            handle.stop();
        }
        self.persist_leftovers();
        self.queue.flush_warnings();
    }

    fn ensure_worker(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let parts = WorkerParts {
            connector: self.config.connection_settings(),
            store: self.store.clone(),
            queue: Arc::clone(&self.queue),
            identity: Arc::clone(&self.identity),
            format: self.config.format_options(),
            policy: self.config.retry.clone(),
            warn_interval: self.config.warn_interval,
        };
        match spawn_worker(parts) {
            Ok(handle) => {
                *self.status.lock() = handle.status().clone();
                *worker = Some(handle);
            }
            Err(err) => error!("femtoship: cannot start transport worker: {err}"),
        }
    }

    /// Spill records enqueued after the worker exited on its own.
    fn persist_leftovers(&self) {
        let mut store = self.store.clone();
        while let Some(record) = self.queue.try_pop() {
            if let Err(err) = store.append(&sanitize(&record)) {
                error!("femtoship: cannot persist queued record: {err}");
            }
        }
    }
}

impl<S> Drop for LogClient<S>
where
    S: SpillStore + Clone + 'static,
{
    fn drop(&mut self) {
        self.close(0);
    }
}

impl<S> std::fmt::Debug for LogClient<S>
where
    S: SpillStore + Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogClient")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
