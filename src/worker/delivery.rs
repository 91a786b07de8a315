//! The transport worker's connect/retry/broken state machine.

use std::{
    cell::Cell,
    collections::VecDeque,
    io,
    sync::Arc,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use log::{debug, error, info, warn};

use crate::{
    connection::{Connector, Transport},
    error::RejectedRecord,
    format::WireFormatter,
    queue::{IngestQueue, Poll},
    rate_limited_warner::RateLimitedWarner,
    record::sanitize,
    spill::SpillStore,
};

use super::{RetryPolicy, WorkerParts, WorkerState, WorkerStatus};

/// Sticky view of the owner's stop channel.
///
/// The owner stops the worker by dropping its sender; any message counts too.
struct StopSignal {
    rx: Receiver<()>,
    fired: Cell<bool>,
}

impl StopSignal {
    fn new(rx: Receiver<()>) -> Self {
        Self {
            rx,
            fired: Cell::new(false),
        }
    }

    fn is_set(&self) -> bool {
        if !self.fired.get() {
            match self.rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => self.fired.set(true),
                Err(TryRecvError::Empty) => {}
            }
        }
        self.fired.get()
    }

    /// Sleep for `delay` unless stopped first. Returns `true` when stopped.
    fn pause(&self, delay: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        match self.rx.recv_timeout(delay) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.fired.set(true);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Where the record being delivered came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    /// Read from the spill store at startup.
    Backlog,
    /// Taken from the ingest queue.
    Live,
}

enum Failure {
    Format(serde_json::Error),
    /// The collector answered but refused the record.
    Rejected(io::Error),
    Io(io::Error),
}

impl From<io::Error> for Failure {
    fn from(err: io::Error) -> Self {
        if RejectedRecord::is_rejection(&err) {
            Self::Rejected(err)
        } else {
            Self::Io(err)
        }
    }
}

pub(super) struct TransportWorker<C: Connector, S> {
    connector: C,
    store: S,
    queue: Arc<IngestQueue>,
    formatter: WireFormatter,
    policy: RetryPolicy,
    stop: StopSignal,
    status: WorkerStatus,
    transport: Option<C::Transport>,
    failures: u32,
    broken: bool,
    backlog: VecDeque<String>,
    backlog_pending: bool,
    warner: RateLimitedWarner,
}

impl<C: Connector, S: SpillStore> TransportWorker<C, S> {
    /// Build the worker state. Runs on the worker thread, so identity
    /// resolution stays off the producers' path.
    pub(super) fn new(parts: WorkerParts<C, S>, stop_rx: Receiver<()>, status: WorkerStatus) -> Self {
        let WorkerParts {
            connector,
            store,
            queue,
            identity,
            format,
            policy,
            warn_interval,
        } = parts;
        Self {
            connector,
            store,
            queue,
            formatter: WireFormatter::new(identity.identity(), format),
            policy,
            stop: StopSignal::new(stop_rx),
            status,
            transport: None,
            failures: 0,
            broken: false,
            backlog: VecDeque::new(),
            backlog_pending: false,
            warner: RateLimitedWarner::new(warn_interval),
        }
    }

    pub(super) fn run(mut self) {
        self.status.set_state(WorkerState::Starting);
        match self.connector.instantiate() {
            Ok(transport) => self.transport = Some(transport),
            Err(err) => {
                error!("femtoship: cannot create connection: {err}; persisting queued records");
                self.finish();
                return;
            }
        }
        if self.reconnect() {
            self.status.set_state(WorkerState::Connected);
        } else if !self.stop.is_set() {
            warn!("femtoship: collector unreachable at startup; continuing disconnected");
            self.status.set_state(WorkerState::Recovering);
        }
        self.load_backlog();

        while !self.stop.is_set() {
            let next = match self.backlog.pop_front() {
                Some(record) => Some((record, Origin::Backlog)),
                None => match self.queue.poll(self.stop.receiver(), self.policy.poll_interval) {
                    Poll::Record(record) => Some((record, Origin::Live)),
                    Poll::Idle => None,
                    Poll::Stopped => break,
                },
            };
            if self.broken {
                self.try_recover();
            }
            let Some((record, origin)) = next else {
                continue;
            };
            if self.broken {
                self.spill(&record);
            } else {
                self.deliver(record, origin);
            }
        }
        self.finish();
    }

    fn load_backlog(&mut self) {
        match self.store.drain_all(false) {
            Ok(records) if !records.is_empty() => {
                info!("femtoship: replaying {} stored records", records.len());
                self.backlog = records.into();
                self.backlog_pending = true;
            }
            Ok(_) => {}
            Err(err) => warn!("femtoship: cannot read spill store: {err}"),
        }
    }

    /// Up to `connect_attempts` connects, `reconnect_delay` apart.
    fn reconnect(&mut self) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        let attempts = self.policy.connect_attempts;
        for attempt in 1..=attempts {
            if self.stop.is_set() {
                return false;
            }
            match transport.connect() {
                Ok(()) => return true,
                Err(err) => debug!("femtoship: connect attempt {attempt}/{attempts} failed: {err}"),
            }
            if attempt < attempts && self.stop.pause(self.policy.reconnect_delay) {
                return false;
            }
        }
        false
    }

    fn transmit(&mut self, record: &str) -> Result<(), Failure> {
        let line = self.formatter.format(record).map_err(Failure::Format)?;
        match self.transport.as_mut() {
            Some(transport) => transport.write(&line).map_err(Failure::from),
            None => Err(Failure::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "no connection",
            ))),
        }
    }

    fn deliver(&mut self, record: String, origin: Origin) {
        loop {
            match self.transmit(&record) {
                Ok(()) => {
                    self.on_sent(origin);
                    return;
                }
                Err(Failure::Format(err)) => {
                    warn!("femtoship: cannot format record: {err}; dropping it");
                    self.status.record_dropped();
                    return;
                }
                Err(Failure::Rejected(err)) => {
                    warn!("femtoship: {err}; dropping it");
                    self.failures = 0;
                    self.status.record_dropped();
                    self.status.set_state(WorkerState::Connected);
                    if origin == Origin::Backlog {
                        self.remove_replayed_backlog();
                    }
                    return;
                }
                Err(Failure::Io(err)) => {
                    self.failures += 1;
                    warn!(
                        "femtoship: write failed ({}/{}): {err}",
                        self.failures, self.policy.failure_threshold
                    );
                    if self.failures >= self.policy.failure_threshold {
                        self.enter_broken(record, origin);
                        return;
                    }
                    self.status.set_state(WorkerState::Recovering);
                    if !self.reconnect() && self.stop.is_set() {
                        self.shelve(record, origin);
                        return;
                    }
                }
            }
        }
    }

    fn on_sent(&mut self, origin: Origin) {
        self.failures = 0;
        self.status.record_sent();
        self.status.set_state(WorkerState::Connected);
        if origin == Origin::Backlog {
            self.status.record_replayed();
            self.remove_replayed_backlog();
        }
    }

    /// Delete the store once the last startup record has been handled.
    fn remove_replayed_backlog(&mut self) {
        if self.backlog.is_empty() && self.backlog_pending {
            self.backlog_pending = false;
            if let Err(err) = self.store.drain_all(true) {
                warn!("femtoship: cannot remove replayed spill store: {err}");
            }
        }
    }

    /// Put back a record whose delivery was interrupted by the stop signal.
    fn shelve(&mut self, record: String, origin: Origin) {
        match origin {
            Origin::Backlog => self.backlog.push_front(record),
            Origin::Live => self.spill(&record),
        }
    }

    fn enter_broken(&mut self, record: String, origin: Origin) {
        warn!(
            "femtoship: {} consecutive write failures; spilling records until the collector is back",
            self.failures
        );
        self.broken = true;
        self.status.set_state(WorkerState::Broken);
        if let Some(transport) = self.transport.as_mut() {
            transport.close();
        }
        match origin {
            Origin::Backlog => {
                self.backlog.push_front(record);
                self.write_back_backlog();
            }
            Origin::Live => self.spill(&record),
        }
    }

    /// Replace the store's content with the records not yet replayed.
    fn write_back_backlog(&mut self) {
        if !self.backlog_pending {
            return;
        }
        let pending: Vec<String> = self.backlog.drain(..).collect();
        self.backlog_pending = false;
        if let Err(err) = self.store.replace_all(&pending) {
            error!(
                "femtoship: cannot rewrite spill store: {err}; {} records lost",
                pending.len()
            );
            for _ in &pending {
                self.status.record_dropped();
            }
        }
    }

    /// One bounded reconnect per loop turn while broken, then a replay of the
    /// store ahead of the record the turn is holding.
    fn try_recover(&mut self) {
        if !self.reconnect() {
            return;
        }
        info!("femtoship: collector reachable again; replaying spill store");
        if self.replay_store() {
            self.broken = false;
            self.failures = 0;
            self.status.set_state(WorkerState::Connected);
        } else if let Some(transport) = self.transport.as_mut() {
            transport.close();
        }
    }

    /// Send every stored record in order. On failure the unsent tail is
    /// written back and `false` is returned.
    fn replay_store(&mut self) -> bool {
        let records = match self.store.drain_all(false) {
            Ok(records) => records,
            Err(err) => {
                warn!("femtoship: cannot read spill store for replay: {err}");
                return true;
            }
        };
        for (index, record) in records.iter().enumerate() {
            if self.stop.is_set() {
                self.rewrite_store(&records[index..]);
                return false;
            }
            match self.transmit(record) {
                Ok(()) => {
                    self.status.record_sent();
                    self.status.record_replayed();
                }
                Err(Failure::Format(err)) => {
                    warn!("femtoship: cannot format stored record: {err}; dropping it");
                    self.status.record_dropped();
                }
                Err(Failure::Rejected(err)) => {
                    warn!("femtoship: {err}; dropping stored record");
                    self.status.record_dropped();
                }
                Err(Failure::Io(err)) => {
                    warn!("femtoship: replay interrupted: {err}");
                    self.rewrite_store(&records[index..]);
                    return false;
                }
            }
        }
        if let Err(err) = self.store.recreate() {
            warn!("femtoship: cannot clear replayed spill store: {err}");
        }
        true
    }

    fn rewrite_store(&mut self, records: &[String]) {
        if let Err(err) = self.store.replace_all(records) {
            error!(
                "femtoship: cannot rewrite spill store: {err}; {} records lost",
                records.len()
            );
        }
    }

    fn spill(&mut self, record: &str) {
        match self.store.append(&sanitize(record)) {
            Ok(()) => self.status.record_spilled(),
            Err(err) => {
                self.status.record_dropped();
                self.warner.record_drop();
                self.warner.warn_if_due(|count| {
                    warn!("femtoship: spill store unavailable ({err}); dropped {count} records");
                });
            }
        }
    }

    /// Persist whatever could not be delivered and release resources.
    fn finish(&mut self) {
        self.write_back_backlog();
        let mut persisted = 0usize;
        while let Some(record) = self.queue.try_pop() {
            self.spill(&record);
            persisted += 1;
        }
        if persisted > 0 {
            info!("femtoship: persisted {persisted} queued records for the next run");
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.close();
        }
        self.warner.flush(|count| {
            warn!("femtoship: spill store unavailable; dropped {count} records in total");
        });
        self.status.set_state(WorkerState::Stopped);
        self.queue.notify_waiters();
    }
}
