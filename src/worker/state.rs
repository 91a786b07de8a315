//! Observable worker state and delivery counters.

use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicU64, Ordering},
};

/// Lifecycle of the transport worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkerState {
    /// No worker running yet, or connecting at startup.
    #[default]
    Starting,
    /// Records are being transmitted.
    Connected,
    /// A write failed; reconnecting before retrying the same record.
    Recovering,
    /// Transmission suspended; records go to the spill store.
    Broken,
    /// The worker has exited.
    Stopped,
}

impl WorkerState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Connected => 1,
            Self::Recovering => 2,
            Self::Broken => 3,
            Self::Stopped => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Recovering,
            3 => Self::Broken,
            4 => Self::Stopped,
            _ => Self::Starting,
        }
    }
}

/// Point-in-time view of a worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: WorkerState,
    /// Records written to the collector.
    pub sent: u64,
    /// Records appended to the spill store.
    pub spilled: u64,
    /// Records lost to storage errors or permanent rejections.
    pub dropped: u64,
    /// Records transmitted from the spill store.
    pub replayed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    state: AtomicU8,
    sent: AtomicU64,
    spilled: AtomicU64,
    dropped: AtomicU64,
    replayed: AtomicU64,
}

/// Shared handle to a worker's state, readable from any thread.
#[derive(Clone, Debug, Default)]
pub struct WorkerStatus {
    inner: Arc<Counters>,
}

impl WorkerStatus {
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.inner.state.store(state.to_u8(), Ordering::Release);
    }

    pub(crate) fn record_sent(&self) {
        self.inner.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_spilled(&self) {
        self.inner.spilled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replayed(&self) {
        self.inner.replayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state(),
            sent: self.inner.sent.load(Ordering::Relaxed),
            spilled: self.inner.spilled.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            replayed: self.inner.replayed.load(Ordering::Relaxed),
        }
    }
}
