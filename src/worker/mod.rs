//! Background transport worker.
//!
//! One dedicated thread per client drains the [`IngestQueue`], formats each
//! record and writes it through a [`Connection`](crate::connection::Connection).
//! Write failures escalate through a consecutive-failure counter; once the
//! threshold is reached the worker turns *broken* and diverts records to the
//! spill store until a reconnect succeeds and the store has been replayed.
//!
//! ```text
//! STARTING ──▶ CONNECTED ⇄ RECOVERING ──▶ BROKEN ──(reconnect + replay)──▶ CONNECTED
//!                    any state ──(stop)──▶ STOPPED
//! ```

mod delivery;
mod state;

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Sender, bounded};
use log::warn;

use crate::{
    connection::Connector, format::FormatOptions, identity::IdentityProvider,
    queue::IngestQueue, spill::SpillStore,
};

pub use state::{StatusSnapshot, WorkerState, WorkerStatus};

use self::delivery::TransportWorker;

/// Connection retry and escalation tunables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Connect attempts per reconnect cycle.
    pub connect_attempts: u32,
    /// Pause between two connect attempts.
    pub reconnect_delay: Duration,
    /// Consecutive write failures before the worker turns broken.
    pub failure_threshold: u32,
    /// Bounded wait when polling the ingest queue.
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            reconnect_delay: Duration::from_millis(100),
            failure_threshold: 3,
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// Everything a worker run needs, moved onto the worker thread.
pub(crate) struct WorkerParts<C, S> {
    pub connector: C,
    pub store: S,
    pub queue: Arc<IngestQueue>,
    pub identity: Arc<dyn IdentityProvider>,
    pub format: FormatOptions,
    pub policy: RetryPolicy,
    pub warn_interval: Duration,
}

/// Owner's side of a running worker.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
    status: WorkerStatus,
}

impl WorkerHandle {
    pub(crate) fn status(&self) -> &WorkerStatus {
        &self.status
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the worker to stop and wait for it to exit.
    pub(crate) fn stop(self) {
        let Self {
            stop_tx, handle, ..
        } = self;
        drop(stop_tx);
        if handle.join().is_err() {
            warn!("femtoship: transport worker panicked");
        }
    }
}

/// Start a transport worker on a dedicated thread.
///
/// # Errors
///
/// Returns an error if the operating system refuses to spawn the thread.
pub(crate) fn spawn_worker<C, S>(parts: WorkerParts<C, S>) -> io::Result<WorkerHandle>
where
    C: Connector,
    S: SpillStore + 'static,
{
    let (stop_tx, stop_rx) = bounded(1);
    let status = WorkerStatus::default();
    let worker_status = status.clone();
    let handle = thread::Builder::new()
        .name("femtoship-transport".into())
        .spawn(move || TransportWorker::new(parts, stop_rx, worker_status).run())?;
    Ok(WorkerHandle {
        stop_tx,
        handle,
        status,
    })
}
