//! In-memory spill store.

use std::{collections::VecDeque, sync::Arc};

use log::warn;
use parking_lot::Mutex;

use super::{DEFAULT_SPILL_CAP, SpillStore};
use crate::error::StorageError;

#[derive(Debug, Default)]
struct Inner {
    records: VecDeque<String>,
    bytes: u64,
}

/// Spill store kept in process memory.
///
/// Clones share the same backing storage, so a caller can hand one clone to a
/// client and inspect the other. Records are lost when the process exits.
#[derive(Clone, Debug)]
pub struct MemorySpillStore {
    inner: Arc<Mutex<Inner>>,
    max_bytes: u64,
}

impl Default for MemorySpillStore {
    fn default() -> Self {
        Self::new(DEFAULT_SPILL_CAP)
    }
}

impl MemorySpillStore {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            max_bytes,
        }
    }

    /// Snapshot of the stored records, oldest first.
    pub fn records(&self) -> Vec<String> {
        self.inner.lock().records.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }
}

impl SpillStore for MemorySpillStore {
    fn append(&mut self, record: &str) -> Result<(), StorageError> {
        let incoming = record.len() as u64 + 1;
        let mut inner = self.inner.lock();
        if inner.bytes + incoming > self.max_bytes {
            warn!(
                "femtoship: in-memory spill store exceeds {} bytes; discarding stored records",
                self.max_bytes
            );
            inner.records.clear();
            inner.bytes = 0;
        }
        inner.records.push_back(record.to_owned());
        inner.bytes += incoming;
        Ok(())
    }

    fn drain_all(&mut self, remove_after: bool) -> Result<Vec<String>, StorageError> {
        let mut inner = self.inner.lock();
        let records = inner.records.iter().cloned().collect();
        if remove_after {
            inner.records.clear();
            inner.bytes = 0;
        }
        Ok(records)
    }

    fn recreate(&mut self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.records.clear();
        inner.bytes = 0;
        Ok(())
    }

    fn replace_all(&mut self, records: &[String]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.records = records.iter().cloned().collect();
        inner.bytes = records.iter().map(|r| r.len() as u64 + 1).sum();
        Ok(())
    }

    fn size(&self) -> u64 {
        self.inner.lock().bytes
    }
}
