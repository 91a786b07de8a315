//! Durable backlog for records that could not be delivered.
//!
//! The transport worker appends to the spill store when the collector is
//! unreachable and replays the store, oldest first, once connectivity returns.
//! Only the worker thread touches a store, so implementations take `&mut self`
//! and need no internal locking.

mod file;
mod memory;

use std::path::PathBuf;

use crate::error::StorageError;

pub use file::FileSpillStore;
pub use memory::MemorySpillStore;

/// Default upper bound on the size of the spill store.
pub const DEFAULT_SPILL_CAP: u64 = 10 * 1024 * 1024;

/// Default spill file name inside the temporary directory.
pub const DEFAULT_SPILL_FILE: &str = "femtoship-spill.log";

/// Default location of the spill file: `<temp>/femtoship/femtoship-spill.log`.
pub fn default_spill_path() -> PathBuf {
    std::env::temp_dir()
        .join("femtoship")
        .join(DEFAULT_SPILL_FILE)
}

/// Append-only line store replayed in insertion order.
pub trait SpillStore: Send {
    /// Append one record.
    ///
    /// When the append would push the store past its cap, the store is
    /// truncated first so the newest record is kept.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be written.
    fn append(&mut self, record: &str) -> Result<(), StorageError>;

    /// Read every stored record in insertion order, optionally removing the
    /// backing storage afterwards. A missing store yields no records.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store exists but cannot be read or
    /// removed.
    fn drain_all(&mut self, remove_after: bool) -> Result<Vec<String>, StorageError>;

    /// Truncate the store to empty.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be rewritten.
    fn recreate(&mut self) -> Result<(), StorageError>;

    /// Replace the whole content with `records`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be rewritten.
    fn replace_all(&mut self, records: &[String]) -> Result<(), StorageError> {
        self.recreate()?;
        for record in records {
            self.append(record)?;
        }
        Ok(())
    }

    /// Current size in bytes.
    fn size(&self) -> u64;
}

#[cfg(test)]
mod tests;
