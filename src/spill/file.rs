//! Spill store backed by a single newline-delimited file.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use log::warn;
use tempfile::NamedTempFile;

use super::{DEFAULT_SPILL_CAP, SpillStore, default_spill_path};
use crate::error::StorageError;

/// Newline-delimited spill file with a size cap.
///
/// Each record occupies one line; records are sanitised before they reach the
/// store so they never contain a raw `\n`. Rewrites go through a temporary
/// file in the same directory and an atomic rename.
#[derive(Clone, Debug)]
pub struct FileSpillStore {
    path: PathBuf,
    max_bytes: u64,
}

impl Default for FileSpillStore {
    fn default() -> Self {
        Self::new(default_spill_path(), DEFAULT_SPILL_CAP)
    }
}

impl FileSpillStore {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn ensure_parent(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.parent_dir()).map_err(|e| StorageError::io(&self.path, e))
    }

    fn write_atomically(&self, records: &[String]) -> Result<(), StorageError> {
        self.ensure_parent()?;
        let mut tmp =
            NamedTempFile::new_in(self.parent_dir()).map_err(|e| StorageError::io(&self.path, e))?;
        for record in records {
            writeln!(tmp, "{record}").map_err(|e| StorageError::io(&self.path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| StorageError::io(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::Persist {
                path: self.path.clone(),
                source: e.error,
            })?;
        Ok(())
    }
}

impl SpillStore for FileSpillStore {
    fn append(&mut self, record: &str) -> Result<(), StorageError> {
        let incoming = record.len() as u64 + 1;
        if self.size() + incoming > self.max_bytes {
            warn!(
                "femtoship: spill store {} exceeds {} bytes; discarding stored records",
                self.path.display(),
                self.max_bytes
            );
            self.recreate()?;
        } else {
            self.ensure_parent()?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.write_all(format!("{record}\n").as_bytes())
            .map_err(|e| StorageError::io(&self.path, e))
    }

    fn drain_all(&mut self, remove_after: bool) -> Result<Vec<String>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        let text = String::from_utf8_lossy(&bytes);
        // Empty records are legitimate; only the piece after the last terminator is dropped.
        let records = if text.is_empty() {
            Vec::new()
        } else {
            let body = text.strip_suffix('\n').unwrap_or(&*text);
            body.split('\n').map(str::to_owned).collect()
        };
        if remove_after {
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(&self.path, e)),
            }
        }
        Ok(records)
    }

    fn recreate(&mut self) -> Result<(), StorageError> {
        self.write_atomically(&[])
    }

    fn replace_all(&mut self, records: &[String]) -> Result<(), StorageError> {
        self.write_atomically(records)
    }

    fn size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}
