//! Error taxonomy shared across the delivery subsystem.
//!
//! Only [`ConfigError`] and [`OverflowError`] ever reach callers of
//! [`LogClient`](crate::LogClient). [`ConnectError`] and [`StorageError`] are
//! raised and absorbed inside the transport worker; transient network
//! failures are plain [`std::io::Error`] values.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Invalid arguments supplied when constructing a client.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The endpoint token is empty or does not parse as a UUID.
    #[error("given token does not look right: {0:?}")]
    InvalidToken(String),
    /// Invalid user supplied configuration.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    /// Underlying I/O error whilst reading configuration.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The ingest queue stayed saturated even after dropping its oldest record.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("ingest queue overflow; record dropped")]
pub struct OverflowError;

/// A [`Connection`](crate::connection::Connection) cannot be instantiated.
///
/// Fatal for the transport worker: it persists queued records and stops.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("token must not be empty")]
    MissingToken,
    #[error("http transport cannot be combined with a relay target")]
    HttpWithRelay,
    #[error("relay host is mandatory when a relay is enabled")]
    MissingRelayHost,
    #[error("incorrect relay port {0}; must be between 1 and 65535")]
    InvalidRelayPort(u16),
    #[error("cannot initialise tls provider: {0}")]
    Tls(#[from] native_tls::Error),
}

/// The collector refused a record outright; resending it cannot succeed.
///
/// Travels inside the [`io::Error`] returned by a transport write so the
/// worker can drop the record instead of counting a transient failure.
#[derive(Debug, Error)]
#[error("collector rejected record with status {status}")]
pub struct RejectedRecord {
    pub status: u16,
}

impl RejectedRecord {
    pub(crate) fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, self)
    }

    /// Whether `err` carries a [`RejectedRecord`].
    pub fn is_rejection(err: &io::Error) -> bool {
        err.get_ref().is_some_and(|inner| inner.is::<Self>())
    }
}

/// Failure reading or writing the spill store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("spill store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot persist spill store {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
