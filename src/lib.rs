//! Embeddable log-shipping client.
//!
//! Applications hand text records to a [`LogClient`]; a background transport
//! worker delivers them to a remote collector over a token-stream socket, TLS
//! or HTTP. Records that cannot be delivered are spilled to a durable store
//! and replayed, in order, once the collector is reachable again.
//!
//! ```no_run
//! use femtoship::LogClient;
//!
//! let client = LogClient::builder()
//!     .with_token("a1b2c3d4-0000-0000-0000-000000000000")
//!     .with_tls(true)
//!     .build()?;
//! client.enqueue("service started")?;
//! client.close(2_000);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod format;
pub mod identity;
pub mod queue;
pub mod rate_limited_warner;
pub mod record;
pub mod spill;
pub mod worker;

pub use client::{ClientBuilder, ClientConfig, LogClient};
pub use connection::{Connection, ConnectionSettings, Connector, Transport, TransportMode};
pub use error::{ConfigError, ConnectError, OverflowError, RejectedRecord, StorageError};
pub use format::{FormatOptions, WireFormatter};
pub use identity::{CachedIdentity, HostIdentityProvider, Identity, IdentityProvider};
pub use queue::{DEFAULT_QUEUE_CAPACITY, IngestQueue};
pub use rate_limited_warner::RateLimitedWarner;
pub use record::{LINE_SEPARATOR, MAX_RECORD_LEN};
pub use spill::{FileSpillStore, MemorySpillStore, SpillStore};
pub use worker::{RetryPolicy, StatusSnapshot, WorkerState};
