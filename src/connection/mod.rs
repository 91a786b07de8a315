//! Network sessions to the log collector.
//!
//! A [`Connection`] hides the three delivery transports behind one
//! connect/write/close contract:
//!
//! - **token stream**: plain TCP, every line prefixed with the endpoint token;
//! - **TLS**: the same framing over a TLS session with Nagle disabled;
//! - **HTTP**: each write is an independent POST to a per-token webhook URL.
//!
//! [`ConnectionSettings`] validates its inputs when the transport worker
//! instantiates a connection; invalid combinations surface as
//! [`ConnectError`].

mod endpoint;
mod http;
mod stream;

use std::{io, time::Duration};

use crate::error::ConnectError;

pub use endpoint::{DEFAULT_COLLECTOR_DOMAIN, DEFAULT_STREAM_PORT, DEFAULT_TLS_PORT, Endpoints};
pub use http::{HttpConnection, ResponseClass, classify_status};
pub use stream::StreamConnection;

/// Default timeout for TCP connects and TLS handshakes.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout for a single socket write or HTTP request.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session with a log collector as seen by the transport worker.
pub trait Transport: Send {
    /// Open the session, closing any previous one first.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the collector cannot be reached.
    fn connect(&mut self) -> io::Result<()>;

    /// Transmit one formatted record.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on transient failure; the session must be
    /// reconnected before the next write. A record the collector refuses
    /// outright is reported as an I/O error carrying
    /// [`RejectedRecord`](crate::error::RejectedRecord).
    fn write(&mut self, formatted: &str) -> io::Result<()>;

    /// Release the session. Idempotent.
    fn close(&mut self);
}

/// Factory producing a [`Transport`] for a worker run.
pub trait Connector: Send + 'static {
    type Transport: Transport;

    /// Validate settings and build an unconnected transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when the settings cannot produce a session.
    fn instantiate(&self) -> Result<Self::Transport, ConnectError>;
}

/// Transport selected by the client configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportMode {
    TokenStream,
    Tls,
    Http,
}

/// Alternate stream target substituted for the collector endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Relay {
    pub host: String,
    pub port: u16,
}

/// Everything needed to open a [`Connection`].
#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    pub token: String,
    pub use_http: bool,
    pub use_tls: bool,
    pub relay: Option<Relay>,
    /// Send bodies as plain text rather than JSON over HTTP.
    pub raw_format: bool,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub endpoints: Endpoints,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            use_http: false,
            use_tls: false,
            relay: None,
            raw_format: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            endpoints: Endpoints::default(),
        }
    }
}

impl ConnectionSettings {
    pub fn mode(&self) -> TransportMode {
        match (self.use_http, self.use_tls) {
            (true, _) => TransportMode::Http,
            (false, true) => TransportMode::Tls,
            (false, false) => TransportMode::TokenStream,
        }
    }

    fn validate(&self) -> Result<(), ConnectError> {
        if self.token.trim().is_empty() {
            return Err(ConnectError::MissingToken);
        }
        let Some(relay) = &self.relay else {
            return Ok(());
        };
        if self.use_http {
            return Err(ConnectError::HttpWithRelay);
        }
        if relay.host.trim().is_empty() {
            return Err(ConnectError::MissingRelayHost);
        }
        if relay.port == 0 {
            return Err(ConnectError::InvalidRelayPort(relay.port));
        }
        Ok(())
    }
}

impl Connector for ConnectionSettings {
    type Transport = Connection;

    fn instantiate(&self) -> Result<Connection, ConnectError> {
        Connection::new(self)
    }
}

/// A session in one of the supported transport modes.
#[derive(Debug)]
pub enum Connection {
    Stream(StreamConnection),
    Http(HttpConnection),
}

impl Connection {
    /// Build an unconnected session from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] for invalid settings or when the TLS provider
    /// cannot be initialised.
    pub fn new(settings: &ConnectionSettings) -> Result<Self, ConnectError> {
        settings.validate()?;
        match settings.mode() {
            TransportMode::Http => Ok(Self::Http(HttpConnection::new(settings)?)),
            TransportMode::Tls | TransportMode::TokenStream => {
                Ok(Self::Stream(StreamConnection::new(settings)?))
            }
        }
    }

    pub fn mode(&self) -> TransportMode {
        match self {
            Self::Stream(stream) if stream.is_tls() => TransportMode::Tls,
            Self::Stream(_) => TransportMode::TokenStream,
            Self::Http(_) => TransportMode::Http,
        }
    }

    /// Whether a stream session is currently open. Always true for HTTP.
    pub fn is_connected(&self) -> bool {
        match self {
            Self::Stream(stream) => stream.is_connected(),
            Self::Http(_) => true,
        }
    }
}

impl Transport for Connection {
    fn connect(&mut self) -> io::Result<()> {
        match self {
            Self::Stream(stream) => stream.connect(),
            Self::Http(_) => Ok(()),
        }
    }

    fn write(&mut self, formatted: &str) -> io::Result<()> {
        match self {
            Self::Stream(stream) => stream.write(formatted),
            Self::Http(http) => http.post(formatted),
        }
    }

    fn close(&mut self) {
        if let Self::Stream(stream) = self {
            stream.close();
        }
    }
}
