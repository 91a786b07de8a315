//! Resolved client configuration.

use std::{path::PathBuf, time::Duration};

use uuid::Uuid;

use crate::{
    connection::{
        ConnectionSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT, Endpoints, Relay,
    },
    error::ConfigError,
    format::FormatOptions,
    queue::DEFAULT_QUEUE_CAPACITY,
    rate_limited_warner::DEFAULT_WARN_INTERVAL,
    spill::{DEFAULT_SPILL_CAP, default_spill_path},
    worker::RetryPolicy,
};

/// Default file name of the persisted device id.
pub const DEFAULT_DEVICE_ID_FILE: &str = "femtoship-device-id";

/// Default location of the device id: `<temp>/femtoship/femtoship-device-id`.
pub fn default_device_id_path() -> PathBuf {
    std::env::temp_dir()
        .join("femtoship")
        .join(DEFAULT_DEVICE_ID_FILE)
}

/// Every knob a [`LogClient`](super::LogClient) understands.
///
/// Usually produced by [`ClientBuilder`](super::ClientBuilder), which applies
/// defaults and validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Endpoint token; must parse as a UUID.
    pub token: String,
    pub use_http: bool,
    pub use_tls: bool,
    pub use_relay: bool,
    pub relay_host: String,
    pub relay_port: u16,
    /// Add the host name to every record.
    pub tag_hostname: bool,
    /// Send payloads without metadata.
    pub send_raw_format: bool,
    pub queue_capacity: usize,
    pub spill_path: PathBuf,
    pub spill_cap: u64,
    pub device_id_path: PathBuf,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub retry: RetryPolicy,
    /// Minimum spacing between two drop warnings.
    pub warn_interval: Duration,
    pub(crate) endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            use_http: false,
            use_tls: false,
            use_relay: false,
            relay_host: String::new(),
            relay_port: 0,
            tag_hostname: false,
            send_raw_format: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            spill_path: default_spill_path(),
            spill_cap: DEFAULT_SPILL_CAP,
            device_id_path: default_device_id_path(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            retry: RetryPolicy::default(),
            warn_interval: DEFAULT_WARN_INTERVAL,
            endpoints: Endpoints::default(),
        }
    }
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ConfigError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

impl ClientConfig {
    /// Check the arguments a client can be constructed from.
    ///
    /// Connection-level combinations (relay with HTTP, a missing relay host)
    /// are checked when the transport worker opens its connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidToken`] if the token is not a UUID and
    /// [`ConfigError::InvalidConfig`] for out-of-range tunables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Uuid::parse_str(self.token.trim()).is_err() {
            return Err(ConfigError::InvalidToken(self.token.clone()));
        }
        ensure_positive!(self.queue_capacity, "queue_capacity")?;
        ensure_positive!(self.spill_cap, "spill_cap")?;
        ensure_positive!(self.retry.connect_attempts, "connect_attempts")?;
        ensure_positive!(self.retry.failure_threshold, "failure_threshold")?;
        ensure_positive!(self.retry.poll_interval.as_millis(), "poll_interval")?;
        ensure_positive!(self.connect_timeout.as_millis(), "connect_timeout")?;
        ensure_positive!(self.write_timeout.as_millis(), "write_timeout")?;
        if self.spill_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "spill_path must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            token: self.token.trim().to_owned(),
            use_http: self.use_http,
            use_tls: self.use_tls,
            relay: self.use_relay.then(|| Relay {
                host: self.relay_host.clone(),
                port: self.relay_port,
            }),
            raw_format: self.send_raw_format,
            connect_timeout: self.connect_timeout,
            write_timeout: self.write_timeout,
            endpoints: self.endpoints.clone(),
        }
    }

    pub(crate) fn format_options(&self) -> FormatOptions {
        FormatOptions {
            tag_hostname: self.tag_hostname,
            json: self.use_http,
            raw: self.send_raw_format,
        }
    }
}
