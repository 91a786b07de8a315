//! Builder for [`LogClient`].
//!
//! Every setter is optional; unset values fall back to [`ClientConfig`]
//! defaults. Validation happens once, in [`ClientBuilder::build`].

use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use crate::{
    error::ConfigError,
    identity::{CachedIdentity, HostIdentityProvider, IdentityProvider},
    spill::{FileSpillStore, SpillStore},
    worker::RetryPolicy,
};

use super::{ClientConfig, LogClient};

#[cfg(any(test, feature = "test-util"))]
use crate::connection::Endpoints;

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Fluent construction of a [`LogClient`].
#[derive(Clone, Default)]
pub struct ClientBuilder {
    pub(super) token: Option<String>,
    pub(super) use_http: Option<bool>,
    pub(super) use_tls: Option<bool>,
    pub(super) use_relay: Option<bool>,
    pub(super) relay_host: Option<String>,
    pub(super) relay_port: Option<u16>,
    pub(super) tag_hostname: Option<bool>,
    pub(super) send_raw_format: Option<bool>,
    pub(super) queue_capacity: Option<usize>,
    pub(super) spill_path: Option<PathBuf>,
    pub(super) spill_cap: Option<u64>,
    pub(super) device_id_path: Option<PathBuf>,
    pub(super) connect_timeout_ms: Option<u64>,
    pub(super) write_timeout_ms: Option<u64>,
    pub(super) warn_interval_ms: Option<u64>,
    pub(super) retry: Option<RetryPolicy>,
    identity: Option<Arc<dyn IdentityProvider>>,
    #[cfg(any(test, feature = "test-util"))]
    endpoints: Option<Endpoints>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("use_http", &self.use_http)
            .field("use_tls", &self.use_tls)
            .field("use_relay", &self.use_relay)
            .field("relay_host", &self.relay_host)
            .field("relay_port", &self.relay_port)
            .field("queue_capacity", &self.queue_capacity)
            .field("spill_path", &self.spill_path)
            .field("custom_identity", &self.identity.is_some())
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint token. Must parse as a UUID.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Route records to a relay instead of the collector endpoint.
    pub fn with_relay(mut self, host: impl Into<String>, port: u16) -> Self {
        self.use_relay = Some(true);
        self.relay_host = Some(host.into());
        self.relay_port = Some(port);
        self
    }

    option_setter!(
        #[doc = "Deliver records as HTTP POSTs to the webhook endpoint."]
        with_http,
        use_http,
        bool
    );
    option_setter!(
        #[doc = "Encrypt the token stream (or use HTTPS for the webhook)."]
        with_tls,
        use_tls,
        bool
    );
    option_setter!(with_hostname_tag, tag_hostname, bool);
    option_setter!(
        #[doc = "Send payloads without identity metadata."]
        with_raw_format,
        send_raw_format,
        bool
    );
    option_setter!(
        #[doc = "Set the ingest queue capacity."]
        with_queue_capacity,
        queue_capacity,
        usize
    );
    option_setter!(with_spill_path, spill_path, PathBuf);
    option_setter!(
        #[doc = "Cap the spill file at this many bytes."]
        with_spill_cap,
        spill_cap,
        u64
    );
    option_setter!(with_device_id_path, device_id_path, PathBuf);
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_write_timeout_ms, write_timeout_ms, u64);
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);
    option_setter!(with_retry_policy, retry, RetryPolicy);

    /// Replace the host identity provider. The provider is consulted once and
    /// its answer cached for the client's lifetime.
    pub fn with_identity(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// Point the client at local collector doubles.
    #[cfg(any(test, feature = "test-util"))]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Resolve defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the token is not a UUID or a tunable is
    /// out of range.
    pub fn config(&self) -> Result<ClientConfig, ConfigError> {
        let defaults = ClientConfig::default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };
        let config = ClientConfig {
            token: self
                .token
                .clone()
                .ok_or_else(|| ConfigError::InvalidToken(String::new()))?,
            use_http: self.use_http.unwrap_or(defaults.use_http),
            use_tls: self.use_tls.unwrap_or(defaults.use_tls),
            use_relay: self.use_relay.unwrap_or(defaults.use_relay),
            relay_host: self.relay_host.clone().unwrap_or(defaults.relay_host),
            relay_port: self.relay_port.unwrap_or(defaults.relay_port),
            tag_hostname: self.tag_hostname.unwrap_or(defaults.tag_hostname),
            send_raw_format: self.send_raw_format.unwrap_or(defaults.send_raw_format),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            spill_path: self.spill_path.clone().unwrap_or(defaults.spill_path),
            spill_cap: self.spill_cap.unwrap_or(defaults.spill_cap),
            device_id_path: self
                .device_id_path
                .clone()
                .unwrap_or(defaults.device_id_path),
            connect_timeout: millis(self.connect_timeout_ms, defaults.connect_timeout),
            write_timeout: millis(self.write_timeout_ms, defaults.write_timeout),
            retry: self.retry.clone().unwrap_or(defaults.retry),
            warn_interval: millis(self.warn_interval_ms, defaults.warn_interval),
            #[cfg(any(test, feature = "test-util"))]
            endpoints: self.endpoints.clone().unwrap_or(defaults.endpoints),
            #[cfg(not(any(test, feature = "test-util")))]
            endpoints: defaults.endpoints,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build a client spilling to a file.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::config`].
    pub fn build(self) -> Result<LogClient, ConfigError> {
        let config = self.config()?;
        let store = FileSpillStore::new(config.spill_path.clone(), config.spill_cap);
        Ok(self.finish(config, store))
    }

    /// Build a client spilling to a caller-supplied store.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::config`].
    pub fn build_with_store<S>(self, store: S) -> Result<LogClient<S>, ConfigError>
    where
        S: SpillStore + Clone + 'static,
    {
        let config = self.config()?;
        Ok(self.finish(config, store))
    }

    fn finish<S>(self, config: ClientConfig, store: S) -> LogClient<S>
    where
        S: SpillStore + Clone + 'static,
    {
        let provider: Arc<dyn IdentityProvider> = match self.identity {
            Some(provider) => Arc::new(CachedIdentity::new(provider)),
            None => Arc::new(CachedIdentity::new(HostIdentityProvider::new(
                config.device_id_path.clone(),
            ))),
        };
        LogClient::from_parts(config, store, provider)
    }
}
