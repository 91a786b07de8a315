//! Collector endpoint addressing.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Domain hosting the data and webhook endpoints.
pub const DEFAULT_COLLECTOR_DOMAIN: &str = "logentries.com";
/// Port of the plain token-stream endpoint.
pub const DEFAULT_STREAM_PORT: u16 = 80;
/// Port of the TLS token-stream endpoint.
pub const DEFAULT_TLS_PORT: u16 = 443;

/// Characters escaped when the token is placed in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Collector addresses.
///
/// Production code always uses [`Endpoints::default`]; tests can point the
/// client at a local server through the builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub collector_domain: String,
    pub stream_port: u16,
    pub tls_port: u16,
    /// Replaces `{scheme}://webhook.<domain>` when set.
    pub webhook_origin: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            collector_domain: DEFAULT_COLLECTOR_DOMAIN.to_owned(),
            stream_port: DEFAULT_STREAM_PORT,
            tls_port: DEFAULT_TLS_PORT,
            webhook_origin: None,
        }
    }
}

impl Endpoints {
    /// Point the webhook at `origin` (e.g. `http://127.0.0.1:8080`).
    pub fn with_webhook_origin(mut self, origin: impl Into<String>) -> Self {
        self.webhook_origin = Some(origin.into());
        self
    }

    pub fn stream_host(&self) -> String {
        format!("data.{}", self.collector_domain)
    }

    pub fn stream_port(&self, tls: bool) -> u16 {
        if tls { self.tls_port } else { self.stream_port }
    }

    /// Webhook URL for `token`.
    pub fn webhook_url(&self, token: &str, tls: bool) -> String {
        let origin = self.webhook_origin.clone().unwrap_or_else(|| {
            let scheme = if tls { "https" } else { "http" };
            format!("{scheme}://webhook.{}", self.collector_domain)
        });
        let token = utf8_percent_encode(token, PATH_SEGMENT);
        format!("{}/noformat/logs/{token}", origin.trim_end_matches('/'))
    }
}
