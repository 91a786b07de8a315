//! Webhook transport: one POST per record.

use std::{fmt, io, sync::Arc};

use native_tls::TlsConnector;
use ureq::{Agent, AgentBuilder};

use super::ConnectionSettings;
use crate::error::{ConnectError, RejectedRecord};

/// Classification of an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx responses.
    Success,
    /// 5xx and 429; counted as a transient failure.
    Retryable,
    /// Other 4xx; retrying cannot succeed, reported as a [`RejectedRecord`].
    Permanent,
}

/// Classify an HTTP status code.
///
/// * **2xx** → [`ResponseClass::Success`]
/// * **429** and **5xx** → [`ResponseClass::Retryable`]
/// * anything else → [`ResponseClass::Permanent`]
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        429 => ResponseClass::Retryable,
        500..=599 => ResponseClass::Retryable,
        _ => ResponseClass::Permanent,
    }
}

/// Stateless session posting each record to the webhook URL.
pub struct HttpConnection {
    agent: Agent,
    url: String,
    content_type: &'static str,
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("url", &self.url)
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl HttpConnection {
    pub(super) fn new(settings: &ConnectionSettings) -> Result<Self, ConnectError> {
        let mut builder = AgentBuilder::new()
            .timeout_connect(settings.connect_timeout)
            .timeout(settings.write_timeout);
        if settings.use_tls {
            builder = builder.tls_connector(Arc::new(TlsConnector::new()?));
        }
        let agent = builder.build();
        let url = settings
            .endpoints
            .webhook_url(&settings.token, settings.use_tls);
        let content_type = if settings.raw_format {
            "text/plain; charset=utf-8"
        } else {
            "application/json"
        };
        Ok(Self {
            agent,
            url,
            content_type,
        })
    }

    #[cfg(test)]
    pub(super) fn url(&self) -> &str {
        &self.url
    }

    pub(super) fn post(&self, body: &str) -> io::Result<()> {
        let status = match self
            .agent
            .post(&self.url)
            .set("Content-Type", self.content_type)
            .send_string(body)
        {
            Ok(response) => response.status(),
            Err(ureq::Error::Status(code, _)) => code,
            Err(ureq::Error::Transport(err)) => {
                return Err(io::Error::new(io::ErrorKind::ConnectionAborted, err.to_string()));
            }
        };
        match classify_status(status) {
            ResponseClass::Success => Ok(()),
            ResponseClass::Retryable => Err(io::Error::other(format!(
                "collector returned retryable status {status}"
            ))),
            ResponseClass::Permanent => Err(RejectedRecord { status }.into_io()),
        }
    }
}
