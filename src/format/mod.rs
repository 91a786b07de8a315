//! Wire formatting for outgoing records.
//!
//! Two representations are produced:
//!
//! - **Stream** (token-stream and TLS transports): a single line of
//!   space-separated `key=value` metadata followed by the payload, e.g.
//!   `TraceID=… DeviceId=… Timestamp=… payload\n`.
//! - **JSON** (HTTP transport): a self-contained `{"event": {…}}` document.
//!   Payloads that are themselves JSON objects or arrays are embedded as
//!   nested values; anything else becomes an escaped string.
//!
//! Raw mode bypasses both and emits the sanitised payload unchanged.

mod clock;

use serde::Serialize;
use serde_json::Value;

use crate::{
    identity::Identity,
    record::{restore_newlines, sanitize},
};

pub use clock::MonotonicClock;

/// Formatting switches derived from the client configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Prepend a `Host` field.
    pub tag_hostname: bool,
    /// Produce the JSON event form used by the HTTP transport.
    pub json: bool,
    /// Send the payload without metadata.
    pub raw: bool,
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: Event<'a>,
}

#[derive(Serialize)]
struct Event<'a> {
    #[serde(rename = "Host", skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    #[serde(rename = "TraceID")]
    trace_id: &'a str,
    #[serde(rename = "DeviceId")]
    device_id: &'a str,
    #[serde(rename = "Timestamp")]
    timestamp: i64,
    #[serde(rename = "Message")]
    message: Message<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Message<'a> {
    Json(Value),
    Text(&'a str),
}

/// Turns sanitised records into wire lines.
///
/// Owned by the transport worker; identity is resolved once when the worker
/// starts so the hot path never touches the identity provider.
#[derive(Debug)]
pub struct WireFormatter {
    identity: Identity,
    options: FormatOptions,
    clock: MonotonicClock,
}

impl WireFormatter {
    pub fn new(identity: Identity, options: FormatOptions) -> Self {
        Self {
            identity,
            options,
            clock: MonotonicClock::default(),
        }
    }

    pub fn options(&self) -> FormatOptions {
        self.options
    }

    /// Format `record` using the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialisation fails.
    pub fn format(&self, record: &str) -> serde_json::Result<String> {
        self.format_at(record, self.clock.now_millis())
    }

    /// Format `record` with an explicit timestamp (milliseconds since epoch).
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialisation fails.
    pub fn format_at(&self, record: &str, timestamp: i64) -> serde_json::Result<String> {
        let payload = sanitize(record);
        if self.options.raw {
            return Ok(if self.options.json {
                payload.into_owned()
            } else {
                format!("{payload}\n")
            });
        }
        if self.options.json {
            self.format_json(&payload, timestamp)
        } else {
            Ok(self.format_stream(&payload, timestamp))
        }
    }

    fn format_stream(&self, payload: &str, timestamp: i64) -> String {
        let Identity {
            device_id,
            trace_id,
            hostname,
        } = &self.identity;
        let mut line = String::with_capacity(payload.len() + 128);
        if self.options.tag_hostname {
            line.push_str("Host=");
            line.push_str(hostname);
            line.push(' ');
        }
        line.push_str(&format!(
            "TraceID={trace_id} DeviceId={device_id} Timestamp={timestamp} "
        ));
        line.push_str(payload);
        line.push('\n');
        line
    }

    fn format_json(&self, payload: &str, timestamp: i64) -> serde_json::Result<String> {
        let message = match embedded_json(payload) {
            Some(value) => Message::Json(value),
            None => Message::Text(payload),
        };
        let envelope = Envelope {
            event: Event {
                host: self
                    .options
                    .tag_hostname
                    .then_some(self.identity.hostname.as_str()),
                trace_id: &self.identity.trace_id,
                device_id: &self.identity.device_id,
                timestamp,
                message,
            },
        };
        serde_json::to_string(&envelope)
    }
}

/// Parse `payload` as a JSON object or array.
///
/// Newlines were replaced by the separator during sanitisation, which is not
/// JSON whitespace, so they are restored before parsing. Re-serialisation
/// emits compact JSON, keeping the event on one line.
fn embedded_json(payload: &str) -> Option<Value> {
    let candidate = restore_newlines(payload);
    match serde_json::from_str::<Value>(&candidate) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}
