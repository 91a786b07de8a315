//! INI configuration for [`ClientBuilder`].
//!
//! Settings live in a `[client]` section:
//!
//! ```ini
//! [client]
//! token = a1b2c3d4-0000-0000-0000-000000000000
//! use_tls = yes
//! spill_path = /var/lib/myapp/spill.log
//! ```
//!
//! Files are decoded with `encoding_rs`, so any WHATWG encoding label
//! (`utf-8`, `windows-1252`, `shift_jis`, ...) is accepted.

use std::{fs, io::ErrorKind, path::Path, time::Duration};

use encoding_rs::Encoding;
use ini::Ini;

use crate::{error::ConfigError, worker::RetryPolicy};

use super::ClientBuilder;

const SECTION: &str = "client";
const DEFAULT_ENCODING: &str = "utf-8";

impl ClientBuilder {
    /// Load builder settings from the `[client]` section of an INI file.
    ///
    /// `encoding` is a WHATWG label and defaults to UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::InvalidConfig`] for decoding, syntax or value errors.
    pub fn from_ini_file(
        path: impl AsRef<Path>,
        encoding: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ConfigError::InvalidConfig(format!(
                "{} doesn't exist",
                path.display()
            )),
            _ => ConfigError::Io(err),
        })?;
        let text = decode_with_encoding(&bytes, encoding.unwrap_or(DEFAULT_ENCODING))?;
        Self::from_ini_str(&text)
    }

    /// Parse builder settings from INI text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] for syntax errors, a missing
    /// `[client]` section, unknown keys or unparsable values.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)
            .map_err(|err| ConfigError::InvalidConfig(format!("invalid ini: {err}")))?;
        let section = ini.section(Some(SECTION)).ok_or_else(|| {
            ConfigError::InvalidConfig(format!("missing [{SECTION}] section"))
        })?;
        let mut builder = Self::new();
        let mut retry = RetryPolicy::default();
        let mut retry_overridden = false;
        for (key, value) in section.iter() {
            let value = value.trim();
            match key.trim() {
                "token" => builder.token = Some(value.to_owned()),
                "use_http" => builder.use_http = Some(parse_bool(key, value)?),
                "use_tls" => builder.use_tls = Some(parse_bool(key, value)?),
                "use_relay" => builder.use_relay = Some(parse_bool(key, value)?),
                "relay_host" => builder.relay_host = Some(value.to_owned()),
                "relay_port" => builder.relay_port = Some(parse_number(key, value)?),
                "tag_hostname" => builder.tag_hostname = Some(parse_bool(key, value)?),
                "send_raw_format" => builder.send_raw_format = Some(parse_bool(key, value)?),
                "queue_capacity" => builder.queue_capacity = Some(parse_number(key, value)?),
                "spill_path" => builder.spill_path = Some(value.into()),
                "spill_cap" => builder.spill_cap = Some(parse_number(key, value)?),
                "device_id_path" => builder.device_id_path = Some(value.into()),
                "connect_timeout_ms" => {
                    builder.connect_timeout_ms = Some(parse_number(key, value)?);
                }
                "write_timeout_ms" => builder.write_timeout_ms = Some(parse_number(key, value)?),
                "warn_interval_ms" => builder.warn_interval_ms = Some(parse_number(key, value)?),
                "connect_attempts" => {
                    retry.connect_attempts = parse_number(key, value)?;
                    retry_overridden = true;
                }
                "reconnect_delay_ms" => {
                    retry.reconnect_delay = Duration::from_millis(parse_number(key, value)?);
                    retry_overridden = true;
                }
                "failure_threshold" => {
                    retry.failure_threshold = parse_number(key, value)?;
                    retry_overridden = true;
                }
                "poll_interval_ms" => {
                    retry.poll_interval = Duration::from_millis(parse_number(key, value)?);
                    retry_overridden = true;
                }
                other => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "unknown key {other:?} in [{SECTION}]"
                    )));
                }
            }
        }
        if retry_overridden {
            builder.retry = Some(retry);
        }
        Ok(builder)
    }
}

fn decode_with_encoding(bytes: &[u8], label: &str) -> Result<String, ConfigError> {
    let normalized_label = label.trim().to_ascii_lowercase();
    let encoding = Encoding::for_label(normalized_label.as_bytes())
        .ok_or_else(|| ConfigError::InvalidConfig(format!("unknown encoding {label}")))?;
    let (decoded, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ConfigError::InvalidConfig(format!(
            "configuration is not valid {}",
            encoding.name()
        )));
    }
    Ok(decoded.into_owned())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidConfig(format!(
            "{key} expects a boolean, got {value:?}"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| {
        ConfigError::InvalidConfig(format!("{key} expects a non-negative integer, got {value:?}"))
    })
}
