//! Token-stream transport over plain TCP or TLS.

use std::{
    fmt,
    io::{self, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::debug;
use native_tls::{TlsConnector, TlsStream};

use super::ConnectionSettings;
use crate::error::ConnectError;

/// Open socket, plain or encrypted.
enum ActiveStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ActiveStream {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(buf),
            Self::Tls(stream) => stream.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.flush(),
            Self::Tls(stream) => stream.flush(),
        }
    }

    fn shutdown(&mut self) {
        match self {
            Self::Plain(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            Self::Tls(stream) => {
                let _ = stream.shutdown();
            }
        }
    }
}

/// Line-oriented session prefixing every record with the endpoint token.
pub struct StreamConnection {
    host: String,
    port: u16,
    token: String,
    tls: Option<TlsConnector>,
    connect_timeout: Duration,
    write_timeout: Duration,
    active: Option<ActiveStream>,
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls.is_some())
            .field("connected", &self.active.is_some())
            .finish()
    }
}

impl StreamConnection {
    pub(super) fn new(settings: &ConnectionSettings) -> Result<Self, ConnectError> {
        let (host, port) = match &settings.relay {
            Some(relay) => (relay.host.clone(), relay.port),
            None => (
                settings.endpoints.stream_host(),
                settings.endpoints.stream_port(settings.use_tls),
            ),
        };
        let tls = if settings.use_tls {
            Some(TlsConnector::new()?)
        } else {
            None
        };
        Ok(Self {
            host,
            port,
            token: settings.token.clone(),
            tls,
            connect_timeout: settings.connect_timeout,
            write_timeout: settings.write_timeout,
            active: None,
        })
    }

    pub(super) fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub(super) fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub(super) fn connect(&mut self) -> io::Result<()> {
        self.close();
        let stream = connect_tcp(&self.host, self.port, self.connect_timeout)?;
        let active = match &self.tls {
            Some(connector) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(Some(self.connect_timeout))?;
                stream.set_write_timeout(Some(self.connect_timeout))?;
                let stream = connector
                    .connect(&self.host, stream)
                    .map_err(io::Error::other)?;
                let tcp = stream.get_ref();
                tcp.set_read_timeout(None)?;
                tcp.set_write_timeout(Some(self.write_timeout))?;
                ActiveStream::Tls(Box::new(stream))
            }
            None => {
                stream.set_write_timeout(Some(self.write_timeout))?;
                ActiveStream::Plain(stream)
            }
        };
        debug!("femtoship: connected to {}:{}", self.host, self.port);
        self.active = Some(active);
        Ok(())
    }

    pub(super) fn write(&mut self, formatted: &str) -> io::Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream connection is not open",
            ));
        };
        let frame = frame_line(&self.token, formatted);
        let result = active
            .write_all(frame.as_bytes())
            .and_then(|()| active.flush());
        if result.is_err() {
            self.close();
        }
        result
    }

    pub(super) fn close(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.shutdown();
        }
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// `token + " " + line`, terminated by exactly one newline.
pub(super) fn frame_line(token: &str, formatted: &str) -> String {
    let body = formatted.trim_end_matches('\n');
    let mut frame = String::with_capacity(token.len() + body.len() + 2);
    frame.push_str(token);
    frame.push(' ');
    frame.push_str(body);
    frame.push('\n');
    frame
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no addresses resolved for {host}:{port}"),
        )
    }))
}
