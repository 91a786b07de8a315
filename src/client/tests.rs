//! Tests for the client facade.

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener},
    sync::{Arc, mpsc},
    thread,
    time::{Duration, Instant},
};

use rstest::{fixture, rstest};
use serde_json::Value;

use super::*;
use crate::{
    connection::Endpoints,
    error::ConfigError,
    identity::Identity,
    spill::{DEFAULT_SPILL_CAP, MemorySpillStore},
    worker::RetryPolicy,
};

const TOKEN: &str = "a1b2c3d4-0000-0000-0000-000000000000";

#[fixture]
fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        connect_attempts: 2,
        reconnect_delay: Duration::from_millis(5),
        failure_threshold: 3,
        poll_interval: Duration::from_millis(20),
    }
}

fn base_builder() -> ClientBuilder {
    ClientBuilder::new()
        .with_token(TOKEN)
        .with_identity(Arc::new(Identity::new("dev-1", "TRACE", "box")))
        .with_retry_policy(fast_policy())
}

/// Accept connections one after another, forwarding every received line.
fn spawn_line_server(listener: TcpListener) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    return;
                }
            }
        }
    });
    rx
}

fn recv_line(lines: &mpsc::Receiver<String>) -> String {
    lines
        .recv_timeout(Duration::from_secs(5))
        .expect("line received")
}

fn relay_client(addr: SocketAddr, store: &MemorySpillStore) -> LogClient<MemorySpillStore> {
    base_builder()
        .with_relay(addr.ip().to_string(), addr.port())
        .build_with_store(store.clone())
        .expect("valid client")
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[rstest]
#[case::missing(ClientBuilder::new())]
#[case::empty(ClientBuilder::new().with_token(""))]
#[case::not_a_uuid(ClientBuilder::new().with_token("not-a-token"))]
fn rejects_invalid_tokens(#[case] builder: ClientBuilder) {
    let err = builder.config().expect_err("token must be rejected");
    assert!(matches!(err, ConfigError::InvalidToken(_)));
}

#[rstest]
#[case::capacity(base_builder().with_queue_capacity(0), "queue_capacity")]
#[case::spill_cap(base_builder().with_spill_cap(0), "spill_cap")]
#[case::connect_timeout(base_builder().with_connect_timeout_ms(0), "connect_timeout")]
#[case::attempts(
    base_builder().with_retry_policy(RetryPolicy { connect_attempts: 0, ..RetryPolicy::default() }),
    "connect_attempts"
)]
fn rejects_zero_tunables(#[case] builder: ClientBuilder, #[case] field: &str) {
    let err = builder.config().expect_err("zero must be rejected");
    assert!(matches!(err, ConfigError::InvalidConfig(msg) if msg.contains(field)));
}

#[rstest]
fn applies_defaults() {
    let config = ClientBuilder::new()
        .with_token(TOKEN)
        .config()
        .expect("valid config");
    assert_eq!(config.queue_capacity, 32_768);
    assert_eq!(config.spill_cap, DEFAULT_SPILL_CAP);
    assert_eq!(config.retry, RetryPolicy::default());
    assert_eq!(config.connect_timeout, Duration::from_secs(5));
    assert!(config.spill_path.ends_with("femtoship/femtoship-spill.log"));
    assert!(!config.use_http && !config.use_tls && !config.use_relay);
}

#[rstest]
fn token_stream_scenario_line(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    let lines = spawn_line_server(tcp_listener);
    let store = MemorySpillStore::default();
    let client = relay_client(addr, &store);
    client.enqueue("hello").expect("queued");
    let line = recv_line(&lines);
    let rest = line
        .strip_prefix(&format!("{TOKEN} TraceID=TRACE DeviceId=dev-1 Timestamp="))
        .expect("token and identity prefix");
    let (timestamp, payload) = rest.split_once(' ').expect("timestamp then payload");
    assert!(timestamp.parse::<i64>().is_ok());
    assert_eq!(payload, "hello");
    client.close(1_000);
    assert_eq!(client.status().state, WorkerState::Stopped);
    assert_eq!(client.status().sent, 1);
}

#[rstest]
fn worker_restarts_after_close(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    let lines = spawn_line_server(tcp_listener);
    let store = MemorySpillStore::default();
    let client = base_builder()
        .with_raw_format(true)
        .with_relay(addr.ip().to_string(), addr.port())
        .build_with_store(store.clone())
        .expect("valid client");
    client.enqueue("first").expect("queued");
    assert_eq!(recv_line(&lines), format!("{TOKEN} first"));
    client.close(1_000);
    client.close(1_000);
    client.enqueue("second").expect("queued");
    assert_eq!(recv_line(&lines), format!("{TOKEN} second"));
    assert_eq!(client.status().state, WorkerState::Connected);
}

#[rstest]
fn unreachable_relay_spills_on_close(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    drop(tcp_listener);
    let store = MemorySpillStore::default();
    let client = relay_client(addr, &store);
    for i in 0..5 {
        client.enqueue(&format!("offline-{i}")).expect("queued");
    }
    client.close(0);
    let expected: Vec<String> = (0..5).map(|i| format!("offline-{i}")).collect();
    assert_eq!(store.records(), expected);
    assert!(client.status().spilled >= 1);
}

#[rstest]
fn invalid_connection_settings_persist_records() {
    let store = MemorySpillStore::default();
    let client = base_builder()
        .with_http(true)
        .with_relay("relay.local", 10_000)
        .build_with_store(store.clone())
        .expect("token is valid");
    client.enqueue("kept").expect("queued");
    assert!(wait_until(|| client.status().state == WorkerState::Stopped));
    client.enqueue("late").expect("queued");
    client.close(0);
    assert_eq!(store.records(), ["kept", "late"]);
}

fn spawn_http_server(listener: TcpListener) -> mpsc::Receiver<(String, String)> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            let mut content_length = 0usize;
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).is_err() || header.trim().is_empty() {
                    break;
                }
                if let Some((key, value)) = header.split_once(':')
                    && key.trim().eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
            let mut body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut body);
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
            let path = request_line
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_owned();
            if tx
                .send((path, String::from_utf8_lossy(&body).into_owned()))
                .is_err()
            {
                break;
            }
        }
    });
    rx
}

#[rstest]
fn http_client_posts_json_events(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    let requests = spawn_http_server(tcp_listener);
    let client = base_builder()
        .with_http(true)
        .with_hostname_tag(true)
        .with_endpoints(Endpoints::default().with_webhook_origin(format!("http://{addr}")))
        .build_with_store(MemorySpillStore::default())
        .expect("valid client");
    client.enqueue(r#"{"level":"warn"}"#).expect("queued");
    let (path, body) = requests
        .recv_timeout(Duration::from_secs(5))
        .expect("request received");
    assert_eq!(path, format!("/noformat/logs/{TOKEN}"));
    let event: Value = serde_json::from_str(&body).expect("json body");
    assert_eq!(event["event"]["Host"], "box");
    assert_eq!(event["event"]["TraceID"], "TRACE");
    assert_eq!(event["event"]["DeviceId"], "dev-1");
    assert_eq!(event["event"]["Message"]["level"], "warn");
    client.close(1_000);
}

#[rstest]
fn status_before_first_enqueue_is_starting() {
    let client = base_builder()
        .build_with_store(MemorySpillStore::default())
        .expect("valid client");
    assert_eq!(client.status(), StatusSnapshot::default());
    assert_eq!(client.queued(), 0);
    assert_eq!(client.dropped_by_queue(), 0);
    client.close(0);
}
