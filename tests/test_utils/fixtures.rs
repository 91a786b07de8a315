//! Shared rstest fixtures for integration tests.

use std::{net::TcpListener, sync::Arc, time::Duration};

use femtoship::{ClientBuilder, Identity, RetryPolicy};
use rstest::fixture;
use tempfile::TempDir;

/// Endpoint token used throughout the integration tests.
pub const TOKEN: &str = "a1b2c3d4-0000-0000-0000-000000000000";

/// Listener bound to an ephemeral loopback port.
#[fixture]
pub fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

/// Temporary directory holding spill and device-id files.
#[fixture]
pub fn state_dir() -> TempDir {
    tempfile::tempdir().expect("create temp dir")
}

/// Builder with a fixed identity and short retry delays.
pub fn test_builder() -> ClientBuilder {
    ClientBuilder::new()
        .with_token(TOKEN)
        .with_identity(Arc::new(Identity::new("dev-1", "TRACE", "box")))
        .with_retry_policy(RetryPolicy {
            connect_attempts: 2,
            reconnect_delay: Duration::from_millis(5),
            failure_threshold: 3,
            poll_interval: Duration::from_millis(20),
        })
}
