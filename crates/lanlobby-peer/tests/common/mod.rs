//! Shared helpers for the loopback integration tests.
//!
//! Every socket binds `127.0.0.1` on an ephemeral port, and "broadcasts" are
//! sent unicast to a loopback scanner, so tests can run in parallel and need
//! no real LAN.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use lanlobby_peer::infrastructure::network::{AdvertiserConfig, ScannerConfig, SessionConfig};

/// Advertisement interval used throughout the integration tests.
pub const INTERVAL: Duration = Duration::from_millis(100);

pub fn loopback() -> std::net::IpAddr {
    "127.0.0.1".parse().unwrap()
}

/// Advertiser that sends to `scanner` instead of the broadcast address.
pub fn advertiser_to(scanner: SocketAddr) -> AdvertiserConfig {
    AdvertiserConfig {
        broadcast_address: scanner.ip(),
        broadcast_port: scanner.port(),
        bind_address: loopback(),
        interval: INTERVAL,
    }
}

pub fn scanner_config() -> ScannerConfig {
    ScannerConfig {
        broadcast_port: 0,
        bind_address: loopback(),
        probe_timeout: Duration::from_millis(500),
        probe_refresh: Duration::from_secs(60),
        stale_after: Duration::from_secs(60),
    }
}

pub fn session_config(port: u16) -> SessionConfig {
    SessionConfig {
        port,
        bind_address: loopback(),
        connect_timeout: Duration::from_secs(2),
    }
}

/// Awaits `fut`, failing the test after five seconds.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("operation did not complete within 5s")
}
