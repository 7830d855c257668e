//! Host-side presence advertisement over UDP broadcast.
//!
//! While a host waits for its guest, [`PresenceAdvertiser`] broadcasts the
//! lobby name once per interval to `broadcast_address:broadcast_port`.  Every
//! guest scanning that port learns the lobby name and, from the datagram's
//! source, the host's address.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start()──► Active ──stop()──► Idle
//!        (opens socket,       (aborts loop, waits for it,
//!         spawns loop)         socket is dropped)
//! ```
//!
//! `start()` while Active and `stop()` while Idle are no-ops.  The socket is
//! owned by the loop task through a [`SocketGuard`], so it is released on
//! every exit path: abort, panic, or the advertiser being dropped.
//!
//! # Send failures
//!
//! A failed `send_to` is logged and the loop carries on; the next tick sends
//! again.  UDP delivery is best-effort anyway, and one dropped advertisement
//! only delays discovery by one interval.
//!
//! # Probe replies
//!
//! Between ticks the loop listens on the same socket and answers latency
//! probe requests (see [`super::probe`]), so guests can measure the
//! round-trip time to the exact socket they heard from.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lanlobby_core::protocol::encode_advertisement;
use lanlobby_core::LobbyName;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::probe::answer_probe;

/// Error type for advertiser operations.
#[derive(Debug, Error)]
pub enum AdvertiseError {
    /// The broadcast socket could not be created.
    #[error("failed to open advertisement socket: {source}")]
    SocketOpen {
        #[source]
        source: io::Error,
    },
}

/// Runtime settings for the advertiser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiserConfig {
    /// Destination IP of every advertisement, normally the limited broadcast
    /// address.
    pub broadcast_address: IpAddr,
    /// UDP port guests listen on.
    pub broadcast_port: u16,
    /// Local IP the advertisement socket binds to (port is ephemeral).
    pub bind_address: IpAddr,
    /// Delay between two advertisements.
    pub interval: Duration,
}

impl AdvertiserConfig {
    pub fn destination(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_address, self.broadcast_port)
    }
}

impl Default for AdvertiserConfig {
    fn default() -> Self {
        Self {
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            broadcast_port: 47810,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            interval: Duration::from_millis(1000),
        }
    }
}

// ── Socket seams ──────────────────────────────────────────────────────────────

/// The datagram operations the advertisement loop needs.
///
/// Implemented for [`tokio::net::UdpSocket`]; tests substitute recording
/// doubles.
#[async_trait]
pub trait AdvertisementSocket: Send + Sync {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl AdvertisementSocket for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }
}

/// Creates the advertisement socket on [`PresenceAdvertiser::start`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocketOpener: Send + Sync {
    async fn open(&self) -> io::Result<Box<dyn AdvertisementSocket>>;
}

/// Production opener: a UDP socket on an ephemeral port with `SO_BROADCAST`.
#[derive(Debug, Clone)]
pub struct UdpSocketOpener {
    bind_address: IpAddr,
}

impl UdpSocketOpener {
    pub fn new(bind_address: IpAddr) -> Self {
        Self { bind_address }
    }
}

#[async_trait]
impl SocketOpener for UdpSocketOpener {
    async fn open(&self) -> io::Result<Box<dyn AdvertisementSocket>> {
        let socket = UdpSocket::bind(SocketAddr::new(self.bind_address, 0)).await?;
        socket.set_broadcast(true)?;
        Ok(Box::new(socket))
    }
}

/// Owns the open socket for the lifetime of the loop task.
struct SocketGuard {
    socket: Box<dyn AdvertisementSocket>,
    lobby: LobbyName,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        info!("advertisement socket closed for lobby {}", self.lobby);
    }
}

// ── Advertiser ────────────────────────────────────────────────────────────────

enum AdvertiserState {
    Idle,
    Active(JoinHandle<()>),
}

/// Periodically broadcasts one lobby's name until stopped.
pub struct PresenceAdvertiser {
    identity: LobbyName,
    config: AdvertiserConfig,
    opener: Arc<dyn SocketOpener>,
    state: AdvertiserState,
}

impl PresenceAdvertiser {
    /// Creates an idle advertiser that will use a real UDP socket.
    pub fn new(identity: LobbyName, config: AdvertiserConfig) -> Self {
        let opener = Arc::new(UdpSocketOpener::new(config.bind_address));
        Self::with_opener(identity, config, opener)
    }

    /// Creates an idle advertiser with a custom socket opener.
    pub fn with_opener(
        identity: LobbyName,
        config: AdvertiserConfig,
        opener: Arc<dyn SocketOpener>,
    ) -> Self {
        Self {
            identity,
            config,
            opener,
            state: AdvertiserState::Idle,
        }
    }

    pub fn identity(&self) -> &LobbyName {
        &self.identity
    }

    /// Returns `true` while the advertisement loop is running.
    pub fn is_active(&self) -> bool {
        matches!(&self.state, AdvertiserState::Active(task) if !task.is_finished())
    }

    /// Opens the socket and starts broadcasting.
    ///
    /// Calling this while already active does nothing; in particular no second
    /// socket is opened.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertiseError::SocketOpen`] if the socket cannot be created.
    /// The advertiser stays idle in that case.
    pub async fn start(&mut self) -> Result<(), AdvertiseError> {
        if self.is_active() {
            debug!("advertiser for lobby {} already running", self.identity);
            return Ok(());
        }

        let socket = self
            .opener
            .open()
            .await
            .map_err(|source| AdvertiseError::SocketOpen { source })?;
        info!("advertisement socket created for lobby {}", self.identity);

        let guard = SocketGuard {
            socket,
            lobby: self.identity.clone(),
        };
        let packet = encode_advertisement(self.identity.as_str());
        let task = tokio::spawn(advertise_loop(
            guard,
            packet,
            self.config.destination(),
            self.config.interval,
        ));
        self.state = AdvertiserState::Active(task);
        Ok(())
    }

    /// Stops broadcasting and waits until the socket has been released.
    ///
    /// Safe to call any number of times.
    pub async fn stop(&mut self) {
        if let AdvertiserState::Active(task) =
            std::mem::replace(&mut self.state, AdvertiserState::Idle)
        {
            task.abort();
            // The JoinError is always `Cancelled` here; the loop never returns.
            let _ = task.await;
            info!("advertisement stopped for lobby {}", self.identity);
        }
    }
}

impl Drop for PresenceAdvertiser {
    fn drop(&mut self) {
        if let AdvertiserState::Active(task) = &self.state {
            task.abort();
        }
    }
}

/// Send → wait `interval` → repeat, answering probes while waiting.
async fn advertise_loop(
    guard: SocketGuard,
    packet: Vec<u8>,
    destination: SocketAddr,
    interval: Duration,
) {
    let mut buf = [0u8; 64];
    loop {
        match guard.socket.send_to(&packet, destination).await {
            Ok(_) => debug!("advertised lobby {} to {destination}", guard.lobby),
            Err(e) => warn!(
                "advertisement of lobby {} to {destination} failed, retrying next tick: {e}",
                guard.lobby
            ),
        }

        let tick = tokio::time::sleep(interval);
        tokio::pin!(tick);
        loop {
            tokio::select! {
                _ = &mut tick => break,
                received = guard.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        answer_probe(guard.socket.as_ref(), &buf[..len], from).await;
                    }
                    Err(e) => {
                        debug!("advertisement socket recv error: {e}");
                        (&mut tick).await;
                        break;
                    }
                },
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
