//! Guest-side lobby discovery.
//!
//! [`LobbyScanner::start`] binds the discovery port and spawns a scan loop
//! that owns the [`LobbyCatalog`].  Nothing else writes to the catalog; the
//! [`ScanHandle`] only sees snapshots and update events.
//!
//! For every valid advertisement the loop:
//!
//! 1. records the sighting, keyed by `(name, source IP)`;
//! 2. on first sighting, or once the last probe is older than
//!    `probe_refresh`, spawns a latency probe as a child task;
//! 3. publishes a fresh catalog snapshot when anything changed.
//!
//! Probe results flow back into the loop through a [`JoinSet`], so a slow or
//! silent host never stalls the reception of other advertisements.  A lobby
//! whose probe times out stays in the catalog with `latency = None`.  A lobby
//! that has not advertised for `stale_after` (its host went away or attached
//! a guest) is dropped by a periodic sweep.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use lanlobby_core::protocol::{decode_advertisement, MAX_LOBBY_NAME_LEN};
use lanlobby_core::{Lobby, LobbyCatalog, Sighting};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::advertiser::AdvertisementSocket;
use super::probe::measure_latency;

/// Error type for scanner operations.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The discovery port could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    SocketOpen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Runtime settings for the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// UDP port advertisements are broadcast to.  `0` binds an ephemeral port
    /// (tests).
    pub broadcast_port: u16,
    pub bind_address: IpAddr,
    /// How long a probe waits for its reply.
    pub probe_timeout: Duration,
    /// Minimum age of a measurement before a lobby is probed again.
    pub probe_refresh: Duration,
    /// Silence after which a lobby is dropped from the catalog.
    pub stale_after: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            broadcast_port: 47810,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            probe_timeout: Duration::from_millis(500),
            probe_refresh: Duration::from_millis(5000),
            stale_after: Duration::from_millis(3000),
        }
    }
}

/// Capacity of the update channel.  When full, updates are dropped; the
/// catalog snapshot still reflects them.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Pause after a failed receive before reading again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Lower bound on the stale-lobby sweep period.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(10);

/// Starts discovery scans.
#[derive(Debug, Clone)]
pub struct LobbyScanner {
    config: ScannerConfig,
}

impl LobbyScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Binds the discovery socket and starts the scan loop.
    ///
    /// # Errors
    ///
    /// [`ScanError::SocketOpen`] if the port cannot be bound (for example
    /// because another scanner on this machine holds it).
    pub async fn start(&self) -> Result<ScanHandle, ScanError> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.broadcast_port);
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ScanError::SocketOpen { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| ScanError::SocketOpen { addr, source })?;
        info!("discovery socket listening on {local_addr}");

        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let (catalog_tx, catalog_rx) = watch::channel(Vec::new());
        let (stop_tx, stop_rx) = oneshot::channel();

        let scan = ScanLoop {
            socket: Box::new(socket),
            config: self.config.clone(),
            catalog: LobbyCatalog::new(),
            updates: updates_tx,
            snapshots: catalog_tx,
        };
        let task = tokio::spawn(scan.run(stop_rx));

        Ok(ScanHandle {
            updates: updates_rx,
            catalog: catalog_rx,
            stop: Some(stop_tx),
            task: Some(task),
            local_addr,
        })
    }
}

/// Handle to a running scan.
///
/// Dropping the handle aborts the scan and releases the socket.
pub struct ScanHandle {
    updates: mpsc::Receiver<Lobby>,
    catalog: watch::Receiver<Vec<Lobby>>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<LobbyCatalog>>,
    local_addr: SocketAddr,
}

impl ScanHandle {
    /// Waits for the next newly discovered or re-measured lobby.
    ///
    /// Returns `None` once the scan has ended.
    pub async fn next(&mut self) -> Option<Lobby> {
        self.updates.recv().await
    }

    /// Waits until the catalog changes (a lobby appeared, was re-measured or
    /// was dropped) and returns the new snapshot.
    ///
    /// Returns `None` once the scan has ended.
    pub async fn next_change(&mut self) -> Option<Vec<Lobby>> {
        tokio::select! {
            biased;
            update = self.updates.recv() => {
                update?;
            }
            changed = self.catalog.changed() => {
                changed.ok()?;
            }
        }
        Some(self.catalog.borrow_and_update().clone())
    }

    /// Snapshot of every lobby currently listed, in first-seen order.
    pub fn catalog(&self) -> Vec<Lobby> {
        self.catalog.borrow().clone()
    }

    /// Address the discovery socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the scan, releases the socket and returns the final catalog.
    pub async fn stop(mut self) -> Vec<Lobby> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.task.take() {
            Some(task) => match task.await {
                Ok(catalog) => catalog.lobbies(),
                Err(e) => {
                    warn!("scan loop ended abnormally: {e}");
                    self.catalog()
                }
            },
            None => self.catalog(),
        }
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Result of one child probe task.
struct ProbeOutcome {
    name: String,
    source: SocketAddr,
    latency: Option<Duration>,
}

/// State owned by the scan task.
struct ScanLoop {
    socket: Box<dyn AdvertisementSocket>,
    config: ScannerConfig,
    catalog: LobbyCatalog,
    updates: mpsc::Sender<Lobby>,
    snapshots: watch::Sender<Vec<Lobby>>,
}

impl ScanLoop {
    async fn run(mut self, mut stop: oneshot::Receiver<()>) -> LobbyCatalog {
        let mut probes: JoinSet<ProbeOutcome> = JoinSet::new();
        // One byte over the limit so oversized names are detected, not truncated.
        let mut buf = [0u8; MAX_LOBBY_NAME_LEN + 1];
        let period = (self.config.stale_after / 2).max(MIN_SWEEP_PERIOD);
        let mut sweep = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.on_datagram(&buf[..len], from, &mut probes),
                    Err(e) => {
                        warn!("discovery socket receive error: {e}");
                        tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    }
                },
                Some(joined) = probes.join_next(), if !probes.is_empty() => match joined {
                    Ok(outcome) => self.on_probe_outcome(outcome),
                    Err(e) => warn!("latency probe task failed: {e}"),
                },
                _ = sweep.tick() => self.evict_stale(),
            }
        }

        probes.shutdown().await;
        info!("discovery socket closed; {} lobbies seen", self.catalog.len());
        self.catalog
    }

    fn on_datagram(&mut self, datagram: &[u8], from: SocketAddr, probes: &mut JoinSet<ProbeOutcome>) {
        let name = match decode_advertisement(datagram) {
            Ok(name) => name,
            Err(e) => {
                debug!("ignoring invalid advertisement from {from}: {e}");
                return;
            }
        };

        let now = Instant::now();
        let sighting = self.catalog.record_sighting(&name, from, now);
        if sighting == Sighting::New {
            info!("discovered lobby '{name}' at {from}");
        } else {
            debug!("repeat advertisement for lobby '{name}' from {from}");
        }

        if self
            .catalog
            .needs_probe(&name, from.ip(), self.config.probe_refresh, now)
        {
            self.catalog.mark_probed(&name, from.ip(), now);
            probes.spawn(probe_lobby(
                name.clone(),
                from,
                self.config.bind_address,
                self.config.probe_timeout,
            ));
        }

        self.publish_snapshot();
        if sighting == Sighting::New {
            if let Some(lobby) = self.catalog.get(&name, from.ip()).cloned() {
                self.publish(lobby);
            }
        }
    }

    fn on_probe_outcome(&mut self, outcome: ProbeOutcome) {
        let ip = outcome.source.ip();
        let previous = match self.catalog.get(&outcome.name, ip) {
            Some(lobby) => lobby.latency,
            // Dropped while the probe was in flight.
            None => return,
        };
        let updated = self
            .catalog
            .update_latency(&outcome.name, ip, outcome.latency)
            .cloned();
        if let Some(lobby) = updated {
            if lobby.latency.is_some() || lobby.latency != previous {
                self.publish_snapshot();
                self.publish(lobby);
            }
        }
    }

    fn evict_stale(&mut self) {
        let evicted = self.catalog.evict_stale(self.config.stale_after, Instant::now());
        if evicted.is_empty() {
            return;
        }
        for lobby in &evicted {
            info!("lobby '{}' at {} stopped advertising; dropped", lobby.name, lobby.address);
        }
        self.publish_snapshot();
    }

    /// Replaces the catalog snapshot, waking watchers only if it changed.
    fn publish_snapshot(&self) {
        let lobbies = self.catalog.lobbies();
        self.snapshots.send_if_modified(|current| {
            if *current == lobbies {
                return false;
            }
            *current = lobbies;
            true
        });
    }

    fn publish(&self, lobby: Lobby) {
        if let Err(e) = self.updates.try_send(lobby) {
            debug!("lobby update not delivered: {e}");
        }
    }
}

async fn probe_lobby(
    name: String,
    source: SocketAddr,
    bind_address: IpAddr,
    timeout: Duration,
) -> ProbeOutcome {
    let latency = match measure_latency(source, bind_address, timeout).await {
        Ok(rtt) => {
            debug!("lobby '{name}' at {source} answered probe in {rtt:?}");
            Some(rtt)
        }
        Err(e) => {
            debug!("lobby '{name}' at {source} kept without latency: {e}");
            None
        }
    };
    ProbeOutcome { name, source, latency }
}
