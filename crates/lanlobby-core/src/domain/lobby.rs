//! Lobbies and the guest-side lobby catalog.
//!
//! A [`Lobby`] is what a guest knows about an advertising host: the name it
//! broadcasts, the address the broadcast came from, and (once probed) the
//! measured round-trip time.  The [`LobbyCatalog`] collects lobbies seen during
//! one scan, collapses repeated advertisements into a single entry and drops
//! lobbies that stopped advertising.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::MAX_LOBBY_NAME_LEN;

/// Validation errors for [`LobbyName`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LobbyNameError {
    #[error("lobby name must not be empty")]
    Empty,
    #[error("lobby name is {0} bytes; the limit is {MAX_LOBBY_NAME_LEN}")]
    TooLong(usize),
}

/// A validated, human-readable lobby name.
///
/// Surrounding whitespace is trimmed.  The remaining text must be non-empty
/// and fit in one advertisement datagram.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LobbyName(String);

impl LobbyName {
    /// Validates and wraps `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyNameError`] if the trimmed name is empty or longer than
    /// [`MAX_LOBBY_NAME_LEN`] bytes.
    pub fn new(name: impl AsRef<str>) -> Result<Self, LobbyNameError> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(LobbyNameError::Empty);
        }
        if trimmed.len() > MAX_LOBBY_NAME_LEN {
            return Err(LobbyNameError::TooLong(trimmed.len()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LobbyName {
    type Error = LobbyNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LobbyName> for String {
    fn from(name: LobbyName) -> Self {
        name.0
    }
}

impl std::fmt::Display for LobbyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A discoverable host endpoint awaiting one guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lobby {
    /// Name carried in the advertisement payload.
    pub name: String,
    /// Source address of the most recent advertisement.
    pub address: SocketAddr,
    /// Round-trip time of the latest probe; `None` until one answers, and
    /// again after a probe goes unanswered.
    pub latency: Option<Duration>,
}

impl Lobby {
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            address,
            latency: None,
        }
    }

    /// The TCP endpoint a guest connects to: the advertiser's IP on the
    /// configured session port.
    pub fn session_endpoint(&self, session_port: u16) -> SocketAddr {
        SocketAddr::new(self.address.ip(), session_port)
    }

    /// Latency in whole milliseconds, for display.
    pub fn latency_ms(&self) -> Option<u128> {
        self.latency.map(|rtt| rtt.as_millis())
    }
}

/// Outcome of recording one advertisement in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// First advertisement from this (name, IP) pair.
    New,
    /// A repeat advertisement; the entry was refreshed in place.
    Repeat,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    lobby: Lobby,
    last_seen: Instant,
    last_probe: Option<Instant>,
}

/// Ordered, de-duplicated collection of lobbies seen during one scan.
///
/// Entries are keyed by `(name, source IP)` and keep their first-seen order.
/// The catalog has exactly one writer: the scan loop that owns it.
#[derive(Debug, Clone, Default)]
pub struct LobbyCatalog {
    entries: Vec<CatalogEntry>,
}

impl LobbyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str, ip: IpAddr) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.lobby.name == name && e.lobby.address.ip() == ip)
    }

    /// Records an advertisement for `name` received from `source` at `now`.
    ///
    /// A repeat sighting updates the stored source address (the advertiser
    /// may have re-opened its socket on a new port) and keeps the latency.
    pub fn record_sighting(&mut self, name: &str, source: SocketAddr, now: Instant) -> Sighting {
        match self.position(name, source.ip()) {
            Some(idx) => {
                let entry = &mut self.entries[idx];
                entry.lobby.address = source;
                entry.last_seen = now;
                Sighting::Repeat
            }
            None => {
                self.entries.push(CatalogEntry {
                    lobby: Lobby::new(name, source),
                    last_seen: now,
                    last_probe: None,
                });
                Sighting::New
            }
        }
    }

    /// Returns `true` when the lobby has never been probed or its last probe
    /// started more than `refresh` ago.
    pub fn needs_probe(&self, name: &str, ip: IpAddr, refresh: Duration, now: Instant) -> bool {
        match self.position(name, ip) {
            Some(idx) => match self.entries[idx].last_probe {
                Some(at) => now.saturating_duration_since(at) >= refresh,
                None => true,
            },
            None => false,
        }
    }

    /// Marks the lobby as having a probe in flight, started at `now`.
    pub fn mark_probed(&mut self, name: &str, ip: IpAddr, now: Instant) {
        if let Some(idx) = self.position(name, ip) {
            self.entries[idx].last_probe = Some(now);
        }
    }

    /// Stores the latest probe result.  `None` records an unanswered probe:
    /// the lobby stays in the catalog without a latency.
    ///
    /// Returns the updated lobby, or `None` if the entry is unknown.
    pub fn update_latency(
        &mut self,
        name: &str,
        ip: IpAddr,
        latency: Option<Duration>,
    ) -> Option<&Lobby> {
        let idx = self.position(name, ip)?;
        let entry = &mut self.entries[idx];
        entry.lobby.latency = latency;
        Some(&entry.lobby)
    }

    /// Removes every lobby not advertised within `max_age` of `now` and
    /// returns them.  The survivors keep their first-seen order.
    pub fn evict_stale(&mut self, max_age: Duration, now: Instant) -> Vec<Lobby> {
        let mut evicted = Vec::new();
        self.entries.retain(|e| {
            let fresh = now.saturating_duration_since(e.last_seen) < max_age;
            if !fresh {
                evicted.push(e.lobby.clone());
            }
            fresh
        });
        evicted
    }

    pub fn get(&self, name: &str, ip: IpAddr) -> Option<&Lobby> {
        self.position(name, ip).map(|idx| &self.entries[idx].lobby)
    }

    /// Returns a snapshot of every lobby, in first-seen order.
    pub fn lobbies(&self) -> Vec<Lobby> {
        self.entries.iter().map(|e| e.lobby.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
