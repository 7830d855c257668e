//! Guest-side lobby list: scan, show, select.
//!
//! [`LobbyBrowser`] is the state holder behind a lobby list screen.  It owns
//! a running scan and exposes a [`LobbyListState`] snapshot that a UI renders.
//! The caller pulls it forward with [`LobbyBrowser::next_update`].
//!
//! Selection is by `(name, address IP)`.  When a refreshed catalog no longer
//! contains the selected lobby (its host stopped advertising), the selection
//! is cleared.  Every scan starts from an empty list.

use std::net::SocketAddr;

use lanlobby_core::Lobby;
use serde::Serialize;
use tracing::{debug, info};

use crate::infrastructure::network::{LobbyScanner, ScanError, ScanHandle, ScannerConfig};

/// What the lobby list shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LobbyListState {
    pub lobbies: Vec<Lobby>,
    pub selected_lobby: Option<Lobby>,
    pub is_scanning: bool,
}

impl LobbyListState {
    /// Replaces the lobby list, keeping the selection only if it still exists.
    fn refresh(&mut self, lobbies: Vec<Lobby>) {
        if let Some(selected) = &self.selected_lobby {
            let fresh = lobbies
                .iter()
                .find(|l| l.name == selected.name && l.address.ip() == selected.address.ip())
                .cloned();
            if fresh.is_none() {
                debug!("selected lobby '{}' vanished; clearing selection", selected.name);
            }
            self.selected_lobby = fresh;
        }
        self.lobbies = lobbies;
    }
}

pub struct LobbyBrowser {
    scanner: LobbyScanner,
    scan: Option<ScanHandle>,
    state: LobbyListState,
}

impl LobbyBrowser {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            scanner: LobbyScanner::new(config),
            scan: None,
            state: LobbyListState::default(),
        }
    }

    pub fn state(&self) -> &LobbyListState {
        &self.state
    }

    /// Address of the running scan's discovery socket.
    pub fn scan_addr(&self) -> Option<SocketAddr> {
        self.scan.as_ref().map(ScanHandle::local_addr)
    }

    /// Starts scanning with an empty lobby list.  Does nothing if a scan is
    /// already running.
    pub async fn start_scan(&mut self) -> Result<(), ScanError> {
        if self.scan.is_some() {
            return Ok(());
        }
        self.scan = Some(self.scanner.start().await?);
        self.state = LobbyListState {
            is_scanning: true,
            ..LobbyListState::default()
        };
        info!("lobby scan started");
        Ok(())
    }

    /// Waits for the scanner to report a new, re-measured or dropped lobby,
    /// then refreshes the list.
    ///
    /// Returns `None` when no scan is running or the scan has ended.
    pub async fn next_update(&mut self) -> Option<&LobbyListState> {
        let scan = self.scan.as_mut()?;
        match scan.next_change().await {
            Some(lobbies) => {
                debug!("lobby list changed: {} lobbies", lobbies.len());
                self.state.refresh(lobbies);
                Some(&self.state)
            }
            None => {
                self.stop_scan().await;
                None
            }
        }
    }

    /// Stops scanning and keeps the final catalog as the lobby list.
    pub async fn stop_scan(&mut self) {
        if let Some(scan) = self.scan.take() {
            let lobbies = scan.stop().await;
            self.state.refresh(lobbies);
            self.state.is_scanning = false;
            info!("lobby scan stopped with {} lobbies", self.state.lobbies.len());
        }
    }

    /// Selects `lobby` if it is currently listed.  Returns the selection.
    pub fn select_lobby(&mut self, lobby: &Lobby) -> Option<&Lobby> {
        let found = self
            .state
            .lobbies
            .iter()
            .find(|l| l.name == lobby.name && l.address.ip() == lobby.address.ip())
            .cloned();
        self.state.selected_lobby = found;
        self.state.selected_lobby.as_ref()
    }

    /// Selects the first listed lobby called `name`.
    pub fn select_by_name(&mut self, name: &str) -> Option<&Lobby> {
        self.state.selected_lobby = self.state.lobbies.iter().find(|l| l.name == name).cloned();
        self.state.selected_lobby.as_ref()
    }

    pub fn clear_selection(&mut self) {
        self.state.selected_lobby = None;
    }

    /// Ends browsing and hands out the selected lobby.
    pub async fn finish(mut self) -> Option<Lobby> {
        self.stop_scan().await;
        self.state.selected_lobby.take()
    }
}
