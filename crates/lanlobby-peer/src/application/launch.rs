//! Entering a chat session from the lobby list.
//!
//! [`LaunchArgs`] is what the lobby screen hands to the chat screen: either
//! "host this lobby" or "join that lobby".  [`ChatOrchestrator::launch`] turns
//! it into a running session using the peer's configuration.

use std::net::SocketAddr;

use lanlobby_core::{Lobby, LobbyName};

use super::orchestrator::{ChatError, ChatOrchestrator};
use crate::infrastructure::storage::config::AppConfig;

/// How to enter a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchArgs {
    /// Advertise `lobby_name` and wait for a guest.
    Host { lobby_name: LobbyName },
    /// Connect to a discovered lobby.
    Join { lobby: Lobby },
}

impl LaunchArgs {
    pub fn is_lobby_owner(&self) -> bool {
        matches!(self, LaunchArgs::Host { .. })
    }

    pub fn lobby_name(&self) -> &str {
        match self {
            LaunchArgs::Host { lobby_name } => lobby_name.as_str(),
            LaunchArgs::Join { lobby } => &lobby.name,
        }
    }

    /// Address the lobby was advertised from.  `None` when hosting.
    pub fn lobby_address(&self) -> Option<SocketAddr> {
        match self {
            LaunchArgs::Host { .. } => None,
            LaunchArgs::Join { lobby } => Some(lobby.address),
        }
    }
}

impl ChatOrchestrator {
    /// Starts hosting or joining, as `args` says.
    ///
    /// # Errors
    ///
    /// [`ChatError::Config`] for unusable addresses in `config`, otherwise the
    /// errors of [`ChatOrchestrator::host`] and [`ChatOrchestrator::join`].
    pub async fn launch(args: LaunchArgs, config: &AppConfig) -> Result<Self, ChatError> {
        let session_config = config.session_config()?;
        match args {
            LaunchArgs::Host { lobby_name } => {
                let advertiser_config = config.advertiser_config()?;
                Self::host(lobby_name, &advertiser_config, &session_config).await
            }
            LaunchArgs::Join { lobby } => Self::join(&lobby, &session_config).await,
        }
    }
}
