//! Chat session state and its reducer.
//!
//! [`ChatState`] is the snapshot a UI reads.  It is never mutated in place by
//! callers: the session driver feeds [`ChatEvent`]s through
//! [`ChatState::apply`] and publishes the result.
//!
//! ```text
//!  host:   Idle ──AdvertisingStarted──► Advertising ──GuestAttached──► Connected ──ConnectionLost──► Lost
//!            ▲                              │
//!            └──────────AcceptFailed────────┘
//!  guest:  Idle ──ConnectedToHost──► Connected ──ConnectionLost──► Lost
//! ```
//!
//! `Lost` is terminal.  Events that do not fit the current phase are ignored.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::message::Message;

/// Which end of the session this peer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Owns the lobby and advertises it.
    Host,
    /// Discovered the lobby and connected to it.
    Guest,
}

/// Lifecycle phase of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatPhase {
    Idle,
    /// Host only: broadcasting the lobby and waiting for a guest.
    Advertising,
    Connected,
    /// The transport failed after having connected.  Terminal.
    Lost,
}

/// Inputs to the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    AdvertisingStarted,
    /// Host accepted its one guest; advertising has been cancelled.
    GuestAttached { peer: SocketAddr },
    /// Host could not accept a guest; the lobby is no longer advertised.
    AcceptFailed { reason: String },
    /// Guest connection to the host completed.
    ConnectedToHost { peer: SocketAddr },
    /// Guest saw the host's attach sentinel.
    AttachSignalReceived,
    MessageReceived(Message),
    MessageSent(Message),
    InputChanged(String),
    ConnectionLost { reason: String },
}

/// Snapshot of one chat session, as read by a UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    pub role: Role,
    pub lobby_name: String,
    pub phase: ChatPhase,
    pub peer_address: Option<SocketAddr>,
    /// Append-only conversation log, oldest first.
    pub messages: Vec<Message>,
    pub is_looking_for_client: bool,
    /// Host only: `true` once the single guest has attached.
    pub is_attached: bool,
    pub is_connection_lost: bool,
    pub message_input_value: String,
    /// Human-readable reason for the last failure, if any.
    pub last_error: Option<String>,
}

impl ChatState {
    pub fn new(role: Role, lobby_name: impl Into<String>) -> Self {
        Self {
            role,
            lobby_name: lobby_name.into(),
            phase: ChatPhase::Idle,
            peer_address: None,
            messages: Vec::new(),
            is_looking_for_client: false,
            is_attached: false,
            is_connection_lost: false,
            message_input_value: String::new(),
            last_error: None,
        }
    }

    /// Returns `true` while messages can be exchanged.
    pub fn can_send(&self) -> bool {
        self.phase == ChatPhase::Connected
    }

    /// Applies one event and returns the next state.
    pub fn apply(mut self, event: ChatEvent) -> Self {
        use ChatEvent as E;
        use ChatPhase as P;

        match (self.phase, event) {
            (_, E::InputChanged(value)) => {
                self.message_input_value = value;
            }
            (P::Idle, E::AdvertisingStarted) if self.role == Role::Host => {
                self.phase = P::Advertising;
                self.is_looking_for_client = true;
                self.last_error = None;
            }
            (P::Advertising, E::GuestAttached { peer }) => {
                self.phase = P::Connected;
                self.peer_address = Some(peer);
                self.is_attached = true;
                self.is_looking_for_client = false;
            }
            (P::Advertising, E::AcceptFailed { reason }) => {
                self.phase = P::Idle;
                self.is_looking_for_client = false;
                self.last_error = Some(reason);
            }
            (P::Idle, E::ConnectedToHost { peer }) if self.role == Role::Guest => {
                self.phase = P::Connected;
                self.peer_address = Some(peer);
            }
            (P::Connected, E::AttachSignalReceived) => {
                self.is_looking_for_client = false;
            }
            (P::Connected, E::MessageReceived(message)) | (P::Connected, E::MessageSent(message)) => {
                self.messages.push(message);
            }
            (P::Connected, E::ConnectionLost { reason }) => {
                self.phase = P::Lost;
                self.is_connection_lost = true;
                self.last_error = Some(reason);
            }
            (phase, event) => {
                debug!("ignoring {event:?} in phase {phase:?}");
            }
        }
        self
    }
}
