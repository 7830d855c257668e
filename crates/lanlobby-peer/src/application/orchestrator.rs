//! Chat session orchestration for both roles.
//!
//! A [`ChatOrchestrator`] owns one chat session from start to end.  All the
//! moving parts live inside a single driver task:
//!
//! ```text
//!            commands (mpsc)                  state (watch)
//!  caller ───────────────────►  driver task  ───────────────► caller / UI
//!                                 │  owns: ChatState, PresenceAdvertiser,
//!                                 │        HostListener / Session
//!                                 ▼
//!                     ChatState::apply(event) for every change
//! ```
//!
//! Because the driver is the only writer, state changes are strictly
//! ordered: a message is appended in the order it was sent or received, and
//! the advertiser has already been stopped when `is_attached` becomes
//! visible.
//!
//! Dropping the orchestrator closes the command channel, which ends the
//! driver and releases every socket it holds.

use std::net::SocketAddr;

use lanlobby_core::{ChatEvent, ChatPhase, ChatState, Lobby, LobbyName, Message, Role};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::infrastructure::network::{
    guest_connect, AdvertiseError, AdvertiserConfig, ConnectionError, HostListener,
    PresenceAdvertiser, Session, SessionConfig, SessionSender, TransportError,
};
use crate::infrastructure::storage::config::ConfigError;

/// Errors surfaced by [`ChatOrchestrator`].
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Advertise(#[from] AdvertiseError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// No guest has attached yet (or accepting one failed).
    #[error("not connected to a peer")]
    NotConnected,
    /// The session ended; nothing more can be sent.
    #[error("connection to the peer was lost")]
    ConnectionLost,
    #[error("failed to send message: {0}")]
    Transport(#[from] TransportError),
    /// The driver task is gone.
    #[error("chat session has shut down")]
    Shutdown,
}

/// Capacity of the command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

enum Command {
    InputChanged(String),
    /// `text: None` sends the current input value and clears it.
    Send {
        text: Option<String>,
        reply: oneshot::Sender<Result<Message, ChatError>>,
    },
    Shutdown,
}

/// Handle to a running chat session.
pub struct ChatOrchestrator {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ChatState>,
    driver: JoinHandle<()>,
    session_addr: Option<SocketAddr>,
}

impl ChatOrchestrator {
    /// Hosts `lobby`: binds the session port, starts advertising, and waits
    /// for one guest in the background.
    ///
    /// # Errors
    ///
    /// [`ChatError::Connection`] if the port cannot be bound,
    /// [`ChatError::Advertise`] if the broadcast socket cannot be opened.
    pub async fn host(
        lobby: LobbyName,
        advertiser_config: &AdvertiserConfig,
        session_config: &SessionConfig,
    ) -> Result<Self, ChatError> {
        let listener = HostListener::bind(session_config).await?;
        let session_addr = listener.local_addr();
        let mut advertiser = PresenceAdvertiser::new(lobby.clone(), advertiser_config.clone());
        advertiser.start().await?;
        info!("hosting lobby '{lobby}' on {session_addr}");

        let (driver, commands, state) = Driver::new(Role::Host, lobby.as_str());
        let driver = tokio::spawn(driver.run_host(listener, advertiser));
        Ok(Self {
            commands,
            state,
            driver,
            session_addr: Some(session_addr),
        })
    }

    /// Joins `lobby` as its guest.
    ///
    /// Returns once the host has attached this guest.
    pub async fn join(lobby: &Lobby, session_config: &SessionConfig) -> Result<Self, ChatError> {
        let session = guest_connect(lobby, session_config).await?;
        info!("joined lobby '{}' at {}", lobby.name, session.peer_addr());
        Ok(Self::from_guest_session(&lobby.name, session))
    }

    /// Wraps an already attached guest session.
    pub fn from_guest_session(lobby_name: &str, session: Session) -> Self {
        let (driver, commands, state) = Driver::new(Role::Guest, lobby_name);
        let driver = tokio::spawn(driver.run_guest(session));
        Self {
            commands,
            state,
            driver,
            session_addr: None,
        }
    }

    /// Current snapshot of the session state.
    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.clone()
    }

    /// Waits until the state satisfies `predicate` and returns that state.
    ///
    /// Returns [`ChatError::Shutdown`] if the driver ends first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ChatState) -> bool,
    ) -> Result<ChatState, ChatError> {
        let mut rx = self.state.clone();
        let state = rx.wait_for(predicate).await.map_err(|_| ChatError::Shutdown)?;
        Ok(state.clone())
    }

    /// Local address of the host's session listener.  `None` for guests.
    pub fn session_addr(&self) -> Option<SocketAddr> {
        self.session_addr
    }

    /// Replaces the message draft.
    pub async fn change_message_input_value(&self, value: impl Into<String>) -> Result<(), ChatError> {
        self.commands
            .send(Command::InputChanged(value.into()))
            .await
            .map_err(|_| ChatError::Shutdown)
    }

    /// Sends `text` to the peer and appends it to the conversation.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotConnected`] before a guest attaches,
    /// [`ChatError::ConnectionLost`] after the connection is gone.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<Message, ChatError> {
        self.request_send(Some(text.into())).await
    }

    /// Sends the current draft, then clears it.
    pub async fn submit_input(&self) -> Result<Message, ChatError> {
        self.request_send(None).await
    }

    async fn request_send(&self, text: Option<String>) -> Result<Message, ChatError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send { text, reply })
            .await
            .map_err(|_| ChatError::Shutdown)?;
        response.await.map_err(|_| ChatError::Shutdown)?
    }

    /// Ends the session, stops advertising, and waits for every socket to be
    /// released.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.driver.await {
            warn!("chat driver ended abnormally: {e}");
        }
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// Why the session loop returned.
enum SessionExit {
    Shutdown,
    Ended,
}

struct Driver {
    role: Role,
    state: ChatState,
    publisher: watch::Sender<ChatState>,
    commands: mpsc::Receiver<Command>,
}

impl Driver {
    fn new(role: Role, lobby_name: &str) -> (Self, mpsc::Sender<Command>, watch::Receiver<ChatState>) {
        let state = ChatState::new(role, lobby_name);
        let (publisher, state_rx) = watch::channel(state.clone());
        let (commands_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let driver = Self {
            role,
            state,
            publisher,
            commands,
        };
        (driver, commands_tx, state_rx)
    }

    fn apply(&mut self, event: ChatEvent) {
        let current = std::mem::replace(&mut self.state, ChatState::new(self.role, String::new()));
        self.state = current.apply(event);
        self.publisher.send_replace(self.state.clone());
    }

    async fn run_host(mut self, listener: HostListener, mut advertiser: PresenceAdvertiser) {
        self.apply(ChatEvent::AdvertisingStarted);

        let accept = listener.accept_guest();
        tokio::pin!(accept);
        let accepted = loop {
            tokio::select! {
                result = &mut accept => break result,
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        advertiser.stop().await;
                        info!("stopped waiting for a guest");
                        return;
                    }
                    Some(command) => self.handle_detached(command),
                },
            }
        };

        // Stop advertising before anyone can observe the attached state.
        advertiser.stop().await;

        match accepted {
            Ok(session) => {
                self.apply(ChatEvent::GuestAttached {
                    peer: session.peer_addr(),
                });
                if let SessionExit::Shutdown = self.run_session(session).await {
                    return;
                }
            }
            Err(e) => {
                error!("accepting a guest failed: {e}");
                self.apply(ChatEvent::AcceptFailed {
                    reason: e.to_string(),
                });
            }
        }
        self.run_detached().await;
    }

    async fn run_guest(mut self, session: Session) {
        self.apply(ChatEvent::ConnectedToHost {
            peer: session.peer_addr(),
        });
        // `guest_connect` only returns after the host's attach sentinel.
        self.apply(ChatEvent::AttachSignalReceived);
        if let SessionExit::Shutdown = self.run_session(session).await {
            return;
        }
        self.run_detached().await;
    }

    async fn run_session(&mut self, session: Session) -> SessionExit {
        let session_id = session.id();
        let (sender, mut inbox) = match session.split() {
            Ok(halves) => halves,
            Err(e) => {
                self.apply(ChatEvent::ConnectionLost {
                    reason: e.to_string(),
                });
                return SessionExit::Ended;
            }
        };

        loop {
            tokio::select! {
                incoming = inbox.next() => match incoming {
                    Some(Ok(message)) => self.apply(ChatEvent::MessageReceived(message)),
                    Some(Err(e)) => {
                        warn!("session {session_id}: connection lost: {e}");
                        self.apply(ChatEvent::ConnectionLost { reason: e.to_string() });
                        return SessionExit::Ended;
                    }
                    None => return SessionExit::Ended,
                },
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        sender.close().await;
                        info!("session {session_id}: closed locally");
                        return SessionExit::Shutdown;
                    }
                    Some(Command::InputChanged(value)) => self.apply(ChatEvent::InputChanged(value)),
                    Some(Command::Send { text, reply }) => {
                        let result = self.send(&sender, text).await;
                        let _ = reply.send(result);
                        if self.state.phase == ChatPhase::Lost {
                            return SessionExit::Ended;
                        }
                    }
                },
            }
        }
    }

    async fn send(&mut self, sender: &SessionSender, text: Option<String>) -> Result<Message, ChatError> {
        let from_input = text.is_none();
        let text = text.unwrap_or_else(|| self.state.message_input_value.clone());

        match sender.send(&text).await {
            Ok(()) => {
                let message = Message::local(text);
                self.apply(ChatEvent::MessageSent(message.clone()));
                if from_input {
                    self.apply(ChatEvent::InputChanged(String::new()));
                }
                Ok(message)
            }
            Err(e) => {
                warn!("send failed, treating connection as lost: {e}");
                self.apply(ChatEvent::ConnectionLost {
                    reason: e.to_string(),
                });
                Err(ChatError::Transport(e))
            }
        }
    }

    /// Serves commands while no session is active (before attach, after a
    /// failed accept, or after the connection was lost).
    async fn run_detached(&mut self) {
        while let Some(command) = self.commands.recv().await {
            if let Command::Shutdown = command {
                break;
            }
            self.handle_detached(command);
        }
    }

    fn handle_detached(&mut self, command: Command) {
        match command {
            Command::InputChanged(value) => self.apply(ChatEvent::InputChanged(value)),
            Command::Send { reply, .. } => {
                let error = if self.state.phase == ChatPhase::Lost {
                    ChatError::ConnectionLost
                } else {
                    ChatError::NotConnected
                };
                let _ = reply.send(Err(error));
            }
            Command::Shutdown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::connect_to;
    use std::time::Duration;

    fn loopback_session() -> SessionConfig {
        SessionConfig {
            port: 0,
            bind_address: "127.0.0.1".parse().unwrap(),
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// Advertises to a loopback port nobody listens on.
    fn loopback_advertiser() -> AdvertiserConfig {
        AdvertiserConfig {
            broadcast_address: "127.0.0.1".parse().unwrap(),
            broadcast_port: 9,
            bind_address: "127.0.0.1".parse().unwrap(),
            interval: Duration::from_millis(100),
        }
    }

    async fn hosted() -> ChatOrchestrator {
        ChatOrchestrator::host(
            LobbyName::new("den").unwrap(),
            &loopback_advertiser(),
            &loopback_session(),
        )
        .await
        .unwrap()
    }

    async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
        tokio::time::timeout(Duration::from_secs(3), fut)
            .await
            .expect("timed out")
    }

    #[tokio::test]
    async fn test_host_starts_looking_for_client() {
        // Arrange / Act
        let host = hosted().await;
        let state = within(host.wait_for(|s| s.phase == ChatPhase::Advertising)).await.unwrap();

        // Assert
        assert_eq!(state.role, Role::Host);
        assert!(state.is_looking_for_client);
        assert!(!state.is_attached);
        assert!(host.session_addr().is_some());
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_before_attach_is_not_connected() {
        let host = hosted().await;

        let result = host.send_message("anyone?").await;

        assert!(matches!(result, Err(ChatError::NotConnected)));
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_input_value_is_tracked_before_attach() {
        let host = hosted().await;

        host.change_message_input_value("draft").await.unwrap();
        let state = within(host.wait_for(|s| s.message_input_value == "draft")).await.unwrap();

        assert_eq!(state.phase, ChatPhase::Advertising);
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_input_sends_draft_and_clears_it() {
        // Arrange
        let host = hosted().await;
        let addr = host.session_addr().unwrap();
        let guest_session = connect_to(addr, Duration::from_secs(2)).await.unwrap();
        let guest = ChatOrchestrator::from_guest_session("den", guest_session);
        within(host.wait_for(|s| s.is_attached)).await.unwrap();

        // Act
        host.change_message_input_value("hello").await.unwrap();
        let sent = host.submit_input().await.unwrap();

        // Assert
        assert_eq!(sent.content, "hello");
        assert!(sent.originated_locally);
        let host_state = host.state();
        assert_eq!(host_state.message_input_value, "");
        assert_eq!(host_state.messages.len(), 1);
        let guest_state = within(guest.wait_for(|s| !s.messages.is_empty())).await.unwrap();
        assert_eq!(guest_state.messages[0].content, "hello");
        assert!(!guest_state.messages[0].originated_locally);

        guest.shutdown().await;
        host.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_close_marks_connection_lost_and_rejects_sends() {
        // Arrange
        let host = hosted().await;
        let addr = host.session_addr().unwrap();
        let guest_session = connect_to(addr, Duration::from_secs(2)).await.unwrap();
        let guest = ChatOrchestrator::from_guest_session("den", guest_session);
        within(host.wait_for(|s| s.is_attached)).await.unwrap();

        // Act
        host.shutdown().await;
        let state = within(guest.wait_for(|s| s.is_connection_lost)).await.unwrap();

        // Assert
        assert_eq!(state.phase, ChatPhase::Lost);
        assert!(matches!(guest.send_message("late").await, Err(ChatError::ConnectionLost)));
        guest.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_ends_the_driver() {
        // Arrange
        let host = hosted().await;
        let addr = host.session_addr().unwrap();
        let session = connect_to(addr, Duration::from_secs(2)).await.unwrap();
        let guest = ChatOrchestrator::from_guest_session("den", session);
        let commands = guest.commands.clone();

        // Act
        guest.shutdown().await;

        // Assert: the command receiver is gone with the driver
        assert!(commands.send(Command::Shutdown).await.is_err());
        host.shutdown().await;
    }
}
