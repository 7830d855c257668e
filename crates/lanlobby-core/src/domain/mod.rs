//! Domain entities for LanLobby.
//!
//! Pure logic with no sockets and no async runtime: lobby bookkeeping on the
//! guest side, the conversation log entry type, and the chat session reducer.

/// Lobbies, lobby names, and the de-duplicating scan catalog.
pub mod lobby;

pub mod message;

/// Chat session state machine (`ChatState::apply`).
pub mod chat;
