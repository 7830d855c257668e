//! # lanlobby-core
//!
//! Shared library for LanLobby containing the wire codec and the domain
//! model.  Both the hosting and the joining side of a chat use it.
//!
//! It has zero dependencies on sockets or an async runtime.
//!
//! - **`protocol`** – Byte layouts: the advertisement datagram (just the lobby
//!   name), the latency probe datagram, and the length-prefixed session frame
//!   that carries chat text or the attach sentinel.
//!
//! - **`domain`** – Lobby names and the scan catalog, chat messages, and the
//!   `ChatState` reducer that every session state change goes through.

pub mod domain;
pub mod protocol;

pub use domain::chat::{ChatEvent, ChatPhase, ChatState, Role};
pub use domain::lobby::{Lobby, LobbyCatalog, LobbyName, LobbyNameError, Sighting};
pub use domain::message::Message;
pub use protocol::codec::{decode_frame, encode_frame, ProtocolError};
pub use protocol::messages::SessionFrame;
