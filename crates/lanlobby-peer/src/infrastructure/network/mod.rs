//! Network infrastructure for a LanLobby peer.
//!
//! # Sub-modules
//!
//! - **`advertiser`** – Host side.  Broadcasts the lobby name over UDP once per
//!   interval until a guest attaches, and answers latency probes.
//!
//! - **`scanner`** – Guest side.  Listens on the discovery port, de-duplicates
//!   advertisements into a lobby catalog, measures each lobby's latency and
//!   drops lobbies that stop advertising.
//!
//! - **`probe`** – The latency probe exchange shared by both sides.
//!
//! - **`session`** – The TCP chat session: host accept with the attach
//!   sentinel, guest connect, framed message send/receive, and rejection of
//!   any guest beyond the first.

pub mod advertiser;
pub mod probe;
pub mod scanner;
pub mod session;

pub use advertiser::{AdvertiseError, AdvertiserConfig, PresenceAdvertiser};
pub use scanner::{LobbyScanner, ScanError, ScanHandle, ScannerConfig};
pub use session::{
    connect_to, guest_connect, ConnectionError, HostListener, MessageStream, Session,
    SessionConfig, SessionSender, TransportError,
};
