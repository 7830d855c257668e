//! Application layer use cases for a LanLobby peer.
//!
//! - **`orchestrator`** – Runs one chat session for either role.  A single
//!   driver task owns the advertiser (host), the session, and the
//!   `ChatState`, and publishes every state change.
//!
//! - **`lobby_browser`** – Guest-side lobby list: runs a scan, keeps the list
//!   and the current selection up to date.
//!
//! - **`launch`** – `LaunchArgs` (host a lobby / join a lobby) and the entry
//!   point that turns them into a running `ChatOrchestrator`.

pub mod launch;
pub mod lobby_browser;
pub mod orchestrator;

pub use launch::LaunchArgs;
pub use lobby_browser::{LobbyBrowser, LobbyListState};
pub use orchestrator::{ChatError, ChatOrchestrator};
