//! Infrastructure layer for a LanLobby peer.
//!
//! Contains the OS-facing adapters: UDP broadcast and probe sockets, the TCP
//! session transport, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `lanlobby_core`, but MUST NOT
//! import from `application`.
//!
//! # Sub-modules
//!
//! - **`network`** – Presence advertisement, lobby scanning, latency probes,
//!   and the one-to-one chat session.
//!
//! - **`storage`** – TOML configuration loading and saving.

pub mod network;
pub mod storage;
