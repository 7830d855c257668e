//! lanlobby-peer library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does a LanLobby peer do? (for beginners)
//!
//! Two people on the same local network want to chat without a server.
//!
//! 1. The *host* picks a lobby name.  Its peer broadcasts that name over UDP
//!    once per second to every machine on the LAN.
//! 2. The *guest* listens for those broadcasts, builds a list of lobbies, and
//!    measures how quickly each one answers a small probe datagram.
//! 3. The guest picks a lobby and opens a TCP connection to it.  The host
//!    accepts exactly one guest, stops broadcasting, and sends an "attached"
//!    signal so the guest knows it got in.
//! 4. Both sides exchange text messages until either one disconnects.

/// Application layer: chat orchestration, lobby browsing, launch arguments.
pub mod application;

/// Infrastructure layer: sockets and configuration storage.
pub mod infrastructure;
