//! LanLobby wire message types.
//!
//! Three kinds of payload travel between peers:
//!
//! - **Advertisement** datagrams (UDP broadcast): the raw UTF-8 bytes of the
//!   lobby name.  There is no header; the datagram boundary is the framing.
//! - **Probe** datagrams (UDP unicast): a fixed 16-byte record used by the
//!   guest to measure the round-trip time to an advertising host.
//! - **Session frames** (TCP): one [`SessionFrame`] per chat message, behind a
//!   6-byte header.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Version byte carried in every session frame header.
pub const FRAME_VERSION: u8 = 0x01;

/// Size of the session frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 6;

/// Largest session frame payload accepted by the decoder (64 KiB).
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024;

/// Largest lobby name, in UTF-8 bytes, that fits an advertisement.
pub const MAX_LOBBY_NAME_LEN: usize = 255;

/// Magic prefix identifying a latency probe datagram.
pub const PROBE_MAGIC: &[u8; 7] = b"LLPROBE";

/// Total size of a latency probe datagram in bytes.
pub const PROBE_PACKET_SIZE: usize = 16;

// ── Session frames ────────────────────────────────────────────────────────────

/// Frame type codes used in the session frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    Sentinel = 0x01,
    UserText = 0x02,
}

impl TryFrom<u8> for FrameType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(FrameType::Sentinel),
            0x02 => Ok(FrameType::UserText),
            _ => Err(()),
        }
    }
}

/// One unit of the host ↔ guest message stream.
///
/// The attach signal is its own variant, so an empty chat message
/// (`UserText(String::new())`) can never be mistaken for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionFrame {
    /// Sent once by the host right after it accepts a guest.
    Sentinel,
    /// A chat message typed by the peer.
    UserText(String),
}

impl SessionFrame {
    /// Returns the [`FrameType`] code for this frame.
    pub fn frame_type(&self) -> FrameType {
        match self {
            SessionFrame::Sentinel => FrameType::Sentinel,
            SessionFrame::UserText(_) => FrameType::UserText,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, SessionFrame::Sentinel)
    }
}

// ── Latency probes ────────────────────────────────────────────────────────────

/// Direction of a latency probe datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProbeKind {
    /// Guest → host: "please echo this token".
    Request = 0x01,
    /// Host → guest: echo of a request token.
    Reply = 0x02,
}

impl TryFrom<u8> for ProbeKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(ProbeKind::Request),
            0x02 => Ok(ProbeKind::Reply),
            _ => Err(()),
        }
    }
}

/// A latency probe datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbePacket {
    pub kind: ProbeKind,
    /// Opaque token chosen by the requester; echoed verbatim in the reply.
    pub token: u64,
}

impl ProbePacket {
    pub fn request(token: u64) -> Self {
        Self { kind: ProbeKind::Request, token }
    }

    /// Builds the reply that answers this packet.
    pub fn reply_to(&self) -> Self {
        Self { kind: ProbeKind::Reply, token: self.token }
    }
}
