//! Binary codec for LanLobby datagrams and session frames.
//!
//! Session frame wire format:
//! ```text
//! [version:1][frame_type:1][payload_len:4][payload:N]
//! ```
//! Header size: 6 bytes. `payload_len` is big-endian.
//!
//! Probe datagram wire format:
//! ```text
//! [magic:7 = "LLPROBE"][kind:1][token:8]
//! ```

use crate::protocol::messages::{
    FrameType, ProbeKind, ProbePacket, SessionFrame, FRAME_HEADER_SIZE, FRAME_VERSION,
    MAX_FRAME_PAYLOAD, MAX_LOBBY_NAME_LEN, PROBE_MAGIC, PROBE_PACKET_SIZE,
};
use thiserror::Error;

/// Errors that can occur while encoding or decoding wire data.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The frame type byte in the header is not a recognized value.
    #[error("unknown frame type: 0x{0:02X}")]
    UnknownFrameType(u8),

    /// The version byte in the header is not supported.
    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    /// The declared payload exceeds [`MAX_FRAME_PAYLOAD`].
    #[error("frame payload of {0} bytes exceeds the {MAX_FRAME_PAYLOAD} byte limit")]
    FrameTooLarge(usize),

    /// The payload could not be parsed (UTF-8 error, non-empty sentinel, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The datagram is not a valid advertisement.
    #[error("invalid advertisement: {0}")]
    InvalidAdvertisement(String),

    /// The datagram is not a latency probe.
    #[error("not a probe datagram")]
    NotAProbe,
}

// ── Session frames ────────────────────────────────────────────────────────────

/// Encodes a [`SessionFrame`] into a byte vector including the 6-byte header.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the text payload exceeds
/// [`MAX_FRAME_PAYLOAD`].
///
/// # Examples
///
/// ```rust
/// use lanlobby_core::protocol::{decode_frame, encode_frame, SessionFrame};
///
/// let frame = SessionFrame::UserText("hello".to_string());
/// let bytes = encode_frame(&frame).unwrap();
/// let (decoded, consumed) = decode_frame(&bytes).unwrap();
/// assert_eq!(decoded, frame);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_frame(frame: &SessionFrame) -> Result<Vec<u8>, ProtocolError> {
    let payload: &[u8] = match frame {
        SessionFrame::Sentinel => &[],
        SessionFrame::UserText(text) => text.as_bytes(),
    };
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.push(FRAME_VERSION);
    buf.push(frame.frame_type() as u8);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one [`SessionFrame`] from the beginning of `bytes`.
///
/// Returns the frame and the number of bytes consumed so a streaming reader
/// can drain its buffer.  A partial frame yields
/// [`ProtocolError::InsufficientData`]; the caller should read more bytes and
/// try again.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<(SessionFrame, usize), ProtocolError> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: FRAME_HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != FRAME_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let type_byte = bytes[1];
    let frame_type =
        FrameType::try_from(type_byte).map_err(|_| ProtocolError::UnknownFrameType(type_byte))?;

    let payload_len = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;
    if payload_len > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge(payload_len));
    }

    let total = FRAME_HEADER_SIZE + payload_len;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let payload = &bytes[FRAME_HEADER_SIZE..total];
    let frame = match frame_type {
        FrameType::Sentinel => {
            if !payload.is_empty() {
                return Err(ProtocolError::MalformedPayload(format!(
                    "sentinel frame carries {} payload bytes",
                    payload.len()
                )));
            }
            SessionFrame::Sentinel
        }
        FrameType::UserText => SessionFrame::UserText(
            String::from_utf8(payload.to_vec())
                .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?,
        ),
    };
    Ok((frame, total))
}

// ── Advertisements ────────────────────────────────────────────────────────────

/// Encodes an advertisement datagram: exactly the UTF-8 bytes of `lobby_name`.
pub fn encode_advertisement(lobby_name: &str) -> Vec<u8> {
    lobby_name.as_bytes().to_vec()
}

/// Decodes an advertisement datagram back into a lobby name.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidAdvertisement`] for empty, oversized, or
/// non-UTF-8 datagrams.
pub fn decode_advertisement(datagram: &[u8]) -> Result<String, ProtocolError> {
    if datagram.is_empty() {
        return Err(ProtocolError::InvalidAdvertisement("empty datagram".into()));
    }
    if datagram.len() > MAX_LOBBY_NAME_LEN {
        return Err(ProtocolError::InvalidAdvertisement(format!(
            "{} bytes exceeds the {MAX_LOBBY_NAME_LEN} byte name limit",
            datagram.len()
        )));
    }
    std::str::from_utf8(datagram)
        .map(str::to_owned)
        .map_err(|e| ProtocolError::InvalidAdvertisement(e.to_string()))
}

// ── Latency probes ────────────────────────────────────────────────────────────

/// Encodes a latency probe into its fixed 16-byte representation.
pub fn encode_probe(probe: &ProbePacket) -> [u8; PROBE_PACKET_SIZE] {
    let mut buf = [0u8; PROBE_PACKET_SIZE];
    buf[..PROBE_MAGIC.len()].copy_from_slice(PROBE_MAGIC);
    buf[PROBE_MAGIC.len()] = probe.kind as u8;
    buf[PROBE_MAGIC.len() + 1..].copy_from_slice(&probe.token.to_be_bytes());
    buf
}

/// Decodes a latency probe datagram.
///
/// # Errors
///
/// Returns [`ProtocolError::NotAProbe`] if the datagram has the wrong size,
/// magic, or kind byte.
pub fn decode_probe(datagram: &[u8]) -> Result<ProbePacket, ProtocolError> {
    if datagram.len() != PROBE_PACKET_SIZE || !datagram.starts_with(PROBE_MAGIC) {
        return Err(ProtocolError::NotAProbe);
    }
    let kind =
        ProbeKind::try_from(datagram[PROBE_MAGIC.len()]).map_err(|_| ProtocolError::NotAProbe)?;
    let mut token = [0u8; 8];
    token.copy_from_slice(&datagram[PROBE_MAGIC.len() + 1..]);
    Ok(ProbePacket {
        kind,
        token: u64::from_be_bytes(token),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_sentinel_has_empty_payload() {
        // Arrange / Act
        let bytes = encode_frame(&SessionFrame::Sentinel).unwrap();

        // Assert
        assert_eq!(bytes, vec![FRAME_VERSION, 0x01, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_user_text_writes_big_endian_length() {
        let bytes = encode_frame(&SessionFrame::UserText("hi".into())).unwrap();
        assert_eq!(&bytes[..FRAME_HEADER_SIZE], &[FRAME_VERSION, 0x02, 0, 0, 0, 2]);
        assert_eq!(&bytes[FRAME_HEADER_SIZE..], b"hi");
    }

    #[test]
    fn test_empty_user_text_decodes_as_user_text_not_sentinel() {
        // Arrange
        let bytes = encode_frame(&SessionFrame::UserText(String::new())).unwrap();

        // Act
        let (frame, consumed) = decode_frame(&bytes).unwrap();

        // Assert
        assert_eq!(frame, SessionFrame::UserText(String::new()));
        assert_eq!(consumed, FRAME_HEADER_SIZE);
    }

    #[test]
    fn test_decode_partial_header_returns_insufficient_data() {
        let result = decode_frame(&[FRAME_VERSION, 0x02]);
        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData { needed: 6, available: 2 })
        );
    }

    #[test]
    fn test_decode_partial_payload_returns_insufficient_data() {
        // Arrange: header promises 5 bytes, only 2 present
        let mut bytes = encode_frame(&SessionFrame::UserText("hello".into())).unwrap();
        bytes.truncate(FRAME_HEADER_SIZE + 2);

        // Act
        let result = decode_frame(&bytes);

        // Assert
        assert!(matches!(result, Err(ProtocolError::InsufficientData { needed: 11, .. })));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let result = decode_frame(&[0x09, 0x02, 0, 0, 0, 0]);
        assert_eq!(result, Err(ProtocolError::UnsupportedVersion(0x09)));
    }

    #[test]
    fn test_decode_rejects_unknown_frame_type() {
        let result = decode_frame(&[FRAME_VERSION, 0x7F, 0, 0, 0, 0]);
        assert_eq!(result, Err(ProtocolError::UnknownFrameType(0x7F)));
    }

    #[test]
    fn test_decode_rejects_oversized_declared_length() {
        // Arrange: declare MAX + 1 without supplying the bytes
        let len = (MAX_FRAME_PAYLOAD as u32 + 1).to_be_bytes();
        let bytes = [FRAME_VERSION, 0x02, len[0], len[1], len[2], len[3]];

        // Act / Assert: rejected before waiting for the payload
        assert_eq!(
            decode_frame(&bytes),
            Err(ProtocolError::FrameTooLarge(MAX_FRAME_PAYLOAD + 1))
        );
    }

    #[test]
    fn test_encode_rejects_oversized_text() {
        let text = "x".repeat(MAX_FRAME_PAYLOAD + 1);
        assert!(matches!(
            encode_frame(&SessionFrame::UserText(text)),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_decode_rejects_sentinel_with_payload() {
        let bytes = [FRAME_VERSION, 0x01, 0, 0, 0, 1, b'x'];
        assert!(matches!(decode_frame(&bytes), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8_text() {
        let bytes = [FRAME_VERSION, 0x02, 0, 0, 0, 2, 0xC3, 0x28];
        assert!(matches!(decode_frame(&bytes), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_advertisement_is_exactly_the_name_bytes() {
        assert_eq!(encode_advertisement("Alibaba-Lobby"), b"Alibaba-Lobby".to_vec());
    }

    #[test]
    fn test_decode_advertisement_accepts_unicode_names() {
        let bytes = encode_advertisement("لابی-کاوشگر");
        assert_eq!(decode_advertisement(&bytes).unwrap(), "لابی-کاوشگر");
    }

    #[test]
    fn test_decode_advertisement_rejects_empty_datagram() {
        assert!(matches!(
            decode_advertisement(&[]),
            Err(ProtocolError::InvalidAdvertisement(_))
        ));
    }

    #[test]
    fn test_decode_advertisement_rejects_oversized_datagram() {
        let bytes = vec![b'a'; MAX_LOBBY_NAME_LEN + 1];
        assert!(matches!(
            decode_advertisement(&bytes),
            Err(ProtocolError::InvalidAdvertisement(_))
        ));
    }

    #[test]
    fn test_decode_advertisement_rejects_invalid_utf8() {
        assert!(decode_advertisement(&[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn test_probe_encodes_magic_kind_and_token() {
        // Arrange
        let probe = ProbePacket::request(0x0102_0304_0506_0708);

        // Act
        let bytes = encode_probe(&probe);

        // Assert
        assert_eq!(&bytes[..7], b"LLPROBE");
        assert_eq!(bytes[7], 0x01);
        assert_eq!(&bytes[8..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decode_probe(&bytes), Ok(probe));
    }

    #[test]
    fn test_decode_probe_rejects_lobby_name_datagram() {
        assert_eq!(decode_probe(b"Alibaba-Lobby"), Err(ProtocolError::NotAProbe));
    }

    #[test]
    fn test_decode_probe_rejects_unknown_kind() {
        let mut bytes = encode_probe(&ProbePacket::request(1));
        bytes[7] = 0x09;
        assert_eq!(decode_probe(&bytes), Err(ProtocolError::NotAProbe));
    }
}
