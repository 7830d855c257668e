//! Integration tests for the session frame codec as a streaming reader uses it.
//!
//! A TCP read may return part of a frame or several frames at once.  These
//! tests feed the public decoder the way `MessageStream` does: accumulate,
//! decode until `InsufficientData`, drain the consumed bytes.

use lanlobby_core::{
    decode_frame, encode_frame,
    protocol::{FRAME_HEADER_SIZE, MAX_FRAME_PAYLOAD},
    ProtocolError, SessionFrame,
};

/// Drains every complete frame from `buf`, leaving any partial tail behind.
fn drain_frames(buf: &mut Vec<u8>) -> Vec<SessionFrame> {
    let mut out = Vec::new();
    loop {
        match decode_frame(buf) {
            Ok((frame, consumed)) => {
                buf.drain(..consumed);
                out.push(frame);
            }
            Err(ProtocolError::InsufficientData { .. }) => return out,
            Err(e) => panic!("unexpected decode error: {e}"),
        }
    }
}

#[test]
fn test_coalesced_frames_decode_in_send_order() {
    // Arrange: sentinel followed by three texts, all in one "read"
    let frames = vec![
        SessionFrame::Sentinel,
        SessionFrame::UserText("m1".into()),
        SessionFrame::UserText("m2".into()),
        SessionFrame::UserText("m3".into()),
    ];
    let mut buf: Vec<u8> = frames.iter().flat_map(|f| encode_frame(f).unwrap()).collect();

    // Act
    let decoded = drain_frames(&mut buf);

    // Assert
    assert_eq!(decoded, frames);
    assert!(buf.is_empty());
}

#[test]
fn test_byte_at_a_time_delivery_reassembles_frames() {
    // Arrange
    let frames = vec![
        SessionFrame::UserText("hello".into()),
        SessionFrame::UserText(String::new()),
        SessionFrame::UserText("héllo wörld".into()),
    ];
    let wire: Vec<u8> = frames.iter().flat_map(|f| encode_frame(f).unwrap()).collect();

    // Act: simulate the worst-case TCP segmentation
    let mut buf = Vec::new();
    let mut decoded = Vec::new();
    for byte in wire {
        buf.push(byte);
        decoded.extend(drain_frames(&mut buf));
    }

    // Assert
    assert_eq!(decoded, frames);
    assert!(buf.is_empty());
}

#[test]
fn test_partial_tail_is_kept_for_the_next_read() {
    // Arrange
    let first = encode_frame(&SessionFrame::UserText("first".into())).unwrap();
    let second = encode_frame(&SessionFrame::UserText("second".into())).unwrap();
    let mut buf = first.clone();
    buf.extend_from_slice(&second[..FRAME_HEADER_SIZE + 2]);

    // Act
    let decoded = drain_frames(&mut buf);

    // Assert
    assert_eq!(decoded, vec![SessionFrame::UserText("first".into())]);
    assert_eq!(buf.len(), FRAME_HEADER_SIZE + 2);

    buf.extend_from_slice(&second[FRAME_HEADER_SIZE + 2..]);
    assert_eq!(drain_frames(&mut buf), vec![SessionFrame::UserText("second".into())]);
}

#[test]
fn test_largest_allowed_frame_decodes() {
    let frame = SessionFrame::UserText("z".repeat(MAX_FRAME_PAYLOAD));
    let bytes = encode_frame(&frame).unwrap();
    let (decoded, consumed) = decode_frame(&bytes).unwrap();
    assert_eq!(decoded, frame);
    assert_eq!(consumed, FRAME_HEADER_SIZE + MAX_FRAME_PAYLOAD);
}
