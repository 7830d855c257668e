//! Protocol module containing wire types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_advertisement, decode_frame, decode_probe, encode_advertisement, encode_frame,
    encode_probe, ProtocolError,
};
pub use messages::*;
