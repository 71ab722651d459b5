//! Legacy QQ binary protocol: framing, TEA, field extraction and packet
//! decoders.
//!
//! Decoding is pure: [`decode_frame`] takes one raw frame plus the keys the
//! caller holds and returns a typed [`ServerPacket`]. Nothing here talks to
//! the network.

pub mod event;
pub mod framer;
pub mod packets;
pub mod reader;
pub mod tea;

pub use event::{EventKind, ServerEvent};
pub use framer::{DecrypterKind, Frame, FrameHeader, KeyRing, OutgoingPacket, PacketId};
pub use packets::{DecodeFailure, PacketKind, ServerPacket, classify, decode_frame};
pub use reader::{DecodeError, PacketReader};
pub use tea::{TeaError, TeaKey};

/// Upper-case hex, one space between bytes: `"0A FF 00"`.
pub fn hex_groups(bytes: &[u8]) -> String {
    let encoded = hex::encode_upper(bytes);
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, digit) in encoded.chars().enumerate() {
        if i > 0 && i % 2 == 0 {
            out.push(' ');
        }
        out.push(digit);
    }
    out
}

/// Parse hex, ignoring any whitespace between digits.
pub fn parse_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact)
}
