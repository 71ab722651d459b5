//! `mochi decode` and `mochi tea`: offline packet inspection.

use std::io::{self, ErrorKind};

use mochi_core::protocol::{KeyRing, ServerPacket, TeaKey, decode_frame, hex_groups, parse_hex, tea};

use crate::cli::TeaDirection;

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(ErrorKind::InvalidInput, message.into())
}

fn parse_key(hex: &str) -> io::Result<TeaKey> {
    hex.parse()
        .map_err(|e| invalid(format!("invalid key: {}", e)))
}

fn parse_bytes(hex: &str) -> io::Result<Vec<u8>> {
    parse_hex(hex).map_err(|e| invalid(format!("invalid hex input: {}", e)))
}

/// Decode one frame, trying `key` for every decryption layer.
pub fn decode(frame_hex: &str, key: Option<&str>) -> io::Result<String> {
    let raw = parse_bytes(frame_hex)?;
    let keys = match key {
        Some(key) => KeyRing::uniform(parse_key(key)?),
        None => KeyRing::new(),
    };
    match decode_frame(&raw, &keys) {
        Ok(packet) => Ok(render(&packet)),
        Err(failure) => Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("{}\nraw: {}", failure, hex_groups(&failure.raw)),
        )),
    }
}

fn render(packet: &ServerPacket) -> String {
    match packet {
        ServerPacket::Event(event) => format!("{}\n{:#?}", event, event.kind),
        other => format!("{:#?}", other),
    }
}

/// Run TEA over `data_hex`, returning the result as hex groups.
pub fn tea(direction: TeaDirection, key: &str, data_hex: &str) -> io::Result<String> {
    let key = parse_key(key)?;
    let data = parse_bytes(data_hex)?;
    let out = match direction {
        TeaDirection::Encrypt => tea::encrypt(&data, &key),
        TeaDirection::Decrypt => tea::decrypt(&data, &key)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))?,
    };
    Ok(hex_groups(&out))
}
