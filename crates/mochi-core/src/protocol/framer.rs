//! Frame layout, packet ids, keys and outgoing packet encoding.
//!
//! Incoming frames:
//!
//! ```text
//! 02 | version(2) | command(2) | sequence(2) | qq(4) | reserved(3) | body | 03
//! ```
//!
//! Outgoing frames carry a prelude in place of the reserved bytes:
//!
//! ```text
//! 02 | version(2) | command(2) | sequence(2) | qq(4) | prelude | TEA(body) | 03
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use strum::{AsRefStr, Display, EnumIter};

use super::reader::{DecodeError, PacketReader};
use super::tea::{self, TeaKey};

pub const HEAD: u8 = 0x02;
pub const TAIL: u8 = 0x03;
/// Offset of the (encrypted) body in an incoming frame.
pub const BODY_OFFSET: usize = 14;
/// Fixed version block following the qq number in client packets.
pub const FIX_VER2: [u8; 11] = [
    0x02, 0x00, 0x00, 0x00, 0x01, 0x2E, 0x01, 0x00, 0x00, 0x69, 0x35,
];

// ============================================================================
// Packet id
// ============================================================================

/// Command plus sequence, the four bytes after the version. Rendered as
/// upper-case hex groups: `08 25 31 01`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId([u8; 4]);

impl PacketId {
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn new(command: [u8; 2], sequence: u16) -> Self {
        let [s0, s1] = sequence.to_be_bytes();
        Self([command[0], command[1], s0, s1])
    }

    pub fn bytes(&self) -> [u8; 4] {
        self.0
    }

    pub fn command(&self) -> [u8; 2] {
        [self.0[0], self.0[1]]
    }

    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.0[2], self.0[3]])
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::hex_groups(&self.0))
    }
}

impl fmt::Debug for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketId({})", self)
    }
}

impl FromStr for PacketId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = super::parse_hex(s).map_err(|e| e.to_string())?;
        <[u8; 4]>::try_from(bytes.as_slice())
            .map(Self)
            .map_err(|_| format!("packet id must be 4 bytes, got {}", bytes.len()))
    }
}

// ============================================================================
// Incoming frames
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: [u8; 2],
    pub id: PacketId,
    pub qq: u32,
}

/// A validated incoming frame, borrowing the raw bytes.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    header: FrameHeader,
    raw: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn parse(raw: &'a [u8]) -> Result<Self, DecodeError> {
        if raw.len() < BODY_OFFSET + 1 {
            return Err(DecodeError::FrameTooShort(raw.len()));
        }
        let mut reader = PacketReader::new(raw);
        let head = reader.read_u8()?;
        if head != HEAD {
            return Err(DecodeError::BadMarker {
                what: "head",
                expected: HEAD,
                found: head,
            });
        }
        let tail = raw[raw.len() - 1];
        if tail != TAIL {
            return Err(DecodeError::BadMarker {
                what: "tail",
                expected: TAIL,
                found: tail,
            });
        }
        let version = reader.read_array()?;
        let id = PacketId(reader.read_array()?);
        let qq = reader.read_u32()?;
        Ok(Self {
            header: FrameHeader { version, id, qq },
            raw,
        })
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn id(&self) -> PacketId {
        self.header.id
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Total frame length, used to tell login responses apart.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The body between the header and the tail byte.
    pub fn body(&self) -> &'a [u8] {
        &self.raw[BODY_OFFSET..self.raw.len() - 1]
    }

    /// Decrypt the body with each key of `kinds` in turn.
    ///
    /// Layers after the first are best effort: a body that is not
    /// block-aligned, or fails to decrypt, is returned as the previous layer
    /// left it.
    pub fn decrypt(&self, keys: &KeyRing, kinds: &[DecrypterKind]) -> Result<Vec<u8>, DecodeError> {
        let mut body = self.body().to_vec();
        for (layer, kind) in kinds.iter().enumerate() {
            let key = keys.get(*kind).ok_or(DecodeError::MissingKey(*kind))?;
            if layer == 0 {
                body = tea::decrypt(&body, key)?;
                continue;
            }
            if body.len() % 8 != 0 || body.len() < 16 {
                continue;
            }
            match tea::decrypt(&body, key) {
                Ok(inner) => body = inner,
                Err(e) => tracing::trace!(key = %kind, error = %e, "inner layer left as is"),
            }
        }
        Ok(body)
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Which key a packet body is encrypted with.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum DecrypterKind {
    /// Fixed key shared by all clients for login responses.
    Share,
    /// Per-login key wrapping successful login responses.
    Login,
    /// Fixed key of touch responses.
    Touch,
    /// Fixed key of verification code packets.
    Captcha,
    /// Key from the login success packet, wrapping the session key response.
    SessionResponse,
    /// The session key.
    Session,
}

/// Keys available to the decoder.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: HashMap<DecrypterKind, TeaKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every kind mapped to the same key; handy for debugging captures.
    pub fn uniform(key: TeaKey) -> Self {
        use strum::IntoEnumIterator;
        Self {
            keys: DecrypterKind::iter().map(|kind| (kind, key)).collect(),
        }
    }

    pub fn with(mut self, kind: DecrypterKind, key: TeaKey) -> Self {
        self.insert(kind, key);
        self
    }

    pub fn insert(&mut self, kind: DecrypterKind, key: TeaKey) {
        self.keys.insert(kind, key);
    }

    pub fn get(&self, kind: DecrypterKind) -> Option<&TeaKey> {
        self.keys.get(&kind)
    }
}

// ============================================================================
// Outgoing packets
// ============================================================================

pub const HEARTBEAT_COMMAND: [u8; 2] = [0x00, 0x58];
const HEARTBEAT_BODY: [u8; 4] = [0x00, 0x01, 0x00, 0x01];

/// A client packet ready to be framed.
#[derive(Debug, Clone)]
pub struct OutgoingPacket {
    id: PacketId,
    qq: u32,
    prelude: Vec<u8>,
    body: Vec<u8>,
    key: TeaKey,
}

impl OutgoingPacket {
    /// A packet with the standard version prelude whose body is encrypted
    /// with `key`.
    pub fn new(id: PacketId, qq: u32, body: Vec<u8>, key: TeaKey) -> Self {
        Self {
            id,
            qq,
            prelude: FIX_VER2.to_vec(),
            body,
            key,
        }
    }

    /// Append the body key in plain text to the prelude, as key exchange
    /// style packets do.
    pub fn with_plain_key(mut self) -> Self {
        self.prelude.extend_from_slice(self.key.as_bytes());
        self
    }

    pub fn heartbeat(qq: u32, sequence: u16, session_key: TeaKey) -> Self {
        Self::new(
            PacketId::new(HEARTBEAT_COMMAND, sequence),
            qq,
            HEARTBEAT_BODY.to_vec(),
            session_key,
        )
    }

    /// Acknowledge a server event: echoes the event packet's id, with the
    /// event identity as body.
    pub fn event_ack(qq: u32, event_id: PacketId, identity: &[u8; 16], session_key: TeaKey) -> Self {
        Self::new(event_id, qq, identity.to_vec(), session_key)
    }

    pub fn id(&self) -> PacketId {
        self.id
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn prelude(&self) -> &[u8] {
        &self.prelude
    }

    /// Frame the packet for `version`.
    pub fn encode(&self, version: [u8; 2]) -> Vec<u8> {
        let cipher = tea::encrypt(&self.body, &self.key);
        let mut out = Vec::with_capacity(1 + 2 + 4 + 4 + self.prelude.len() + cipher.len() + 1);
        out.push(HEAD);
        out.extend_from_slice(&version);
        out.extend_from_slice(&self.id.bytes());
        out.extend_from_slice(&self.qq.to_be_bytes());
        out.extend_from_slice(&self.prelude);
        out.extend_from_slice(&cipher);
        out.push(TAIL);
        out
    }
}
