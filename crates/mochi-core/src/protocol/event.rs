//! Server events (`00 CE` / `00 17` packets), decrypted with the session key.
//!
//! Every event starts with a 16-byte identity, echoed back in the
//! acknowledgement, and carries its type in the two bytes at offset 18.

use std::fmt;

use strum::AsRefStr;

use super::framer::PacketId;
use super::reader::{DecodeError, PacketReader};
use crate::message::{MessageChain, MessageElement};

const IDENTITY_LEN: usize = 16;
const TYPE_OFFSET: usize = 18;

const TYPE_ANDROID_STATUS: [u8; 2] = [0x00, 0xC4];
const TYPE_GROUP_FILE_UPLOAD: [u8; 2] = [0x00, 0x2D];
const TYPE_GROUP_MESSAGE: [u8; 2] = [0x00, 0x52];
const TYPE_FRIEND_MESSAGE: [u8; 2] = [0x00, 0xA6];

const SECTION_TEXT: u8 = 0x01;
const SECTION_FACE: u8 = 0x02;
const SECTION_IMAGE: u8 = 0x03;
const SECTION_IMAGE_FRIEND: u8 = 0x06;
const SECTION_END: u8 = 0x0E;
const SECTION_LONG_TEXT: u8 = 0x13;

/// Where the gzip stream starts inside a long-text section.
const LONG_TEXT_GZIP_OFFSET: usize = 13;
/// Where the gzip stream starts inside an XML card. XML cards share their
/// type byte with the end marker and are told apart by the gzip magic.
const XML_GZIP_OFFSET: usize = 6;
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// TLV tag holding the sender's display data in message events.
const TAG_SENDER: u8 = 0x12;

#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum EventKind {
    AndroidOnline,
    AndroidOffline,
    GroupFileUpload {
        xml: String,
    },
    GroupMessage {
        group: u64,
        sender: u64,
        sender_name: Option<String>,
        message: MessageChain,
    },
    FriendMessage {
        sender: u64,
        message: MessageChain,
    },
    Unknown {
        event_type: [u8; 2],
    },
}

/// A decoded server event.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    /// Id of the carrying packet, echoed by the acknowledgement.
    pub packet_id: PacketId,
    pub identity: [u8; IDENTITY_LEN],
    pub kind: EventKind,
}

impl ServerEvent {
    pub fn decode(packet_id: PacketId, body: &[u8]) -> Result<Self, DecodeError> {
        let mut r = PacketReader::new(body);
        let identity = r.read_array::<IDENTITY_LEN>()?;
        let event_type: [u8; 2] = r.goto(TYPE_OFFSET)?.read_array()?;

        let kind = match event_type {
            TYPE_ANDROID_STATUS => {
                if r.read_bool_at(33)? {
                    EventKind::AndroidOnline
                } else {
                    EventKind::AndroidOffline
                }
            }
            TYPE_GROUP_FILE_UPLOAD => {
                let len = r.read_u16_at(60)?;
                EventKind::GroupFileUpload {
                    xml: r.read_string_at(65, len.into())?,
                }
            }
            TYPE_GROUP_MESSAGE => decode_group_message(&mut r)?,
            TYPE_FRIEND_MESSAGE => decode_friend_message(&mut r)?,
            other => {
                tracing::debug!(
                    event_type = %super::hex_groups(&other),
                    "unknown server event"
                );
                EventKind::Unknown { event_type: other }
            }
        };
        Ok(Self {
            packet_id,
            identity,
            kind,
        })
    }

    /// The chat message carried by the event, if any.
    pub fn message(&self) -> Option<&MessageChain> {
        match &self.kind {
            EventKind::GroupMessage { message, .. } | EventKind::FriendMessage { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EventKind::GroupMessage {
                group,
                sender,
                sender_name,
                message,
            } => {
                let name = sender_name.as_deref().unwrap_or("?");
                write!(f, "[group {}] {}({}): {}", group, name, sender, message.content())
            }
            EventKind::FriendMessage { sender, message } => {
                write!(f, "[friend {}]: {}", sender, message.content())
            }
            EventKind::GroupFileUpload { xml } => write!(f, "[group file] {}", xml),
            EventKind::Unknown { event_type } => {
                write!(f, "[event {}]", super::hex_groups(event_type))
            }
            other => write!(f, "[{}]", other.as_ref()),
        }
    }
}

fn decode_group_message(r: &mut PacketReader<'_>) -> Result<EventKind, DecodeError> {
    let group = r.read_u32_at(51)?;
    let sender = r.read_u32_at(56)?;
    r.goto(108)?;
    let (message, mut trailer) = read_message_body(r)?;
    let sender_name = trailer
        .swap_remove(&TAG_SENDER)
        .map(|data| {
            let inner = PacketReader::new(data).read_tlv_map(true)?;
            Ok::<_, DecodeError>(
                inner
                    .get(&0x01)
                    .or_else(|| inner.get(&0x02))
                    .map(|name| String::from_utf8_lossy(name).into_owned()),
            )
        })
        .transpose()?
        .flatten();
    Ok(EventKind::GroupMessage {
        group: group.into(),
        sender: sender.into(),
        sender_name,
        message,
    })
}

fn decode_friend_message(r: &mut PacketReader<'_>) -> Result<EventKind, DecodeError> {
    let sender = r.read_u32_at(0)?;
    let skip = r.read_u16_at(22)?;
    r.goto(93 + usize::from(skip))?;
    let (message, _) = read_message_body(r)?;
    Ok(EventKind::FriendMessage {
        sender: sender.into(),
        message,
    })
}

/// Font (LV), two zero bytes, the sections, then a trailing TLV map.
fn read_message_body<'a>(
    r: &mut PacketReader<'a>,
) -> Result<(MessageChain, indexmap::IndexMap<u8, &'a [u8]>), DecodeError> {
    r.read_lv_bytes()?;
    r.skip(2)?;
    let message = read_sections(r)?;
    let trailer = r.read_tlv_map(true)?;
    Ok((message, trailer))
}

/// Sections are `u8 type | u16 length | data`, ending at type `0x0E` or at
/// the end of input. Unknown types are skipped.
fn read_sections(r: &mut PacketReader<'_>) -> Result<MessageChain, DecodeError> {
    let mut chain = MessageChain::new();
    while r.remaining() > 0 {
        let section_type = r.read_u8()?;
        let data = r.read_lv_bytes()?;
        if section_type == SECTION_END {
            if data.get(XML_GZIP_OFFSET..XML_GZIP_OFFSET + 2) == Some(&GZIP_MAGIC[..]) {
                chain.push(MessageElement::Xml(read_compressed(data, XML_GZIP_OFFSET)?));
            }
            break;
        }
        let mut section = PacketReader::new(data);
        match section_type {
            SECTION_TEXT => {
                section.skip(1)?;
                chain.push(MessageElement::Text(section.read_lv_string()?));
            }
            SECTION_FACE => {
                chain.push(MessageElement::Face {
                    id: section.read_u8_at(3)?,
                });
            }
            SECTION_IMAGE | SECTION_IMAGE_FRIEND => {
                section.skip(1)?;
                chain.push(MessageElement::Image {
                    id: section.read_lv_string()?,
                });
            }
            SECTION_LONG_TEXT => {
                chain.push(MessageElement::Text(read_compressed(
                    data,
                    LONG_TEXT_GZIP_OFFSET,
                )?));
            }
            other => tracing::trace!(section_type = other, "skipping message section"),
        }
    }
    Ok(chain)
}

/// Gunzip a section from `offset` to its end.
fn read_compressed(data: &[u8], offset: usize) -> Result<String, DecodeError> {
    let mut section = PacketReader::new(data);
    let n = section.goto(offset)?.remaining();
    let text = section.read_gzip(n)?;
    Ok(String::from_utf8_lossy(&text).into_owned())
}
