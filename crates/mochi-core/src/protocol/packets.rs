//! Server packet dispatch and decoders.
//!
//! Dispatch uses the packet id: exact ids first, then the command prefix.
//! Login responses share ids and are told apart by total frame length;
//! those lengths come from observed traffic and are kept as they are.

use std::net::Ipv4Addr;

use strum::{AsRefStr, Display};
use thiserror::Error;

use super::event::ServerEvent;
use super::framer::{DecrypterKind, Frame, KeyRing, PacketId};
use super::reader::{DecodeError, PacketReader};
use super::tea::TeaKey;

/// A frame that could not be decoded, with its raw bytes for diagnostics.
#[derive(Debug, Error)]
#[error("failed to decode {} byte packet: {error}", .raw.len())]
pub struct DecodeFailure {
    pub raw: Vec<u8>,
    #[source]
    pub error: DecodeError,
}

// ============================================================================
// Packet types
// ============================================================================

/// Why a login attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum LoginState {
    WrongPassword,
    Blocked,
    UnknownQqNumber,
    DeviceLock,
    TakenBack,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchResponse {
    /// Go on logging in with this token.
    Ok {
        token0825: Vec<u8>,
        login_time: u32,
        login_ip: Ipv4Addr,
    },
    /// Reconnect to another server.
    Redirect { server_ip: Ipv4Addr },
}

/// Which login request a key exchange answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum KeyExchangeFlag {
    /// Reply to the first password submission (`08 36 31 03`).
    Initial,
    Other,
}

/// The server asks the client to resend its login with a new key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExchange {
    pub flag: KeyExchangeFlag,
    pub private_key_update: TeaKey,
    pub tlv0006: Vec<u8>,
    /// Not every key exchange carries a token.
    pub token00ba: Option<Vec<u8>>,
}

/// The first part of a verification code image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaInit {
    pub captcha_part1: Vec<u8>,
    pub token00ba: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub encryption_key: TeaKey,
    pub token38: Vec<u8>,
    pub session_response_key: TeaKey,
    pub token88: Vec<u8>,
    pub nick: String,
    pub age: i16,
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaResponse {
    /// The submitted code was accepted.
    Correct { token00ba: Vec<u8> },
    /// One section of the code image.
    Transmission {
        captcha_token: Vec<u8>,
        section: Vec<u8>,
        completed: bool,
        token00ba: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanAddFriend {
    ReadyToAdd(u64),
    RequireVerification(u64),
    AlreadyAdded(u64),
    Rejected(u64),
}

/// A decoded server packet.
#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum ServerPacket {
    Touch(TouchResponse),
    KeyExchange(KeyExchange),
    CaptchaInit(CaptchaInit),
    LoginSuccess(Box<LoginSuccess>),
    LoginFailed(LoginState),
    SessionKey { session_key: TeaKey },
    /// The server acknowledged the session (`00 EC`).
    LoginDone,
    SKey { skey: String },
    AccountInfo { body: Vec<u8> },
    Heartbeat,
    Captcha(CaptchaResponse),
    Event(ServerEvent),
    FriendMessageSent,
    GroupMessageSent,
    CanAddFriend(CanAddFriend),
    ImageId { body: Vec<u8> },
    Unknown { id: PacketId },
}

// ============================================================================
// Dispatch
// ============================================================================

/// Result of the dispatch table, before any decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum PacketKind {
    Touch,
    KeyExchange(KeyExchangeFlag),
    CaptchaInit,
    LoginSuccess,
    LoginFailed(LoginState),
    SessionKey,
    LoginDone,
    SKey,
    AccountInfo,
    Heartbeat,
    Captcha,
    Event,
    FriendMessageSent,
    GroupMessageSent,
    CanAddFriend,
    ImageId,
    Unknown,
}

impl PacketKind {
    /// Keys the body is wrapped in, outermost first.
    pub fn decrypters(self) -> &'static [DecrypterKind] {
        use DecrypterKind::*;
        match self {
            PacketKind::Touch => &[Touch],
            PacketKind::KeyExchange(_) | PacketKind::CaptchaInit | PacketKind::LoginSuccess => {
                &[Share, Login]
            }
            PacketKind::Captcha => &[Captcha],
            PacketKind::SessionKey => &[SessionResponse],
            PacketKind::SKey
            | PacketKind::AccountInfo
            | PacketKind::Event
            | PacketKind::CanAddFriend
            | PacketKind::ImageId => &[Session],
            PacketKind::LoginFailed(_)
            | PacketKind::LoginDone
            | PacketKind::Heartbeat
            | PacketKind::FriendMessageSent
            | PacketKind::GroupMessageSent
            | PacketKind::Unknown => &[],
        }
    }
}

const TOUCH_IDS: [[u8; 4]; 2] = [[0x08, 0x25, 0x31, 0x01], [0x08, 0x25, 0x31, 0x02]];
const LOGIN_INITIAL_ID: [u8; 4] = [0x08, 0x36, 0x31, 0x03];
const LOGIN_IDS: [[u8; 4]; 4] = [
    LOGIN_INITIAL_ID,
    [0x08, 0x36, 0x31, 0x04],
    [0x08, 0x36, 0x31, 0x05],
    [0x08, 0x36, 0x31, 0x06],
];
const SESSION_KEY_ID: [u8; 4] = [0x08, 0x28, 0x04, 0x34];

/// Pick the decoder for a frame from its id and, for login responses, its
/// total length.
pub fn classify(frame: &Frame<'_>) -> PacketKind {
    let id = frame.id().bytes();
    if TOUCH_IDS.contains(&id) {
        return PacketKind::Touch;
    }
    if LOGIN_IDS.contains(&id) {
        return classify_login(id, frame.len());
    }
    if id == SESSION_KEY_ID {
        return PacketKind::SessionKey;
    }
    match frame.id().command() {
        [0x00, 0xEC] => PacketKind::LoginDone,
        [0x00, 0x1D] => PacketKind::SKey,
        [0x00, 0x5C] => PacketKind::AccountInfo,
        [0x00, 0x58] => PacketKind::Heartbeat,
        [0x00, 0xBA] => PacketKind::Captcha,
        [0x00, 0xCE] | [0x00, 0x17] => PacketKind::Event,
        [0x00, 0xCD] => PacketKind::FriendMessageSent,
        [0x00, 0x02] => PacketKind::GroupMessageSent,
        [0x00, 0xA7] => PacketKind::CanAddFriend,
        [0x03, 0x88] => PacketKind::ImageId,
        _ => PacketKind::Unknown,
    }
}

fn classify_login(id: [u8; 4], len: usize) -> PacketKind {
    match len {
        271 | 207 => {
            let flag = if id == LOGIN_INITIAL_ID {
                KeyExchangeFlag::Initial
            } else {
                KeyExchangeFlag::Other
            };
            return PacketKind::KeyExchange(flag);
        }
        871 => return PacketKind::CaptchaInit,
        _ => {}
    }
    if len > 700 {
        return PacketKind::LoginSuccess;
    }
    PacketKind::LoginFailed(match len {
        63 | 319 | 351 => LoginState::WrongPassword,
        135 => LoginState::Unknown,
        279 => LoginState::Blocked,
        263 => LoginState::UnknownQqNumber,
        551 | 487 => LoginState::DeviceLock,
        359 => LoginState::TakenBack,
        _ => LoginState::Unknown,
    })
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode one raw frame. The whole packet is rejected on any error.
pub fn decode_frame(raw: &[u8], keys: &KeyRing) -> Result<ServerPacket, DecodeFailure> {
    decode(raw, keys).map_err(|error| {
        tracing::debug!(len = raw.len(), error = %error, "packet decode failed");
        DecodeFailure {
            raw: raw.to_vec(),
            error,
        }
    })
}

fn decode(raw: &[u8], keys: &KeyRing) -> Result<ServerPacket, DecodeError> {
    let frame = Frame::parse(raw)?;
    let kind = classify(&frame);
    tracing::trace!(id = %frame.id(), kind = kind.as_ref(), len = frame.len(), "dispatching packet");

    let body = match kind.decrypters() {
        [] => Vec::new(),
        layers => frame.decrypt(keys, layers)?,
    };
    let mut r = PacketReader::new(&body);

    Ok(match kind {
        PacketKind::Touch => ServerPacket::Touch(decode_touch(&mut r)?),
        PacketKind::KeyExchange(flag) => ServerPacket::KeyExchange(decode_key_exchange(&mut r, flag)?),
        PacketKind::CaptchaInit => ServerPacket::CaptchaInit(decode_captcha_init(&mut r)?),
        PacketKind::LoginSuccess => {
            ServerPacket::LoginSuccess(Box::new(decode_login_success(&mut r)?))
        }
        PacketKind::LoginFailed(state) => ServerPacket::LoginFailed(state),
        PacketKind::SessionKey => ServerPacket::SessionKey {
            session_key: read_key(r.goto(63)?)?,
        },
        PacketKind::LoginDone => ServerPacket::LoginDone,
        PacketKind::SKey => ServerPacket::SKey {
            skey: r.read_string_at(4, 10)?,
        },
        PacketKind::AccountInfo => ServerPacket::AccountInfo { body },
        PacketKind::Heartbeat => ServerPacket::Heartbeat,
        PacketKind::Captcha => ServerPacket::Captcha(decode_captcha(&mut r)?),
        PacketKind::Event => ServerPacket::Event(ServerEvent::decode(frame.id(), &body)?),
        PacketKind::FriendMessageSent => ServerPacket::FriendMessageSent,
        PacketKind::GroupMessageSent => ServerPacket::GroupMessageSent,
        PacketKind::CanAddFriend => ServerPacket::CanAddFriend(decode_can_add_friend(&mut r)?),
        PacketKind::ImageId => ServerPacket::ImageId { body },
        PacketKind::Unknown => {
            tracing::debug!(id = %frame.id(), "unknown packet id");
            ServerPacket::Unknown { id: frame.id() }
        }
    })
}

fn read_key(r: &mut PacketReader<'_>) -> Result<TeaKey, DecodeError> {
    r.read_array::<16>().map(TeaKey::new)
}

fn decode_touch(r: &mut PacketReader<'_>) -> Result<TouchResponse, DecodeError> {
    match r.read_u8()? {
        0xFE => {
            r.skip(94)?;
            Ok(TouchResponse::Redirect {
                server_ip: r.read_ip()?,
            })
        }
        0x00 => {
            r.skip(4)?;
            let token0825 = r.read_bytes(56)?.to_vec();
            r.skip(6)?;
            let login_time = r.read_u32()?;
            let login_ip = r.read_ip()?;
            Ok(TouchResponse::Ok {
                token0825,
                login_time,
                login_ip,
            })
        }
        other => Err(DecodeError::UnknownFlag {
            what: "touch response flag",
            value: format!("{:02X}", other),
        }),
    }
}

fn decode_key_exchange(
    r: &mut PacketReader<'_>,
    flag: KeyExchangeFlag,
) -> Result<KeyExchange, DecodeError> {
    r.skip(5)?;
    let private_key_update = read_key(r)?;
    r.skip(4)?;
    let tlv0006 = r.read_bytes(0x78)?.to_vec();
    let token00ba = if r.remaining() >= 8 + 56 {
        r.skip(8)?;
        Some(r.read_bytes(56)?.to_vec())
    } else {
        None
    };
    Ok(KeyExchange {
        flag,
        private_key_update,
        tlv0006,
        token00ba,
    })
}

fn decode_captcha_init(r: &mut PacketReader<'_>) -> Result<CaptchaInit, DecodeError> {
    r.skip(20)?;
    r.read_lv_bytes()?;
    let captcha_part1 = r.read_lv_bytes()?.to_vec();
    r.skip(2)?;
    let token00ba = r.read_lv_bytes()?.to_vec();
    Ok(CaptchaInit {
        captcha_part1,
        token00ba,
    })
}

fn decode_login_success(r: &mut PacketReader<'_>) -> Result<LoginSuccess, DecodeError> {
    r.skip(7)?;
    let encryption_key = read_key(r)?;
    r.skip(2)?;
    let token38 = r.read_bytes(56)?.to_vec();
    r.skip(60)?;
    let flag: [u8; 2] = r.read_array()?;
    let gap = match flag {
        [0x00, 0x33] => 28,
        [0x01, 0x07] => 0,
        [0x01, 0x10] => 64,
        other => {
            return Err(DecodeError::UnknownFlag {
                what: "login success length flag",
                value: super::hex_groups(&other),
            });
        }
    };
    r.skip(gap)?;
    r.skip(26)?;
    r.skip(2)?;
    let session_response_key = read_key(r)?;
    r.skip(2)?;
    let token88 = r.read_bytes(136)?.to_vec();
    r.skip(299)?;
    let nick_len = r.read_u8()?;
    let nick = r.read_string(nick_len.into())?;
    r.skip(4)?;
    let age = r.read_i16()?;
    r.skip(6)?;
    let gender = if r.read_bool()? {
        Gender::Female
    } else {
        Gender::Male
    };
    Ok(LoginSuccess {
        encryption_key,
        token38,
        session_response_key,
        token88,
        nick,
        age,
        gender,
    })
}

fn decode_captcha(r: &mut PacketReader<'_>) -> Result<CaptchaResponse, DecodeError> {
    match r.read_u8()? {
        0x14 => {
            r.skip(9)?;
            Ok(CaptchaResponse::Correct {
                token00ba: r.read_bytes(56)?.to_vec(),
            })
        }
        0x13 => {
            r.skip(7)?;
            let captcha_token = r.read_lv_bytes()?.to_vec();
            let section = r.read_lv_bytes()?.to_vec();
            r.skip(1)?;
            let completed = r.read_u8()? == 0;
            let token00ba = r.read_lv_bytes()?.to_vec();
            Ok(CaptchaResponse::Transmission {
                captcha_token,
                section,
                completed,
                token00ba,
            })
        }
        other => Err(DecodeError::UnknownFlag {
            what: "captcha response flag",
            value: format!("{:02X}", other),
        }),
    }
}

fn decode_can_add_friend(r: &mut PacketReader<'_>) -> Result<CanAddFriend, DecodeError> {
    if r.remaining() > 20 {
        return Ok(CanAddFriend::AlreadyAdded(r.read_u32()?.into()));
    }
    let qq = u64::from(r.read_u32()?);
    r.read_u8_lv_bytes()?;
    match r.read_u8()? {
        0x00 => Ok(CanAddFriend::ReadyToAdd(qq)),
        0x01 => Ok(CanAddFriend::RequireVerification(qq)),
        0x99 => Ok(CanAddFriend::AlreadyAdded(qq)),
        0x03 | 0x04 => Ok(CanAddFriend::Rejected(qq)),
        other => Err(DecodeError::UnknownFlag {
            what: "can-add-friend state",
            value: format!("{:02X}", other),
        }),
    }
}
