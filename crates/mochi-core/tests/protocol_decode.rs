//! Protocol decoding against captured event bodies, walking the key chain a
//! client follows: session key response, then session-encrypted events.

use mochi_core::message::MessageElement;
use mochi_core::protocol::framer::{HEAD, TAIL};
use mochi_core::protocol::{
    DecodeError, DecrypterKind, EventKind, Frame, KeyRing, OutgoingPacket, PacketId,
    PacketKind, ServerPacket, TeaKey, classify, decode_frame, parse_hex, tea,
};

const QQ: u32 = 1_040_400_290;

const GROUP_TEXT: &str = "22 96 29 7B B4 DF 94 AA 00 01 9F 8E 09 18 85 5B 1F 40 00 52 00 00 00 1B 00 09 00 06 00 01 00 00 00 01 00 0A 00 04 01 00 00 00 00 0C 00 05 00 01 00 01 01 22 96 29 7B 01 3E 03 3F A2 00 03 7E F3 5D 7B 97 57 00 00 F3 32 00 B8 00 01 01 00 00 00 00 00 00 00 4D 53 47 00 00 00 00 00 5D 7B 97 56 7F D0 53 BB 00 00 00 00 0C 00 86 22 00 0C E5 BE AE E8 BD AF E9 9B 85 E9 BB 91 00 00 01 00 12 01 00 0F E9 95 BF E6 96 87 E6 9C AC E6 B6 88 E6 81 AF 0E 00 0E 01 00 04 00 00 00 09 07 00 04 00 00 00 01 19 00 35 01 00 32 AA 02 2F 50 03 60 00 68 00 9A 01 26 08 09 80 01 01 C8 01 00 F0 01 00 F8 01 00 90 02 00 98 03 00 A0 03 20 B0 03 00 B8 03 00 C0 03 00 D0 03 00 E8 03 00 12 00 25 05 00 04 00 00 00 01 08 00 04 00 00 00 01 01 00 09 48 69 6D 31 38 38 6D 6F 65 03 00 01 04 04 00 04 00 00 00 08";

fn server_frame(id: &str, body: &[u8]) -> Vec<u8> {
    let mut raw = vec![HEAD, 0x37, 0x13];
    raw.extend(id.parse::<PacketId>().unwrap().bytes());
    raw.extend(QQ.to_be_bytes());
    raw.extend([0u8; 3]);
    raw.extend_from_slice(body);
    raw.push(TAIL);
    raw
}

#[test]
fn test_session_key_then_group_event() {
    let response_key = TeaKey::new([0x5E; 16]);
    let session_key: TeaKey = "0F 1E 2D 3C 4B 5A 69 78 87 96 A5 B4 C3 D2 E1 F0".parse().unwrap();
    let mut keys = KeyRing::new().with(DecrypterKind::SessionResponse, response_key);

    let mut plain = vec![0u8; 63];
    plain.extend(session_key.as_bytes());
    plain.extend([0u8; 8]);
    let raw = server_frame("08 28 04 34", &tea::encrypt(&plain, &response_key));
    let received = match decode_frame(&raw, &keys).unwrap() {
        ServerPacket::SessionKey { session_key } => session_key,
        other => panic!("expected session key, got {:?}", other),
    };
    assert_eq!(received, session_key);
    keys.insert(DecrypterKind::Session, received);

    let body = parse_hex(GROUP_TEXT).unwrap();
    let raw = server_frame("00 17 4A 21", &tea::encrypt(&body, &session_key));
    let event = match decode_frame(&raw, &keys).unwrap() {
        ServerPacket::Event(event) => event,
        other => panic!("expected event, got {:?}", other),
    };
    match &event.kind {
        EventKind::GroupMessage {
            group,
            sender,
            sender_name,
            message,
        } => {
            assert_eq!(*group, 580_266_363);
            assert_eq!(*sender, 1_040_400_290);
            assert_eq!(sender_name.as_deref(), Some("Him188moe"));
            assert_eq!(
                message.elements(),
                [MessageElement::Text("长文本消息".into())]
            );
        }
        other => panic!("expected group message, got {:?}", other),
    }
    assert_eq!(
        event.to_string(),
        "[group 580266363] Him188moe(1040400290): 长文本消息"
    );

    // the acknowledgement echoes the id and carries the identity
    let ack = OutgoingPacket::event_ack(QQ, event.packet_id, &event.identity, session_key);
    let encoded = ack.encode([0x37, 0x13]);
    assert_eq!(&encoded[3..7], event.packet_id.bytes());
    let prelude_end = 11 + ack.prelude().len();
    let cipher = &encoded[prelude_end..encoded.len() - 1];
    assert_eq!(tea::decrypt(cipher, &session_key).unwrap(), event.identity);
}

#[test]
fn test_event_without_session_key_fails_with_raw_bytes() {
    let body = parse_hex(GROUP_TEXT).unwrap();
    let raw = server_frame("00 CE 00 01", &tea::encrypt(&body, &TeaKey::new([1; 16])));
    let failure = decode_frame(&raw, &KeyRing::new()).unwrap_err();
    assert!(matches!(
        failure.error,
        DecodeError::MissingKey(DecrypterKind::Session)
    ));
    assert_eq!(failure.raw, raw);

    // the wrong session key is caught by the padding check
    let keys = KeyRing::uniform(TeaKey::new([2; 16]));
    let failure = decode_frame(&raw, &keys).unwrap_err();
    assert!(matches!(failure.error, DecodeError::Decrypt(_)));
}

#[test]
fn test_outgoing_heartbeat_classifies_as_heartbeat() {
    let packet = OutgoingPacket::heartbeat(QQ, 7, TeaKey::new([9; 16]));
    let raw = packet.encode([0x37, 0x13]);
    let frame = Frame::parse(&raw).unwrap();
    assert_eq!(frame.id(), PacketId::new([0x00, 0x58], 7));
    assert_eq!(frame.header().qq, QQ);
    assert_eq!(classify(&frame), PacketKind::Heartbeat);
    assert_eq!(
        decode_frame(&raw, &KeyRing::new()).unwrap(),
        ServerPacket::Heartbeat
    );
}
