use bytes::BytesMut;

use super::*;
use crate::utils::error::ProtocolError;

fn encoded(packet: &Packet) -> BytesMut {
    let mut buf = BytesMut::new();
    packet.encode(&mut buf).unwrap();
    buf
}

#[test]
fn test_connect_encoding_sets_flags_and_fields() {
    let buf = encoded(&Packet::Connect(Connect {
        client_id: "alex_dashboard_1a2b3c4d".to_string(),
        username: Some("user".to_string()),
        password: Some("pw".to_string()),
        keep_alive: 60,
        clean_session: true,
    }));

    assert_eq!(buf[0], 0x10);
    assert_eq!(buf[1] as usize, buf.len() - 2);
    assert_eq!(&buf[2..8], &[0, 4, b'M', b'Q', b'T', b'T']);
    assert_eq!(buf[8], 4);
    assert_eq!(buf[9], 0x80 | 0x40 | 0x02);
    assert_eq!(&buf[10..12], &[0, 60]);
    assert!(buf.ends_with(&[0, 2, b'p', b'w']));
}

#[test]
fn test_connect_without_credentials_clears_flags() {
    let buf = encoded(&Packet::Connect(Connect {
        client_id: "c".to_string(),
        username: None,
        password: None,
        keep_alive: 30,
        clean_session: false,
    }));
    assert_eq!(buf[9], 0);
}

#[test]
fn test_subscribe_encoding_is_batched() {
    let buf = encoded(&Packet::Subscribe(Subscribe {
        pkid: 7,
        filters: vec![
            ("gacor/1".to_string(), QoS::AtLeastOnce),
            ("/note/status".to_string(), QoS::AtLeastOnce),
        ],
    }));

    assert_eq!(buf[0], 0x82);
    assert_eq!(&buf[2..4], &[0, 7]);
    assert_eq!(&buf[4..6], &[0, 7]);
    assert_eq!(&buf[6..13], b"gacor/1");
    assert_eq!(buf[13], 1);
    assert_eq!(*buf.last().unwrap(), 1);
}

#[test]
fn test_subscribe_without_filters_is_rejected() {
    let mut buf = BytesMut::new();
    let err = Packet::Subscribe(Subscribe {
        pkid: 1,
        filters: Vec::new(),
    })
    .encode(&mut buf)
    .unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
}

#[test]
fn test_decode_connack() {
    let mut buf = BytesMut::from(&[0x20, 0x02, 0x01, 0x05][..]);
    let packet = Packet::decode(&mut buf).unwrap().unwrap();
    assert_eq!(
        packet,
        Packet::ConnAck(ConnAck {
            session_present: true,
            code: ConnectReturnCode::NotAuthorized,
        })
    );
    assert!(buf.is_empty());
}

#[test]
fn test_decode_qos1_publish() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[0x32, 0x0D, 0x00, 0x07]);
    buf.extend_from_slice(b"gacor/1");
    buf.extend_from_slice(&[0x00, 0x2A]);
    buf.extend_from_slice(b"{}");

    match Packet::decode(&mut buf).unwrap().unwrap() {
        Packet::Publish(publish) => {
            assert_eq!(publish.topic, "gacor/1");
            assert_eq!(publish.qos, QoS::AtLeastOnce);
            assert_eq!(publish.pkid, Some(42));
            assert_eq!(&publish.payload[..], b"{}");
        }
        other => panic!("expected publish, got {other:?}"),
    }
}

#[test]
fn test_publish_survives_the_wire() {
    let original = Packet::Publish(Publish::new(
        "dashboard/request",
        "GET",
        QoS::AtLeastOnce,
        9,
    ));
    let mut buf = encoded(&original);
    assert_eq!(Packet::decode(&mut buf).unwrap(), Some(original));
}

#[test]
fn test_qos0_publish_carries_no_packet_id() {
    let publish = Publish::new("x", "y", QoS::AtMostOnce, 5);
    assert_eq!(publish.pkid, None);
}

#[test]
fn test_decode_suback_with_failure() {
    let mut buf = BytesMut::from(&[0x90, 0x05, 0x00, 0x01, 0x01, 0x80, 0x00][..]);
    let packet = Packet::decode(&mut buf).unwrap().unwrap();
    assert_eq!(
        packet,
        Packet::SubAck(SubAck {
            pkid: 1,
            codes: vec![
                SubscribeReturnCode::Success(QoS::AtLeastOnce),
                SubscribeReturnCode::Failure,
                SubscribeReturnCode::Success(QoS::AtMostOnce),
            ],
        })
    );
}

#[test]
fn test_partial_packet_waits_for_more_bytes() {
    let full = encoded(&Packet::Publish(Publish::new(
        "memory/stats/response",
        vec![b'a'; 300],
        QoS::AtMostOnce,
        0,
    )));
    // 300+ byte body needs a two-byte remaining length.
    assert_eq!(full[1] & 0x80, 0x80);

    let mut buf = BytesMut::from(&full[..1]);
    assert_eq!(Packet::decode(&mut buf).unwrap(), None);
    buf.extend_from_slice(&full[1..100]);
    assert_eq!(Packet::decode(&mut buf).unwrap(), None);
    assert_eq!(buf.len(), 100);

    buf.extend_from_slice(&full[100..]);
    assert!(matches!(
        Packet::decode(&mut buf).unwrap(),
        Some(Packet::Publish(_))
    ));
    assert!(buf.is_empty());
}

#[test]
fn test_two_packets_in_one_frame() {
    let mut buf = encoded(&Packet::PingResp);
    buf.extend_from_slice(&encoded(&Packet::PubAck(3)));

    assert_eq!(Packet::decode(&mut buf).unwrap(), Some(Packet::PingResp));
    assert_eq!(Packet::decode(&mut buf).unwrap(), Some(Packet::PubAck(3)));
    assert_eq!(Packet::decode(&mut buf).unwrap(), None);
}

#[test]
fn test_malformed_remaining_length() {
    let mut buf = BytesMut::from(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01][..]);
    assert_eq!(
        Packet::decode(&mut buf).unwrap_err(),
        ProtocolError::MalformedRemainingLength
    );
}

#[test]
fn test_unsupported_inbound_packet_type() {
    // UNSUBACK is never requested by this client.
    let mut buf = BytesMut::from(&[0xB0, 0x02, 0x00, 0x01][..]);
    assert_eq!(
        Packet::decode(&mut buf).unwrap_err(),
        ProtocolError::UnsupportedPacketType(11)
    );
}

#[test]
fn test_invalid_utf8_topic() {
    let mut buf = BytesMut::from(&[0x30, 0x04, 0x00, 0x02, 0xC3, 0x28][..]);
    assert_eq!(
        Packet::decode(&mut buf).unwrap_err(),
        ProtocolError::InvalidUtf8
    );
}
