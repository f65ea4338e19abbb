use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::utils::error::ProtocolError;

const CONNECT: u8 = 1;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const PUBACK: u8 = 4;
const SUBSCRIBE: u8 = 8;
const SUBACK: u8 = 9;
const PINGREQ: u8 = 12;
const PINGRESP: u8 = 13;
const DISCONNECT: u8 = 14;

/// Largest value the variable-length "remaining length" field can carry.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(ProtocolError::InvalidQos(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: u16,
    pub clean_session: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted,
    UnacceptableProtocol,
    IdentifierRejected,
    ServerUnavailable,
    BadCredentials,
    NotAuthorized,
    Other(u8),
}

impl From<u8> for ConnectReturnCode {
    fn from(code: u8) -> Self {
        match code {
            0 => ConnectReturnCode::Accepted,
            1 => ConnectReturnCode::UnacceptableProtocol,
            2 => ConnectReturnCode::IdentifierRejected,
            3 => ConnectReturnCode::ServerUnavailable,
            4 => ConnectReturnCode::BadCredentials,
            5 => ConnectReturnCode::NotAuthorized,
            other => ConnectReturnCode::Other(other),
        }
    }
}

impl ConnectReturnCode {
    fn as_u8(self) -> u8 {
        match self {
            ConnectReturnCode::Accepted => 0,
            ConnectReturnCode::UnacceptableProtocol => 1,
            ConnectReturnCode::IdentifierRejected => 2,
            ConnectReturnCode::ServerUnavailable => 3,
            ConnectReturnCode::BadCredentials => 4,
            ConnectReturnCode::NotAuthorized => 5,
            ConnectReturnCode::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub code: ConnectReturnCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    /// Present iff `qos` is above `AtMostOnce`.
    pub pkid: Option<u16>,
}

impl Publish {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS, pkid: u16) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
            dup: false,
            pkid: (qos != QoS::AtMostOnce).then_some(pkid),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub pkid: u16,
    pub filters: Vec<(String, QoS)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReturnCode {
    Success(QoS),
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub pkid: u16,
    pub codes: Vec<SubscribeReturnCode>,
}

/// Control packets exchanged between this client and the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(u16),
    Subscribe(Subscribe),
    SubAck(SubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Appends the wire form of `self` to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        let header = match self {
            Packet::Connect(connect) => {
                write_string(&mut body, PROTOCOL_NAME)?;
                body.put_u8(PROTOCOL_LEVEL);
                let mut flags = 0u8;
                if connect.username.is_some() {
                    flags |= 0x80;
                }
                if connect.password.is_some() {
                    flags |= 0x40;
                }
                if connect.clean_session {
                    flags |= 0x02;
                }
                body.put_u8(flags);
                body.put_u16(connect.keep_alive);
                write_string(&mut body, &connect.client_id)?;
                if let Some(username) = &connect.username {
                    write_string(&mut body, username)?;
                }
                if let Some(password) = &connect.password {
                    write_string(&mut body, password)?;
                }
                CONNECT << 4
            }
            Packet::ConnAck(ack) => {
                body.put_u8(u8::from(ack.session_present));
                body.put_u8(ack.code.as_u8());
                CONNACK << 4
            }
            Packet::Publish(publish) => {
                write_string(&mut body, &publish.topic)?;
                if publish.qos != QoS::AtMostOnce {
                    let pkid = publish
                        .pkid
                        .ok_or(ProtocolError::Malformed("qos > 0 publish without packet id"))?;
                    body.put_u16(pkid);
                }
                body.put_slice(&publish.payload);
                let mut flags = (publish.qos as u8) << 1;
                if publish.dup {
                    flags |= 0x08;
                }
                if publish.retain {
                    flags |= 0x01;
                }
                (PUBLISH << 4) | flags
            }
            Packet::PubAck(pkid) => {
                body.put_u16(*pkid);
                PUBACK << 4
            }
            Packet::Subscribe(subscribe) => {
                if subscribe.filters.is_empty() {
                    return Err(ProtocolError::Malformed("subscribe without topic filters"));
                }
                body.put_u16(subscribe.pkid);
                for (filter, qos) in &subscribe.filters {
                    write_string(&mut body, filter)?;
                    body.put_u8(*qos as u8);
                }
                (SUBSCRIBE << 4) | 0x02
            }
            Packet::SubAck(ack) => {
                body.put_u16(ack.pkid);
                for code in &ack.codes {
                    body.put_u8(match code {
                        SubscribeReturnCode::Success(qos) => *qos as u8,
                        SubscribeReturnCode::Failure => 0x80,
                    });
                }
                SUBACK << 4
            }
            Packet::PingReq => PINGREQ << 4,
            Packet::PingResp => PINGRESP << 4,
            Packet::Disconnect => DISCONNECT << 4,
        };

        buf.put_u8(header);
        write_remaining_length(buf, body.len())?;
        buf.extend_from_slice(&body);
        Ok(())
    }

    /// Removes one complete packet from the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched while the packet is
    /// still incomplete.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Packet>, ProtocolError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let Some((remaining, len_bytes)) = read_remaining_length(&buf[1..])? else {
            return Ok(None);
        };
        let total = 1 + len_bytes + remaining;
        if buf.len() < total {
            return Ok(None);
        }

        let mut frame = buf.split_to(total);
        let header = frame.get_u8();
        frame.advance(len_bytes);
        let mut body = frame.freeze();

        let packet = match header >> 4 {
            CONNACK => {
                ensure_len(&body, 2)?;
                let flags = body.get_u8();
                let code = ConnectReturnCode::from(body.get_u8());
                Packet::ConnAck(ConnAck {
                    session_present: flags & 0x01 == 0x01,
                    code,
                })
            }
            PUBLISH => {
                let qos = QoS::from_u8((header >> 1) & 0x03)?;
                let topic = read_string(&mut body)?;
                let pkid = if qos == QoS::AtMostOnce {
                    None
                } else {
                    ensure_len(&body, 2)?;
                    Some(body.get_u16())
                };
                Packet::Publish(Publish {
                    topic,
                    payload: body,
                    qos,
                    retain: header & 0x01 == 0x01,
                    dup: header & 0x08 == 0x08,
                    pkid,
                })
            }
            PUBACK => {
                ensure_len(&body, 2)?;
                Packet::PubAck(body.get_u16())
            }
            SUBACK => {
                ensure_len(&body, 2)?;
                let pkid = body.get_u16();
                let mut codes = Vec::with_capacity(body.remaining());
                while body.has_remaining() {
                    let code = body.get_u8();
                    codes.push(if code == 0x80 {
                        SubscribeReturnCode::Failure
                    } else {
                        SubscribeReturnCode::Success(QoS::from_u8(code)?)
                    });
                }
                Packet::SubAck(SubAck { pkid, codes })
            }
            PINGREQ => Packet::PingReq,
            PINGRESP => Packet::PingResp,
            DISCONNECT => Packet::Disconnect,
            other => return Err(ProtocolError::UnsupportedPacketType(other)),
        };

        Ok(Some(packet))
    }
}

fn ensure_len(body: &Bytes, needed: usize) -> Result<(), ProtocolError> {
    if body.remaining() < needed {
        Err(ProtocolError::Malformed("packet shorter than its header claims"))
    } else {
        Ok(())
    }
}

fn write_string(buf: &mut BytesMut, value: &str) -> Result<(), ProtocolError> {
    let len = u16::try_from(value.len()).map_err(|_| ProtocolError::StringTooLong)?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn read_string(body: &mut Bytes) -> Result<String, ProtocolError> {
    ensure_len(body, 2)?;
    let len = body.get_u16() as usize;
    ensure_len(body, len)?;
    let raw = body.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

fn write_remaining_length(buf: &mut BytesMut, mut len: usize) -> Result<(), ProtocolError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::PayloadTooLarge(len));
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if len == 0 {
            return Ok(());
        }
    }
}

/// Returns `(value, bytes used)` or `None` if more bytes are needed.
fn read_remaining_length(bytes: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, byte) in bytes.iter().enumerate() {
        if i >= 4 {
            return Err(ProtocolError::MalformedRemainingLength);
        }
        value += (*byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    if bytes.len() >= 4 {
        return Err(ProtocolError::MalformedRemainingLength);
    }
    Ok(None)
}
