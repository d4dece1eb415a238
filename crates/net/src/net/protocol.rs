use glam::Vec2;

use super::reader::{ByteReader, CodecError};

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_MAGIC: [u8; 4] = *b"PONG";
pub const DEFAULT_PORT: u16 = 42069;
pub const DEFAULT_TICK_RATE: u32 = 60;
pub const DEFAULT_TIMEOUT_SECS: f32 = 10.0;
pub const PLAYER_SLOTS: usize = 2;

const SEQUENCE_WRAP_THRESHOLD: u16 = u16::MAX / 2;

/// Wrap-aware "newer than" for 16-bit sequence numbers.
#[inline]
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    Request = 1,
    Accept = 2,
    Reject = 3,
    Disconnect = 4,
    Update = 5,
    Heartbeat = 6,
}

impl MessageTag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Request),
            2 => Some(Self::Accept),
            3 => Some(Self::Reject),
            4 => Some(Self::Disconnect),
            5 => Some(Self::Update),
            6 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// Which UPDATE body the decoder should expect. Both directions share tag 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateLayout {
    FromClient,
    FromServer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientUpdate {
    pub client_id: u32,
    pub sequence: u16,
    pub paddle_y: f32,
}

impl ClientUpdate {
    pub const WIRE_SIZE: usize = 4 + 2 + 4;
}

/// Snapshot of the whole match as the server sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerUpdate {
    pub sequence: u16,
    pub paddles: [f32; PLAYER_SLOTS],
    pub scores: [u8; PLAYER_SLOTS],
    pub ball: Vec2,
}

impl ServerUpdate {
    pub const WIRE_SIZE: usize = 2 + 4 * 2 + 2 + 4 * 2;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Request,
    Accept { client_id: u32 },
    Reject,
    Disconnect { peer_id: u32 },
    ClientUpdate(ClientUpdate),
    ServerUpdate(ServerUpdate),
    Heartbeat { peer_id: u32 },
    Unknown(u8),
}

impl Message {
    /// The first byte on the wire.
    pub fn tag_byte(&self) -> u8 {
        match self {
            Message::Request => MessageTag::Request as u8,
            Message::Accept { .. } => MessageTag::Accept as u8,
            Message::Reject => MessageTag::Reject as u8,
            Message::Disconnect { .. } => MessageTag::Disconnect as u8,
            Message::ClientUpdate(_) | Message::ServerUpdate(_) => MessageTag::Update as u8,
            Message::Heartbeat { .. } => MessageTag::Heartbeat as u8,
            Message::Unknown(byte) => *byte,
        }
    }

    /// Serializes the message body. The transport adds the magic header.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + ServerUpdate::WIRE_SIZE);
        self.encode_into(&mut buf);
        buf
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag_byte());

        match *self {
            Message::Request | Message::Reject | Message::Unknown(_) => {}
            Message::Accept { client_id } => buf.extend_from_slice(&client_id.to_le_bytes()),
            Message::Disconnect { peer_id } | Message::Heartbeat { peer_id } => {
                buf.extend_from_slice(&peer_id.to_le_bytes())
            }
            Message::ClientUpdate(update) => {
                buf.extend_from_slice(&update.client_id.to_le_bytes());
                buf.extend_from_slice(&update.sequence.to_le_bytes());
                buf.extend_from_slice(&update.paddle_y.to_le_bytes());
            }
            Message::ServerUpdate(update) => {
                buf.extend_from_slice(&update.sequence.to_le_bytes());
                for paddle in update.paddles {
                    buf.extend_from_slice(&paddle.to_le_bytes());
                }
                buf.extend_from_slice(&update.scores);
                buf.extend_from_slice(&update.ball.x.to_le_bytes());
                buf.extend_from_slice(&update.ball.y.to_le_bytes());
            }
        }
    }

    /// Decodes one message starting at the reader's cursor.
    ///
    /// An unrecognized tag yields [`Message::Unknown`] with only the tag
    /// byte consumed.
    pub fn decode(reader: &mut ByteReader<'_>, layout: UpdateLayout) -> Result<Self, CodecError> {
        let byte = reader.read_u8()?;
        let Some(tag) = MessageTag::from_byte(byte) else {
            return Ok(Message::Unknown(byte));
        };

        let message = match tag {
            MessageTag::Request => Message::Request,
            MessageTag::Accept => Message::Accept {
                client_id: reader.read_u32()?,
            },
            MessageTag::Reject => Message::Reject,
            MessageTag::Disconnect => Message::Disconnect {
                peer_id: reader.read_u32()?,
            },
            MessageTag::Heartbeat => Message::Heartbeat {
                peer_id: reader.read_u32()?,
            },
            MessageTag::Update => match layout {
                UpdateLayout::FromClient => Message::ClientUpdate(decode_client_update(reader)?),
                UpdateLayout::FromServer => Message::ServerUpdate(decode_server_update(reader)?),
            },
        };

        Ok(message)
    }
}

// The body is checked against the payload length up front so a truncated
// update never leaves the cursor halfway through its fields.
fn ensure_body(reader: &ByteReader<'_>, needed: usize) -> Result<(), CodecError> {
    let available = reader.remaining();
    if available < needed {
        return Err(CodecError::TruncatedMessage { needed, available });
    }
    Ok(())
}

fn decode_client_update(reader: &mut ByteReader<'_>) -> Result<ClientUpdate, CodecError> {
    ensure_body(reader, ClientUpdate::WIRE_SIZE)?;
    Ok(ClientUpdate {
        client_id: reader.read_u32()?,
        sequence: reader.read_u16()?,
        paddle_y: reader.read_f32()?,
    })
}

fn decode_server_update(reader: &mut ByteReader<'_>) -> Result<ServerUpdate, CodecError> {
    ensure_body(reader, ServerUpdate::WIRE_SIZE)?;
    let sequence = reader.read_u16()?;
    let paddles = [reader.read_f32()?, reader.read_f32()?];
    let scores = [reader.read_u8()?, reader.read_u8()?];
    let ball = Vec2::new(reader.read_f32()?, reader.read_f32()?);

    Ok(ServerUpdate {
        sequence,
        paddles,
        scores,
        ball,
    })
}
