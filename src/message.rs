//! # BitTorrent Peer Wire Messages
//!
//! Every message after the handshake is framed as:
//!
//! ```text
//! <length prefix><message ID><payload>
//! ```
//!
//! - **Length Prefix**: 4 bytes (big-endian u32), counts the id byte plus payload
//! - **Message ID**: 1 byte
//! - **Payload**: `length - 1` bytes
//!
//! A frame with length 0 is a keep-alive and carries neither id nor payload.
//!
//! | ID | Name | Payload |
//! |----|------|---------|
//! | 0 | CHOKE | none |
//! | 1 | UNCHOKE | none |
//! | 2 | INTERESTED | none |
//! | 3 | NOT INTERESTED | none |
//! | 4 | HAVE | piece index |
//! | 5 | BITFIELD | bitfield |
//! | 6 | REQUEST | index, begin, length |
//! | 7 | PIECE | index, begin, block |
//! | 8 | CANCEL | index, begin, length |

use crate::error::{Error, Result};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use std::io::Read;

pub type MessageId = u8;

pub const MESSAGE_CHOKE: MessageId = 0;
pub const MESSAGE_UNCHOKE: MessageId = 1;
pub const MESSAGE_INTERESTED: MessageId = 2;
pub const MESSAGE_NOT_INTERESTED: MessageId = 3;
pub const MESSAGE_HAVE: MessageId = 4;
pub const MESSAGE_BITFIELD: MessageId = 5;
pub const MESSAGE_REQUEST: MessageId = 6;
pub const MESSAGE_PIECE: MessageId = 7;
pub const MESSAGE_CANCEL: MessageId = 8;
/// Not a wire id: marks a zero-length keep-alive frame
pub const MESSAGE_KEEPALIVE: MessageId = 255;

/// Frames longer than this are rejected before allocating.
pub const MAX_MESSAGE_LEN: usize = 1 << 21;

/// Size of the index/begin header in a PIECE payload
const PIECE_HEADER_LEN: usize = 8;

pub fn message_name(id: MessageId) -> &'static str {
    match id {
        MESSAGE_CHOKE => "CHOKE",
        MESSAGE_UNCHOKE => "UNCHOKE",
        MESSAGE_INTERESTED => "INTERESTED",
        MESSAGE_NOT_INTERESTED => "NOT_INTERESTED",
        MESSAGE_HAVE => "HAVE",
        MESSAGE_BITFIELD => "BITFIELD",
        MESSAGE_REQUEST => "REQUEST",
        MESSAGE_PIECE => "PIECE",
        MESSAGE_CANCEL => "CANCEL",
        MESSAGE_KEEPALIVE => "KEEP_ALIVE",
        _ => "UNKNOWN",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type identifier
    pub id: MessageId,
    /// Message payload data
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(id: MessageId) -> Self {
        Message {
            id,
            payload: vec![],
        }
    }

    pub fn new_with_payload(id: MessageId, payload: Vec<u8>) -> Self {
        Message { id, payload }
    }

    pub fn keep_alive() -> Self {
        Message::new(MESSAGE_KEEPALIVE)
    }

    pub fn is_keep_alive(&self) -> bool {
        self.id == MESSAGE_KEEPALIVE
    }

    /// REQUEST for `length` bytes at `begin` within piece `index`.
    pub fn request(index: u32, begin: u32, length: u32) -> Self {
        let mut payload = Vec::with_capacity(12);
        for field in [index, begin, length] {
            // Writing into a Vec cannot fail
            let _ = payload.write_u32::<BigEndian>(field);
        }
        Message::new_with_payload(MESSAGE_REQUEST, payload)
    }

    /// PIECE carrying `block` at `begin` within piece `index`.
    pub fn piece(index: u32, begin: u32, block: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(PIECE_HEADER_LEN + block.len());
        let _ = payload.write_u32::<BigEndian>(index);
        let _ = payload.write_u32::<BigEndian>(begin);
        payload.extend_from_slice(block);
        Message::new_with_payload(MESSAGE_PIECE, payload)
    }

    /// Serialize message, including its length prefix.
    pub fn serialize(&self) -> Vec<u8> {
        if self.is_keep_alive() {
            return vec![0; 4];
        }

        let message_len = 1 + self.payload.len();
        let mut serialized: Vec<u8> = Vec::with_capacity(4 + message_len);
        let _ = serialized.write_u32::<BigEndian>(message_len as u32);
        serialized.push(self.id);
        serialized.extend_from_slice(&self.payload);

        serialized
    }
}

/// Read one framed message.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    let message_len = reader.read_u32::<BigEndian>()? as usize;

    // If message length is 0, it's a keep-alive
    if message_len == 0 {
        return Ok(Message::keep_alive());
    }
    if message_len > MAX_MESSAGE_LEN {
        return Err(Error::ProtocolViolation(format!(
            "message length {} exceeds limit",
            message_len
        )));
    }

    let id = reader.read_u8()?;
    let mut payload = vec![0; message_len - 1];
    reader.read_exact(&mut payload)?;

    Ok(Message::new_with_payload(id, payload))
}

/// Split a PIECE payload into `(index, begin, block)`.
pub fn parse_piece_payload(payload: &[u8]) -> Result<(u32, u32, &[u8])> {
    if payload.len() < PIECE_HEADER_LEN {
        return Err(Error::ProtocolViolation(format!(
            "PIECE payload of {} bytes is too short",
            payload.len()
        )));
    }
    let index = BigEndian::read_u32(&payload[0..4]);
    let begin = BigEndian::read_u32(&payload[4..8]);
    Ok((index, begin, &payload[PIECE_HEADER_LEN..]))
}
