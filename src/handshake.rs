//! # BitTorrent Handshake Protocol
//!
//! The handshake is the first exchange on every peer connection. It is a
//! fixed 68-byte message:
//!
//! ```text
//! <pstrlen><pstr><reserved><info_hash><peer_id>
//! ```
//!
//! - **pstrlen**: 1 byte, always 19
//! - **pstr**: 19 bytes, "BitTorrent protocol"
//! - **reserved**: 8 bytes, all zeros
//! - **info_hash**: 20 bytes, SHA-1 of the torrent's info dictionary
//! - **peer_id**: 20 bytes, identifier of the sender
//!
//! A reply is accepted only if the length byte, the protocol string and the
//! info hash all match what we sent.

use crate::error::{Error, Result};

pub const PROTOCOL_ID: &[u8; 19] = b"BitTorrent protocol";

/// Total size of a handshake message in bytes
pub const HANDSHAKE_LEN: usize = 68;

/// A BitTorrent handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// 8 reserved bytes for protocol extensions (all zeros when sent)
    pub reserved: [u8; 8],
    /// 20-byte SHA-1 hash of the torrent's info dictionary
    pub info_hash: [u8; 20],
    /// 20-byte identifier of the sending peer
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Handshake {
            reserved: [0; 8],
            info_hash,
            peer_id,
        }
    }

    pub fn serialize(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0] = PROTOCOL_ID.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL_ID);
        buf[20..28].copy_from_slice(&self.reserved);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }
}

/// Decode a received handshake, checking the length byte and protocol string.
pub fn deserialize_handshake(buf: &[u8; HANDSHAKE_LEN]) -> Result<Handshake> {
    if buf[0] as usize != PROTOCOL_ID.len() {
        return Err(Error::HandshakeFailed(format!(
            "invalid protocol length {}",
            buf[0]
        )));
    }
    if &buf[1..20] != PROTOCOL_ID {
        return Err(Error::HandshakeFailed(format!(
            "invalid protocol string {:?}",
            String::from_utf8_lossy(&buf[1..20])
        )));
    }

    let mut handshake = Handshake::new([0; 20], [0; 20]);
    handshake.reserved.copy_from_slice(&buf[20..28]);
    handshake.info_hash.copy_from_slice(&buf[28..48]);
    handshake.peer_id.copy_from_slice(&buf[48..68]);

    Ok(handshake)
}

/// Decode a reply and check that it is for the expected torrent.
pub fn validate_handshake(buf: &[u8; HANDSHAKE_LEN], info_hash: &[u8; 20]) -> Result<Handshake> {
    let handshake = deserialize_handshake(buf)?;
    if &handshake.info_hash != info_hash {
        return Err(Error::HandshakeFailed("info hash mismatch".into()));
    }
    Ok(handshake)
}
