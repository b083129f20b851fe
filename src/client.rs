//! # BitTorrent Peer Client
//!
//! This module drives the peer wire protocol over one TCP connection. The
//! exchange is strictly sequential:
//!
//! 1. **Handshake**: send ours, read and validate the 68-byte reply
//! 2. **Bitfield**: the first message from the peer must be BITFIELD
//! 3. **Interest**: send INTERESTED, the next message must be UNCHOKE
//! 4. **Block loop**: for each block, send REQUEST and read the PIECE reply
//!
//! The bitfield content is not consulted: peers are assumed to hold every
//! piece. Keep-alive frames are skipped wherever a message is awaited; any
//! other unexpected message aborts the attempt with a protocol violation.
//!
//! Every read and write on the socket is bounded by the configured I/O
//! timeout, so a silent peer cannot wedge a worker.

use crate::error::{Error, Result};
use crate::handshake::*;
use crate::message::*;
use crate::peer::*;
use crate::piece::*;

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// A connection to a remote peer.
pub struct Client {
    /// Address of the remote peer
    peer: PeerAddress,
    /// 20-byte identifier of this client
    peer_id: [u8; 20],
    /// 20-byte SHA-1 hash of the torrent's info dictionary
    info_hash: [u8; 20],
    /// TCP stream connection to the peer
    conn: TcpStream,
    /// Bitfield announced by the peer
    bitfield: Vec<u8>,
}

impl Client {
    /// Open a TCP connection to a peer and apply the I/O timeout.
    pub fn connect(
        peer: PeerAddress,
        peer_id: [u8; 20],
        info_hash: [u8; 20],
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Client> {
        let conn = TcpStream::connect_timeout(&peer.socket_addr(), connect_timeout)?;
        conn.set_read_timeout(Some(io_timeout))?;
        conn.set_write_timeout(Some(io_timeout))?;
        conn.set_nodelay(true)?;

        debug!("Connected to peer {}", peer);

        Ok(Client {
            peer,
            peer_id,
            info_hash,
            conn,
            bitfield: vec![],
        })
    }

    /// Bitfield received from the peer, empty until [`Client::read_bitfield`].
    pub fn bitfield(&self) -> &[u8] {
        &self.bitfield
    }

    /// A second handle on the socket, used to force it closed from another thread.
    pub fn try_clone_stream(&self) -> Result<TcpStream> {
        Ok(self.conn.try_clone()?)
    }

    /// Exchange and validate handshakes.
    pub fn handshake(&mut self) -> Result<Handshake> {
        let handshake = Handshake::new(self.info_hash, self.peer_id);

        self.conn
            .write_all(&handshake.serialize())
            .map_err(|e| Error::HandshakeFailed(format!("could not send handshake: {}", e)))?;

        let mut reply = [0u8; HANDSHAKE_LEN];
        self.conn
            .read_exact(&mut reply)
            .map_err(|e| Error::HandshakeFailed(format!("could not read handshake: {}", e)))?;

        let reply = validate_handshake(&reply, &self.info_hash)?;

        debug!("Handshake completed with peer {}", self.peer);

        Ok(reply)
    }

    /// Read the next message that is not a keep-alive.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            let message = read_message(&mut self.conn)?;
            if message.is_keep_alive() {
                debug!("Receive KEEP_ALIVE from peer {}", self.peer);
                continue;
            }
            debug!(
                "Receive MESSAGE_{} from peer {}",
                message_name(message.id),
                self.peer
            );
            return Ok(message);
        }
    }

    /// Read the next message and require it to carry `id`.
    fn expect_message(&mut self, id: MessageId) -> Result<Message> {
        let message = self.read_message()?;
        if message.id != id {
            return Err(Error::ProtocolViolation(format!(
                "expected MESSAGE_{}, got MESSAGE_{} ({})",
                message_name(id),
                message_name(message.id),
                message.id
            )));
        }
        Ok(message)
    }

    pub fn send(&mut self, message: &Message) -> Result<()> {
        debug!(
            "Send MESSAGE_{} to peer {}",
            message_name(message.id),
            self.peer
        );
        self.conn.write_all(&message.serialize())?;
        Ok(())
    }

    /// The first message after the handshake must be BITFIELD.
    pub fn read_bitfield(&mut self) -> Result<()> {
        let message = self.expect_message(MESSAGE_BITFIELD)?;
        self.bitfield = message.payload;
        Ok(())
    }

    pub fn send_interested(&mut self) -> Result<()> {
        self.send(&Message::new(MESSAGE_INTERESTED))
    }

    /// Wait for the peer to unchoke us.
    pub fn read_unchoke(&mut self) -> Result<()> {
        self.expect_message(MESSAGE_UNCHOKE)?;
        Ok(())
    }

    /// Request every block of `piece_work` in order and copy the replies in.
    pub fn download_blocks(&mut self, piece_work: &mut PieceWork, block_size: u32) -> Result<()> {
        for (begin, length) in piece_work.blocks(block_size) {
            self.send(&Message::request(piece_work.index, begin, length))?;

            let message = self.expect_message(MESSAGE_PIECE)?;
            let (index, block_begin, block) = parse_piece_payload(&message.payload)?;

            if index != piece_work.index || block_begin != begin {
                return Err(Error::ProtocolViolation(format!(
                    "requested piece {} at {}, received piece {} at {}",
                    piece_work.index, begin, index, block_begin
                )));
            }
            if block.len() != length as usize {
                return Err(Error::ProtocolViolation(format!(
                    "requested {} bytes, received {}",
                    length,
                    block.len()
                )));
            }

            piece_work.write_block(begin, block)?;
        }

        Ok(())
    }

    /// Run the full exchange for one piece: handshake, bitfield, interest, blocks.
    pub fn fetch_piece(&mut self, piece_work: &mut PieceWork, block_size: u32) -> Result<()> {
        self.handshake()?;
        self.read_bitfield()?;
        self.send_interested()?;
        self.read_unchoke()?;
        self.download_blocks(piece_work, block_size)?;

        debug!(
            "Downloaded piece {} ({} bytes) from peer {}",
            piece_work.index, piece_work.length, self.peer
        );

        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.conn.shutdown(Shutdown::Both);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}
