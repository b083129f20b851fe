//! # Piece Work
//!
//! A piece is the unit of verification: its SHA-1 is listed in the torrent
//! metadata. Pieces are fetched from peers in blocks of 16 KiB, the last block
//! truncated to whatever remains of the piece.
//!
//! [`PieceWork`] carries one attempt at one piece: the expected hash, the
//! buffer the blocks are copied into, and the verification step.

use crate::error::{Error, Result};
use crate::torrent::TorrentMetadata;

use sha1::{Digest, Sha1};

/// Standard block size for piece downloads (16KB)
pub const BLOCK_SIZE_MAX: u32 = 16384;

/// Download state of a single piece attempt.
#[derive(Debug, Clone)]
pub struct PieceWork {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Expected SHA-1 of the piece
    pub hash: [u8; 20],
    /// Total length of the piece in bytes
    pub length: u32,
    /// Buffer receiving the blocks
    pub data: Vec<u8>,
    /// Bytes stored so far
    pub downloaded: u32,
}

impl PieceWork {
    pub fn new(index: u32, hash: [u8; 20], length: u32) -> PieceWork {
        PieceWork {
            index,
            hash,
            length,
            data: vec![0; length as usize],
            downloaded: 0,
        }
    }

    /// Prepare piece `index` of a torrent, or `None` if the index is out of range.
    pub fn from_metadata(metadata: &TorrentMetadata, index: u32) -> Option<PieceWork> {
        let hash: [u8; 20] = metadata.piece_hash(index)?.try_into().ok()?;
        Some(PieceWork::new(index, hash, metadata.piece_size(index)))
    }

    /// `(begin, length)` of every block, in order.
    pub fn blocks(&self, block_size: u32) -> Vec<(u32, u32)> {
        block_plan(self.length, block_size)
    }

    /// Copy a received block into the piece buffer.
    pub fn write_block(&mut self, begin: u32, block: &[u8]) -> Result<()> {
        let start = begin as usize;
        let end = start + block.len();
        if end > self.data.len() {
            return Err(Error::ProtocolViolation(format!(
                "block [{}:{}] exceeds piece {} of {} bytes",
                start, end, self.index, self.length
            )));
        }

        self.data[start..end].copy_from_slice(block);
        self.downloaded += block.len() as u32;

        Ok(())
    }

    /// Compare the SHA-1 of the buffer with the expected hash.
    pub fn verify(&self) -> Result<()> {
        if !verify_piece(&self.data, &self.hash) {
            return Err(Error::HashMismatch { index: self.index });
        }

        debug!("Successfully verified integrity of piece {}", self.index);

        Ok(())
    }
}

/// Split `length` bytes into blocks of at most `block_size` bytes.
pub fn block_plan(length: u32, block_size: u32) -> Vec<(u32, u32)> {
    let block_size = block_size.max(1);
    let mut blocks = Vec::with_capacity(length.div_ceil(block_size) as usize);

    let mut begin = 0;
    while begin < length {
        let block_len = block_size.min(length - begin);
        blocks.push((begin, block_len));
        begin += block_len;
    }

    blocks
}

pub fn verify_piece(data: &[u8], expected: &[u8]) -> bool {
    Sha1::digest(data).as_slice() == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_plan() {
        assert_eq!(block_plan(32768, 16384), vec![(0, 16384), (16384, 16384)]);
        assert_eq!(
            block_plan(40000, 16384),
            vec![(0, 16384), (16384, 16384), (32768, 7232)]
        );
        assert_eq!(block_plan(100, 16384), vec![(0, 100)]);
        assert!(block_plan(0, 16384).is_empty());
    }

    #[test]
    fn test_write_and_verify() {
        let content = b"hello piece".to_vec();
        let hash: [u8; 20] = Sha1::digest(&content).into();
        let mut work = PieceWork::new(4, hash, content.len() as u32);

        work.write_block(6, &content[6..]).unwrap();
        assert!(matches!(work.verify(), Err(Error::HashMismatch { index: 4 })));

        work.write_block(0, &content[..6]).unwrap();
        assert_eq!(work.downloaded, content.len() as u32);
        work.verify().unwrap();
        assert_eq!(work.data, content);
    }

    #[test]
    fn test_write_out_of_bounds() {
        let mut work = PieceWork::new(0, [0; 20], 10);
        assert!(matches!(
            work.write_block(8, &[1, 2, 3]),
            Err(Error::ProtocolViolation(_))
        ));
    }
}
