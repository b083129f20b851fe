//! # Download Worker
//!
//! A worker is bound to one peer for its whole life and pulls piece indices
//! from the shared session until every piece is complete or the session stops.
//!
//! For every piece it opens a fresh connection, runs the full exchange (see
//! [`crate::client`]), checks the SHA-1 and either stores the piece or puts
//! the index back in the queue:
//!
//! - **Hash match**: piece stored, counter bumped, progress emitted
//! - **Hash mismatch**: index requeued immediately
//! - **I/O or protocol error**: index requeued, worker backs off before polling again
//!
//! There is no per-piece retry cap; the overall download timeout bounds it.

use crate::client::*;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::peer::*;
use crate::piece::*;
use crate::progress::{Progress, ProgressSink};
use crate::session::DownloadSession;
use crate::torrent::TorrentMetadata;

use std::io;
use std::sync::Arc;

/// Downloads pieces from a single peer.
pub struct Worker {
    /// Slot number, used to track the live connection
    id: usize,
    /// Peer assigned to this worker
    peer: PeerAddress,
    metadata: Arc<TorrentMetadata>,
    session: Arc<DownloadSession>,
    config: Arc<EngineConfig>,
    progress: Arc<dyn ProgressSink>,
}

impl Worker {
    pub fn new(
        id: usize,
        peer: PeerAddress,
        metadata: Arc<TorrentMetadata>,
        session: Arc<DownloadSession>,
        config: Arc<EngineConfig>,
        progress: Arc<dyn ProgressSink>,
    ) -> Worker {
        Worker {
            id,
            peer,
            metadata,
            session,
            config,
            progress,
        }
    }

    /// Run until every piece is complete or the session stops.
    pub fn start_download(&self) {
        debug!("Worker {} started on peer {}", self.id, self.peer);

        while let Some(index) = self.session.next_piece() {
            // Another worker may have finished it meanwhile
            if self.session.is_completed(index) {
                continue;
            }

            match self.attempt(index) {
                Ok(data) => self.store(index, data),
                Err(Error::HashMismatch { .. }) => {
                    warn!(
                        "Piece {} from peer {} failed verification, requeuing",
                        index, self.peer
                    );
                    self.session.requeue(index);
                }
                Err(e) if e.is_recoverable() => {
                    warn!(
                        "Failed to download piece {} from peer {}: {}",
                        index, self.peer, e
                    );
                    self.session.requeue(index);
                    self.session.backoff(self.config.retry_backoff);
                }
                Err(e) => {
                    error!("Worker {} giving up on piece {}: {}", self.id, index, e);
                    self.session.requeue(index);
                    break;
                }
            }
        }

        debug!("Worker {} exiting", self.id);
    }

    fn store(&self, index: u32, data: Vec<u8>) {
        match self.session.complete(index, data) {
            Some(completed) => {
                self.progress.piece_completed(&Progress {
                    index,
                    completed,
                    total: self.session.num_pieces(),
                    name: self.metadata.name(),
                    peer: self.peer,
                });
            }
            None => debug!("Piece {} already completed, dropping duplicate", index),
        }
    }

    /// One attempt at one piece on a fresh connection.
    fn attempt(&self, index: u32) -> Result<Vec<u8>> {
        let mut piece_work =
            PieceWork::from_metadata(&self.metadata, index).ok_or(Error::MissingPiece(index))?;

        let mut client = Client::connect(
            self.peer,
            self.config.peer_id,
            *self.metadata.info_hash(),
            self.config.connect_timeout,
            self.config.io_timeout,
        )?;

        if !self
            .session
            .register_connection(self.id, client.try_clone_stream()?)
        {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Interrupted,
                "download stopped",
            )));
        }

        let result = client
            .fetch_piece(&mut piece_work, self.config.block_size)
            .and_then(|_| piece_work.verify());

        self.session.unregister_connection(self.id);
        result?;

        Ok(piece_work.data)
    }
}
