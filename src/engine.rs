//! # Download Engine
//!
//! The engine ties the pieces together:
//!
//! 1. **Announce** to the tracker to get peers
//! 2. **Schedule**: queue every piece index and launch a fixed pool of workers,
//!    worker `k` bound to peer `k mod peers.len()`
//! 3. **Wait** for the completion signal, bounded by the download timeout
//! 4. **Tear down**: stop the workers and close every live connection
//! 5. **Assemble** the verified pieces into the output file
//!
//! A single-piece entry point is also provided; it tries the peers one after
//! the other and stores the verified piece in the piece directory.

use crate::assembler::{assemble, persist_piece, sanitize_filename};
use crate::client::Client;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::peer::PeerAddress;
use crate::piece::PieceWork;
use crate::progress::{LogSink, ProgressSink};
use crate::session::DownloadSession;
use crate::torrent::TorrentMetadata;
use crate::tracker::Tracker;
use crate::worker::Worker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

pub struct Engine {
    config: Arc<EngineConfig>,
    tracker: Tracker,
    progress: Arc<dyn ProgressSink>,
}

/// Peer of every worker slot, fixed for the whole download.
pub fn assignment_table(num_workers: usize, peers: &[PeerAddress]) -> Vec<PeerAddress> {
    if peers.is_empty() {
        return vec![];
    }
    (0..num_workers).map(|k| peers[k % peers.len()]).collect()
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Engine> {
        let tracker = Tracker::new(&config)?;
        Ok(Engine {
            config: Arc::new(config),
            tracker,
            progress: Arc::new(LogSink),
        })
    }

    /// Replace the progress sink (logging by default).
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Engine {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ask the tracker for peers.
    pub fn announce(&self, metadata: &TorrentMetadata) -> Result<Vec<PeerAddress>> {
        self.tracker.announce(metadata)
    }

    /// Download the whole torrent and return the path of the output file.
    pub fn download(&self, metadata: &TorrentMetadata) -> Result<PathBuf> {
        let peers = self.announce(metadata)?;
        self.download_from_peers(metadata, &peers)
    }

    /// Download the whole torrent from a known set of peers.
    pub fn download_from_peers(&self, metadata: &TorrentMetadata, peers: &[PeerAddress]) -> Result<PathBuf> {
        info!(
            "Downloading {:?} ({} pieces, {} bytes) from {} peers",
            metadata.name(),
            metadata.num_pieces(),
            metadata.total_length(),
            peers.len()
        );

        let pieces = self.fetch_pieces(metadata, peers)?;

        let output = self
            .config
            .download_dir
            .join(sanitize_filename(metadata.name()));
        assemble(metadata, &pieces, &output)?;

        Ok(output)
    }

    /// Run the worker pool until every piece is verified or the timeout hits.
    pub fn fetch_pieces(
        &self,
        metadata: &TorrentMetadata,
        peers: &[PeerAddress],
    ) -> Result<HashMap<u32, Vec<u8>>> {
        if peers.is_empty() {
            return Err(Error::NoPeersAvailable);
        }

        let session = Arc::new(DownloadSession::new(metadata.num_pieces()));
        let metadata = Arc::new(metadata.clone());
        let table = assignment_table(self.config.num_workers, peers);
        let started = Instant::now();

        for (id, peer) in table.into_iter().enumerate() {
            let worker = Worker::new(
                id,
                peer,
                Arc::clone(&metadata),
                Arc::clone(&session),
                Arc::clone(&self.config),
                Arc::clone(&self.progress),
            );

            let spawned = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker.start_download());
            if let Err(e) = spawned {
                session.stop();
                return Err(e.into());
            }
        }

        let completed = session.wait(self.config.download_timeout);

        // Workers exit on their own once stopped; sockets are closed here
        debug!("Stopping workers, {} connections still open", session.live_connections());
        session.stop();

        if !completed {
            error!(
                "Download of {:?} timed out with {}/{} pieces",
                metadata.name(),
                session.completed_count(),
                metadata.num_pieces()
            );
            return Err(Error::DownloadTimeout(self.config.download_timeout));
        }

        info!(
            "Downloaded {} pieces of {:?} in {:.1?}",
            metadata.num_pieces(),
            metadata.name(),
            started.elapsed()
        );

        Ok(session.take_pieces())
    }

    /// Download one piece, store it in the piece directory and return its bytes.
    pub fn download_piece(&self, metadata: &TorrentMetadata, index: u32) -> Result<Vec<u8>> {
        let peers = self.announce(metadata)?;
        self.download_piece_from_peers(metadata, index, &peers)
    }

    /// Try each peer in turn until one yields piece `index`.
    pub fn download_piece_from_peers(
        &self,
        metadata: &TorrentMetadata,
        index: u32,
        peers: &[PeerAddress],
    ) -> Result<Vec<u8>> {
        if index >= metadata.num_pieces() {
            return Err(Error::MissingPiece(index));
        }
        if peers.is_empty() {
            return Err(Error::NoPeersAvailable);
        }

        let mut last_error = Error::NoPeersAvailable;
        for peer in peers {
            match self.fetch_single(metadata, index, *peer) {
                Ok(piece_work) => {
                    persist_piece(metadata, index, &piece_work.data, &self.config.piece_dir)?;
                    return Ok(piece_work.data);
                }
                Err(e) => {
                    warn!("Failed to download piece {} from peer {}: {}", index, peer, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn fetch_single(&self, metadata: &TorrentMetadata, index: u32, peer: PeerAddress) -> Result<PieceWork> {
        let mut piece_work = PieceWork::from_metadata(metadata, index).ok_or(Error::MissingPiece(index))?;

        let mut client = Client::connect(
            peer,
            self.config.peer_id,
            *metadata.info_hash(),
            self.config.connect_timeout,
            self.config.io_timeout,
        )?;
        client.fetch_piece(&mut piece_work, self.config.block_size)?;
        piece_work.verify()?;

        Ok(piece_work)
    }
}
