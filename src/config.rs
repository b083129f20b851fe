//! # Engine Configuration
//!
//! All tunables of the download engine live in one immutable [`EngineConfig`]
//! handed to [`crate::engine::Engine::new`]. Defaults match a typical
//! single-user client: five workers, 30 second overall budget, 16 KiB blocks.

use crate::piece::BLOCK_SIZE_MAX;

use rand::distributions::Alphanumeric;
use rand::Rng;

use std::path::PathBuf;
use std::time::Duration;

/// Client prefix of the generated peer id (Azureus-style).
const PEER_ID_PREFIX: &[u8; 8] = b"-RV0001-";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Port announced to the tracker
    pub port: u16,
    /// Number of concurrent workers
    pub num_workers: usize,
    /// Overall budget for a full download
    pub download_timeout: Duration,
    /// Size of a block request
    pub block_size: u32,
    /// Pause before a worker polls again after a failed attempt
    pub retry_backoff: Duration,
    /// TCP connect timeout for peers
    pub connect_timeout: Duration,
    /// Read and write timeout applied to every peer socket
    pub io_timeout: Duration,
    /// Timeout of the tracker announce request
    pub tracker_timeout: Duration,
    /// Directory receiving completed downloads
    pub download_dir: PathBuf,
    /// Directory receiving single pieces
    pub piece_dir: PathBuf,
    /// Our 20-byte peer id
    pub peer_id: [u8; 20],
}

impl Default for EngineConfig {
    fn default() -> Self {
        let download_dir = PathBuf::from("downloads");
        EngineConfig {
            port: 6881,
            num_workers: 5,
            download_timeout: Duration::from_secs(30),
            block_size: 16 * 1024,
            retry_backoff: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(15),
            tracker_timeout: Duration::from_secs(15),
            piece_dir: download_dir.join("temp"),
            download_dir,
            peer_id: generate_peer_id(),
        }
    }
}

impl EngineConfig {
    /// Set the download directory. The piece directory follows it.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self.piece_dir = self.download_dir.join("temp");
        self
    }

    pub fn with_piece_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.piece_dir = dir.into();
        self
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the request size, clamped to `1..=16 KiB`.
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size.clamp(1, BLOCK_SIZE_MAX);
        self
    }
}

/// Generate a peer id: fixed client prefix followed by 12 random alphanumerics.
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..8].copy_from_slice(PEER_ID_PREFIX);

    let mut rng = rand::thread_rng();
    for x in peer_id[8..].iter_mut() {
        *x = rng.sample(Alphanumeric);
    }

    peer_id
}
