//! # Rivulet
//!
//! A BitTorrent download engine: given a `.torrent` file it asks the tracker
//! for peers, speaks the peer wire protocol with them, downloads and verifies
//! pieces concurrently and assembles the final file.
//!
//! ## Architecture
//!
//! - **Bencode codec** ([`bencode`]): decode/encode of the metadata format
//! - **Torrent metadata** ([`torrent`]): typed view of a `.torrent` file and its info hash
//! - **Tracker client** ([`tracker`], [`peer`]): HTTP announce, compact peer list
//! - **Peer wire protocol** ([`handshake`], [`message`], [`client`])
//! - **Piece scheduler** ([`engine`], [`worker`], [`session`], [`piece`]): a
//!   fixed pool of worker threads sharing a work queue
//! - **File assembler** ([`assembler`])
//!
//! ## Example
//!
//! ```no_run
//! use rivulet::{Engine, EngineConfig, TorrentMetadata};
//!
//! let metadata = TorrentMetadata::open("debian.iso.torrent")?;
//! let engine = Engine::new(EngineConfig::default().with_download_dir("downloads"))?;
//! let path = engine.download(&metadata)?;
//! println!("saved in {:?}", path);
//! # Ok::<(), rivulet::Error>(())
//! ```

#[macro_use]
extern crate log;

pub mod assembler;
pub mod bencode;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod message;
pub mod peer;
pub mod piece;
pub mod progress;
pub mod session;
pub mod torrent;
pub mod tracker;
pub mod worker;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use peer::PeerAddress;
pub use progress::{ChannelSink, LogSink, Progress, ProgressSink};
pub use torrent::{FileEntry, FileLayout, TorrentMetadata};
