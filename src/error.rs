//! # Engine Errors
//!
//! Every fallible operation in the engine returns [`Error`]. Variants fall in
//! two groups:
//!
//! - **Per-attempt** failures (`HandshakeFailed`, `ProtocolViolation`,
//!   `HashMismatch`, `Io`) concern one peer attempt on one piece. The scheduler
//!   requeues the piece and carries on.
//! - **Fatal** failures abort the whole operation and reach the caller.

use crate::bencode::DecodeError;

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed bencode: {0}")]
    MalformedEncoding(#[from] DecodeError),

    #[error("invalid torrent file: {0}")]
    InvalidTorrentFile(String),

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("no peers available")]
    NoPeersAvailable,

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("hash mismatch for piece {index}")]
    HashMismatch { index: u32 },

    #[error("download timed out after {} seconds", .0.as_secs())]
    DownloadTimeout(Duration),

    #[error("missing piece {0} at assembly time")]
    MissingPiece(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the scheduler should requeue the piece instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::HandshakeFailed(_)
                | Error::ProtocolViolation(_)
                | Error::HashMismatch { .. }
                | Error::Io(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Tracker(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::HandshakeFailed("bad".into()).is_recoverable());
        assert!(Error::ProtocolViolation("bad".into()).is_recoverable());
        assert!(Error::HashMismatch { index: 3 }.is_recoverable());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_recoverable());

        assert!(!Error::NoPeersAvailable.is_recoverable());
        assert!(!Error::MissingPiece(0).is_recoverable());
        assert!(!Error::DownloadTimeout(Duration::from_secs(30)).is_recoverable());
        assert!(!Error::InvalidTorrentFile("x".into()).is_recoverable());
    }

    #[test]
    fn test_timeout_message() {
        let e = Error::DownloadTimeout(Duration::from_secs(30));
        assert_eq!(e.to_string(), "download timed out after 30 seconds");
    }
}
