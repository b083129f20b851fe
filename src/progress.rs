//! # Progress Notifications
//!
//! After each verified piece the engine emits a plain-text line such as
//! `Downloaded 3/10 pieces of debian.iso` to a [`ProgressSink`]. Delivery is
//! fire-and-forget: a sink must never block the worker and a missing listener
//! is not an error.
//!
//! Every completed count is reported exactly once, but workers call the sink
//! concurrently, so `3/10` may arrive before `2/10`.

use crate::peer::PeerAddress;

use crossbeam_channel::Sender;

use std::fmt;

/// A verified piece, as reported to a sink.
#[derive(Debug, Clone)]
pub struct Progress<'a> {
    pub index: u32,
    pub completed: usize,
    pub total: u32,
    pub name: &'a str,
    pub peer: PeerAddress,
}

impl Progress<'_> {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 * 100.0 / self.total as f64
    }
}

impl fmt::Display for Progress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Downloaded {}/{} pieces of {}",
            self.completed, self.total, self.name
        )
    }
}

pub trait ProgressSink: Send + Sync {
    /// Deliver a human-readable progress line.
    fn notify(&self, message: &str);

    fn piece_completed(&self, progress: &Progress<'_>) {
        self.notify(&progress.to_string());
    }
}

/// Writes progress lines to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn notify(&self, message: &str) {
        info!("{}", message);
    }

    fn piece_completed(&self, progress: &Progress<'_>) {
        info!(
            "{} ({:.1}%, piece {} from {})",
            progress,
            progress.percentage(),
            progress.index,
            progress.peer
        );
    }
}

/// Forwards progress lines to a channel. Messages are dropped when the
/// receiver is gone or, for bounded channels, full.
pub struct ChannelSink {
    tx: Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: Sender<String>) -> ChannelSink {
        ChannelSink { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn notify(&self, message: &str) {
        let _ = self.tx.try_send(message.to_string());
    }
}
