//! # Download Session
//!
//! State shared by the workers of one download. Each piece of state is
//! synchronized on its own:
//!
//! - **Work queue**: crossbeam channel of pending piece indices
//! - **Completed pieces**: map from index to verified bytes, behind a mutex.
//!   The first verified writer of an index wins, later ones are ignored.
//! - **Completed counter**: atomic, bumped only on a first write
//! - **Completion signal**: fired once by the writer that completes the set
//! - **Stop signal**: closed on teardown, wakes idle and backing-off workers
//! - **Live connections**: sockets of in-flight attempts, shut down on teardown

use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};

use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct DownloadSession {
    num_pieces: u32,
    work_chan: (Sender<u32>, Receiver<u32>),
    pieces: Mutex<HashMap<u32, Vec<u8>>>,
    completed_count: AtomicUsize,
    done_chan: (Sender<()>, Receiver<()>),
    stopped: AtomicBool,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    connections: Mutex<HashMap<usize, TcpStream>>,
}

impl DownloadSession {
    /// Create a session with every piece index queued.
    pub fn new(num_pieces: u32) -> DownloadSession {
        let work_chan = unbounded();
        for index in 0..num_pieces {
            // The receiver lives in the same tuple, sending cannot fail
            let _ = work_chan.0.send(index);
        }

        let done_chan = bounded(1);
        if num_pieces == 0 {
            let _ = done_chan.0.try_send(());
        }

        let (stop_tx, stop_rx) = bounded(0);

        DownloadSession {
            num_pieces,
            work_chan,
            pieces: Mutex::new(HashMap::new()),
            completed_count: AtomicUsize::new(0),
            done_chan,
            stopped: AtomicBool::new(false),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn num_pieces(&self) -> u32 {
        self.num_pieces
    }

    /// Pop the next pending piece.
    ///
    /// While pieces are still outstanding an empty queue is waited on, since
    /// in-flight attempts may requeue their index. Returns `None` once every
    /// piece is complete or the session is stopped.
    pub fn next_piece(&self) -> Option<u32> {
        if self.is_stopped() || self.is_complete() {
            return None;
        }
        select! {
            recv(self.work_chan.1) -> index => index.ok().filter(|_| !self.is_stopped()),
            recv(self.stop_rx) -> _ => None,
        }
    }

    /// Return a piece to the queue for another attempt.
    pub fn requeue(&self, index: u32) {
        let _ = self.work_chan.0.send(index);
    }

    pub fn pending(&self) -> usize {
        self.work_chan.1.len()
    }

    pub fn is_completed(&self, index: u32) -> bool {
        lock(&self.pieces).contains_key(&index)
    }

    /// Store a verified piece.
    ///
    /// Returns the new completed count if this call stored the piece, `None`
    /// if the index was already complete or the session is stopped.
    pub fn complete(&self, index: u32, data: Vec<u8>) -> Option<usize> {
        let count = {
            let mut pieces = lock(&self.pieces);
            if self.is_stopped() || pieces.contains_key(&index) {
                return None;
            }
            pieces.insert(index, data);
            self.completed_count.fetch_add(1, Ordering::SeqCst) + 1
        };

        if count == self.num_pieces as usize {
            let _ = self.done_chan.0.try_send(());
        }

        Some(count)
    }

    pub fn completed_count(&self) -> usize {
        self.completed_count.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count() == self.num_pieces as usize
    }

    /// Block until every piece is complete or `timeout` elapses. Returns `true` on completion.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.done_chan.1.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.is_complete()
            }
        }
    }

    /// Sleep for `duration`, returning early if the session is stopped.
    pub fn backoff(&self, duration: Duration) {
        let _ = self.stop_rx.recv_timeout(duration);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Signal every worker to stop and force all live connections closed.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);

        // Dropping the sender wakes every idle or backing-off worker
        lock(&self.stop_tx).take();

        let mut connections = lock(&self.connections);
        for (worker, conn) in connections.drain() {
            debug!("Closing connection of worker {}", worker);
            let _ = conn.shutdown(Shutdown::Both);
        }
    }

    /// Track the socket of an in-flight attempt. Returns `false` if the session already stopped.
    pub fn register_connection(&self, worker: usize, conn: TcpStream) -> bool {
        let mut connections = lock(&self.connections);
        if self.is_stopped() {
            let _ = conn.shutdown(Shutdown::Both);
            return false;
        }
        connections.insert(worker, conn);
        true
    }

    pub fn unregister_connection(&self, worker: usize) {
        lock(&self.connections).remove(&worker);
    }

    pub fn live_connections(&self) -> usize {
        lock(&self.connections).len()
    }

    /// Move the verified pieces out of the session.
    pub fn take_pieces(&self) -> HashMap<u32, Vec<u8>> {
        std::mem::take(&mut *lock(&self.pieces))
    }
}
