//! Test helpers: torrent builder, mock peers and a minimal HTTP tracker.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rivulet::bencode::{self, Value};
use rivulet::handshake::{Handshake, HANDSHAKE_LEN};
use rivulet::message::{self, Message, MESSAGE_BITFIELD, MESSAGE_REQUEST, MESSAGE_UNCHOKE};
use rivulet::{EngineConfig, PeerAddress, TorrentMetadata};
use sha1::{Digest, Sha1};

pub struct TestTorrent {
    pub bytes: Vec<u8>,
    pub metadata: TorrentMetadata,
    pub content: Vec<u8>,
}

impl TestTorrent {
    pub fn piece(&self, index: u32) -> &[u8] {
        let begin = self.metadata.piece_offset(index) as usize;
        let end = begin + self.metadata.piece_size(index) as usize;
        &self.content[begin..end]
    }
}

/// Build a single-file torrent over deterministic content.
pub fn build_torrent(name: &str, announce: &str, piece_length: usize, total_length: usize) -> TestTorrent {
    build_torrent_with_tiers(name, announce, &[], piece_length, total_length)
}

/// Same as [`build_torrent`], with an `announce-list` when `tiers` is not empty.
pub fn build_torrent_with_tiers(
    name: &str,
    announce: &str,
    tiers: &[&[&str]],
    piece_length: usize,
    total_length: usize,
) -> TestTorrent {
    let content: Vec<u8> = (0..total_length).map(|i| (i * 7 % 256) as u8).collect();

    let mut pieces = Vec::new();
    for chunk in content.chunks(piece_length) {
        pieces.extend_from_slice(&Sha1::digest(chunk));
    }

    let mut root = vec![(b"announce".to_vec(), Value::Bytes(announce.as_bytes().to_vec()))];
    if !tiers.is_empty() {
        let tiers = tiers
            .iter()
            .map(|tier| {
                Value::List(
                    tier.iter()
                        .map(|url| Value::Bytes(url.as_bytes().to_vec()))
                        .collect(),
                )
            })
            .collect();
        root.push((b"announce-list".to_vec(), Value::List(tiers)));
    }
    root.push((b"comment".to_vec(), Value::Bytes(b"test torrent".to_vec())));
    root.push((
        b"info".to_vec(),
        Value::Dict(vec![
            (b"length".to_vec(), Value::Integer(total_length as i64)),
            (b"name".to_vec(), Value::Bytes(name.as_bytes().to_vec())),
            (b"piece length".to_vec(), Value::Integer(piece_length as i64)),
            (b"pieces".to_vec(), Value::Bytes(pieces)),
        ]),
    ));
    let bytes = bencode::encode(&Value::Dict(root));
    let metadata = TorrentMetadata::parse(&bytes).unwrap();

    TestTorrent {
        bytes,
        metadata,
        content,
    }
}

/// Engine configuration with short timings, writing under `dir`.
pub fn test_config(dir: &std::path::Path) -> EngineConfig {
    EngineConfig::default()
        .with_download_dir(dir)
        .with_workers(3)
        .with_download_timeout(Duration::from_secs(20))
        .with_retry_backoff(Duration::from_millis(50))
        .with_io_timeout(Duration::from_secs(5))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Serves correct blocks
    Honest,
    /// Serves blocks with flipped bytes
    Corrupt,
    /// Answers the handshake for another torrent
    WrongInfoHash,
    /// Reads the handshake and never answers
    Silent,
}

pub struct MockPeer {
    pub addr: PeerAddress,
    /// Number of connections accepted
    pub connections: Arc<AtomicUsize>,
    /// Number of blocks served
    pub blocks: Arc<AtomicUsize>,
    /// Set once a connection is seen closed by the client
    pub closed: Arc<AtomicBool>,
}

impl MockPeer {
    pub fn spawn(torrent: &TestTorrent, behavior: Behavior) -> MockPeer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let info_hash = *torrent.metadata.info_hash();
        let content = Arc::new(torrent.content.clone());
        let piece_length = torrent.metadata.piece_length() as usize;

        let connections = Arc::new(AtomicUsize::new(0));
        let blocks = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));

        let (conn_count, block_count, closed_flag) =
            (Arc::clone(&connections), Arc::clone(&blocks), Arc::clone(&closed));
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                conn_count.fetch_add(1, Ordering::SeqCst);

                let content = Arc::clone(&content);
                let block_count = Arc::clone(&block_count);
                let closed_flag = Arc::clone(&closed_flag);
                thread::spawn(move || {
                    serve_connection(stream, behavior, info_hash, &content, piece_length, &block_count);
                    closed_flag.store(true, Ordering::SeqCst);
                });
            }
        });

        MockPeer {
            addr: PeerAddress::new(Ipv4Addr::LOCALHOST, port),
            connections,
            blocks,
            closed,
        }
    }
}

fn serve_connection(
    mut stream: TcpStream,
    behavior: Behavior,
    info_hash: [u8; 20],
    content: &[u8],
    piece_length: usize,
    blocks: &AtomicUsize,
) {
    let mut handshake = [0u8; HANDSHAKE_LEN];
    if stream.read_exact(&mut handshake).is_err() {
        return;
    }

    match behavior {
        Behavior::Silent => {
            // Hold the connection until the client closes it
            let mut buf = [0u8; 64];
            while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
            return;
        }
        Behavior::WrongInfoHash => {
            let _ = stream.write_all(&Handshake::new([0xEE; 20], [0x22; 20]).serialize());
            return;
        }
        Behavior::Honest | Behavior::Corrupt => {}
    }

    let mut out = Handshake::new(info_hash, [0x11; 20]).serialize().to_vec();
    out.extend(Message::new_with_payload(MESSAGE_BITFIELD, vec![0xFF; 4]).serialize());
    if stream.write_all(&out).is_err() {
        return;
    }

    // INTERESTED
    if message::read_message(&mut stream).is_err() {
        return;
    }
    if stream.write_all(&Message::new(MESSAGE_UNCHOKE).serialize()).is_err() {
        return;
    }

    while let Ok(request) = message::read_message(&mut stream) {
        if request.id != MESSAGE_REQUEST || request.payload.len() != 12 {
            return;
        }
        let field = |i: usize| u32::from_be_bytes(request.payload[i..i + 4].try_into().unwrap());
        let (index, begin, length) = (field(0), field(4), field(8));

        let start = index as usize * piece_length + begin as usize;
        let mut block = content[start..start + length as usize].to_vec();
        if behavior == Behavior::Corrupt {
            for byte in block.iter_mut() {
                *byte ^= 0xFF;
            }
        }

        if stream.write_all(&Message::piece(index, begin, &block).serialize()).is_err() {
            return;
        }
        blocks.fetch_add(1, Ordering::SeqCst);
    }
}

/// HTTP tracker answering every announce with the same body.
pub struct MockTracker {
    pub url: String,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl MockTracker {
    pub fn spawn(body: Vec<u8>) -> MockTracker {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/announce", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let request_line = String::from_utf8_lossy(&request)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                log.lock().unwrap().push(request_line);

                let mut response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                )
                .into_bytes();
                response.extend_from_slice(&body);
                let _ = stream.write_all(&response);
            }
        });

        MockTracker { url, requests }
    }
}

/// Compact tracker response listing `peers`.
pub fn compact_response(peers: &[PeerAddress]) -> Vec<u8> {
    let mut compact = Vec::new();
    for peer in peers {
        compact.extend_from_slice(&peer.ip.octets());
        compact.extend_from_slice(&peer.port.to_be_bytes());
    }
    bencode::encode(&Value::Dict(vec![
        (b"interval".to_vec(), Value::Integer(1800)),
        (b"peers".to_vec(), Value::Bytes(compact)),
    ]))
}
