//! # Peer Addresses
//!
//! Peers are discovered through the tracker, which answers with a compact
//! binary list of 6-byte entries:
//!
//! ```text
//! <IP: 4 bytes><Port: 2 bytes>
//! ```
//!
//! Both fields are in network byte order (big-endian).

use byteorder::{BigEndian, ByteOrder};

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

const PEER_SIZE: usize = 6;

/// IPv4 address and port of a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> PeerAddress {
        PeerAddress { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Parse a compact peer list. A trailing partial entry is ignored.
pub fn parse_compact_peers(tracker_peers: &[u8]) -> Vec<PeerAddress> {
    if tracker_peers.len() % PEER_SIZE != 0 {
        warn!(
            "Compact peer list has {} trailing bytes, ignoring them",
            tracker_peers.len() % PEER_SIZE
        );
    }

    tracker_peers
        .chunks_exact(PEER_SIZE)
        .map(|entry| {
            let ip = Ipv4Addr::new(entry[0], entry[1], entry[2], entry[3]);
            let port = BigEndian::read_u16(&entry[4..6]);
            PeerAddress::new(ip, port)
        })
        .collect()
}
