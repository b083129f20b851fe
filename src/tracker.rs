//! # Tracker Client
//!
//! Discovers peers with an HTTP announce:
//!
//! ```text
//! GET <announce>?info_hash=<%XX..>&peer_id=<%XX..>&port=<P>&uploaded=0&downloaded=0&left=<N>&compact=1
//! ```
//!
//! The tracker answers with a bencoded dictionary. Its `peers` entry is
//! normally a compact byte string (see [`crate::peer`]); the older list of
//! `{ip, port}` dictionaries is accepted as well.
//!
//! When the primary announce URL fails or returns no peers, the tiers of the
//! `announce-list` are tried in order, each tier shuffled as per BEP 12.

use crate::bencode::{self, Value};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::peer::*;
use crate::torrent::TorrentMetadata;

use rand::seq::SliceRandom;
use reqwest::blocking::Client;
use url::Url;

use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Announces torrents to HTTP trackers.
pub struct Tracker {
    client: Client,
    peer_id: [u8; 20],
    port: u16,
}

impl Tracker {
    pub fn new(config: &EngineConfig) -> Result<Tracker> {
        let client = Client::builder().timeout(config.tracker_timeout).build()?;

        Ok(Tracker {
            client,
            peer_id: config.peer_id,
            port: config.port,
        })
    }

    /// Request peers for a torrent, falling back to the announce-list tiers.
    pub fn announce(&self, metadata: &TorrentMetadata) -> Result<Vec<PeerAddress>> {
        let mut last_error = None;

        for url in tracker_urls(metadata) {
            match self.announce_to(&url, metadata) {
                Ok(peers) if !peers.is_empty() => {
                    info!("Tracker {} returned {} peers", url, peers.len());
                    return Ok(peers);
                }
                Ok(_) => {
                    warn!("Tracker {} returned no peers", url);
                    last_error = Some(Error::NoPeersAvailable);
                }
                Err(e) => {
                    warn!("Announce to {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(Error::NoPeersAvailable))
    }

    /// Announce to a single tracker URL.
    pub fn announce_to(&self, announce: &str, metadata: &TorrentMetadata) -> Result<Vec<PeerAddress>> {
        let url = build_tracker_url(
            announce,
            metadata.info_hash(),
            &self.peer_id,
            self.port,
            metadata.total_length(),
        )?;

        debug!("Announcing to {}", url);

        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(Error::Tracker(format!(
                "tracker answered with HTTP {}",
                response.status()
            )));
        }
        let body = response.bytes()?;

        parse_tracker_response(&body)
    }
}

/// Primary announce URL followed by the shuffled announce-list tiers, without duplicates.
fn tracker_urls(metadata: &TorrentMetadata) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = vec![];

    if seen.insert(metadata.announce().to_string()) {
        urls.push(metadata.announce().to_string());
    }

    let mut rng = rand::thread_rng();
    for tier in metadata.announce_list().unwrap_or_default() {
        let mut tier = tier.clone();
        tier.shuffle(&mut rng);
        for url in tier {
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }
    }

    urls
}

/// Each byte is encoded as %XX where XX is the hexadecimal representation
fn percent_encode_binary(data: &[u8]) -> String {
    const HEX_DIGITS: &[u8] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(data.len() * 3);

    for &byte in data {
        encoded.push('%');
        encoded.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        encoded.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
    }

    encoded
}

/// Build the announce URL with all query parameters.
pub fn build_tracker_url(
    announce: &str,
    info_hash: &[u8],
    peer_id: &[u8],
    port: u16,
    left: u64,
) -> Result<String> {
    // Parse tracker URL from torrent
    let base_url = match Url::parse(announce) {
        Ok(url) => url,
        Err(e) => return Err(Error::Tracker(format!("could not parse tracker url: {}", e))),
    };
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(Error::Tracker(format!(
            "unsupported tracker scheme '{}'",
            base_url.scheme()
        )));
    }

    // Query string is built by hand so binary values keep their exact bytes
    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1",
        percent_encode_binary(info_hash),
        percent_encode_binary(peer_id),
        port,
        left
    );

    let mut url = base_url.to_string();
    if base_url.query().is_some() {
        url.push('&');
    } else {
        url.push('?');
    }
    url.push_str(&query);

    Ok(url)
}

/// Decode a tracker response body into a deduplicated peer list.
pub fn parse_tracker_response(body: &[u8]) -> Result<Vec<PeerAddress>> {
    let response = bencode::decode(body)
        .map_err(|e| Error::Tracker(format!("could not decode tracker response: {}", e)))?;

    if response.as_dict().is_none() {
        return Err(Error::Tracker("tracker response is not a dictionary".into()));
    }

    if let Some(reason) = response.get("failure reason") {
        let reason = String::from_utf8_lossy(reason.as_bytes().unwrap_or_default());
        return Err(Error::Tracker(format!("tracker returned failure: {}", reason)));
    }

    let peers = match response.get("peers") {
        Some(Value::Bytes(compact)) => parse_compact_peers(compact),
        Some(Value::List(entries)) => entries.iter().filter_map(parse_peer_dict).collect(),
        Some(_) => return Err(Error::Tracker("unexpected 'peers' type".into())),
        None => return Err(Error::Tracker("tracker response has no 'peers'".into())),
    };

    // Deduplicate peers, keeping tracker order
    let mut seen = HashSet::new();
    let peers: Vec<PeerAddress> = peers.into_iter().filter(|p| seen.insert(*p)).collect();

    if peers.is_empty() {
        return Err(Error::NoPeersAvailable);
    }

    Ok(peers)
}

fn parse_peer_dict(entry: &Value) -> Option<PeerAddress> {
    let ip: Ipv4Addr = entry.get("ip")?.as_str()?.parse().ok()?;
    let port = u16::try_from(entry.get("port")?.as_integer()?).ok()?;
    Some(PeerAddress::new(ip, port))
}
