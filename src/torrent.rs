//! # Torrent Metadata
//!
//! This module turns the raw bytes of a `.torrent` file into an immutable
//! [`TorrentMetadata`].
//!
//! ## Torrent File Format
//!
//! Torrent files contain metadata in bencoded format:
//!
//! - **announce**: Tracker URL for peer discovery
//! - **announce-list**: Optional tiers of fallback tracker URLs
//! - **info**: Dictionary with file information and piece hashes
//!   - **name**: Suggested filename
//!   - **piece length**: Size of each piece
//!   - **pieces**: Concatenated 20-byte SHA-1 hashes, one per piece
//!   - **length** (single file) or **files** (list of `{length, path}`)
//!
//! ## Info Hash
//!
//! The info hash is the SHA-1 of the `info` dictionary exactly as it appears in
//! the file. The codec keeps dictionary keys in document order, so re-encoding
//! the decoded `info` value yields the original bytes.

use crate::bencode::{self, Value};
use crate::error::{Error, Result};

use serde::{Serialize, Serializer};
use sha1::{Digest, Sha1};

use std::fs;
use std::path::Path;

/// Size of SHA-1 hash in bytes
pub const SHA1_HASH_SIZE: usize = 20;

/// One file of a multi-file torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Path segments relative to the torrent root
    pub path: Vec<String>,
    /// Size in bytes
    pub length: u64,
}

/// File layout declared by the `info` dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileLayout {
    Single { length: u64 },
    Multi { files: Vec<FileEntry> },
}

/// Parsed, immutable description of a torrent.
#[derive(Debug, Clone, Serialize)]
pub struct TorrentMetadata {
    announce: String,
    announce_list: Option<Vec<Vec<String>>>,
    comment: Option<String>,
    created_by: Option<String>,
    creation_date: Option<i64>,
    name: String,
    piece_length: u32,
    #[serde(rename = "piece_hashes", serialize_with = "serialize_piece_hashes")]
    pieces: Vec<u8>,
    total_length: u64,
    layout: FileLayout,
    #[serde(serialize_with = "serialize_hex")]
    info_hash: [u8; 20],
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidTorrentFile(reason.into())
}

fn required_str<'a>(dict: &'a Value, key: &str) -> Result<&'a str> {
    dict.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("missing or invalid '{}'", key)))
}

fn optional_str(dict: &Value, key: &str) -> Option<String> {
    dict.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn non_negative(value: &Value, key: &str) -> Result<u64> {
    value
        .as_integer()
        .filter(|&n| n >= 0)
        .map(|n| n as u64)
        .ok_or_else(|| invalid(format!("'{}' must be a non-negative integer", key)))
}

impl TorrentMetadata {
    /// Read and parse a torrent file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<TorrentMetadata> {
        let buf = fs::read(path.as_ref())?;
        TorrentMetadata::parse(&buf)
    }

    /// Parse the raw bytes of a torrent file.
    pub fn parse(buf: &[u8]) -> Result<TorrentMetadata> {
        let root = bencode::decode(buf)?;
        if root.as_dict().is_none() {
            return Err(invalid("top-level value is not a dictionary"));
        }

        let announce = required_str(&root, "announce")?.to_owned();
        let info = root
            .get("info")
            .filter(|info| info.as_dict().is_some())
            .ok_or_else(|| invalid("missing 'info' dictionary"))?;

        let name = required_str(info, "name")?.to_owned();

        let piece_length = info
            .get("piece length")
            .and_then(Value::as_integer)
            .filter(|&n| n > 0 && n <= u32::MAX as i64)
            .ok_or_else(|| invalid("missing or invalid 'piece length'"))?
            as u32;

        let pieces = info
            .get("pieces")
            .and_then(Value::as_bytes)
            .ok_or_else(|| invalid("missing or invalid 'pieces'"))?
            .to_vec();

        let layout = if let Some(length) = info.get("length") {
            FileLayout::Single {
                length: non_negative(length, "length")?,
            }
        } else if let Some(files) = info.get("files") {
            FileLayout::Multi {
                files: parse_files(files)?,
            }
        } else {
            return Err(invalid("neither 'length' nor 'files' present"));
        };

        let total_length = match &layout {
            FileLayout::Single { length } => *length,
            FileLayout::Multi { files } => files
                .iter()
                .try_fold(0u64, |acc, f| acc.checked_add(f.length))
                .ok_or_else(|| invalid("total length overflows"))?,
        };

        // Check torrent pieces
        if pieces.len() % SHA1_HASH_SIZE != 0 {
            return Err(invalid("'pieces' length is not a multiple of 20"));
        }
        let expected_pieces = total_length.div_ceil(piece_length as u64);
        if (pieces.len() / SHA1_HASH_SIZE) as u64 != expected_pieces {
            return Err(invalid(format!(
                "expected {} piece hashes, found {}",
                expected_pieces,
                pieces.len() / SHA1_HASH_SIZE
            )));
        }

        // Hash the info dictionary as it appears in the file
        let info_hash: [u8; 20] = Sha1::digest(bencode::encode(info)).into();

        Ok(TorrentMetadata {
            announce,
            announce_list: root.get("announce-list").and_then(parse_announce_list),
            comment: optional_str(&root, "comment"),
            created_by: optional_str(&root, "created by"),
            creation_date: root.get("creation date").and_then(Value::as_integer),
            name,
            piece_length,
            pieces,
            total_length,
            layout,
            info_hash,
        })
    }

    pub fn announce(&self) -> &str {
        &self.announce
    }

    pub fn announce_list(&self) -> Option<&[Vec<String>]> {
        self.announce_list.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    /// Creation time in seconds since the Unix epoch.
    pub fn creation_date(&self) -> Option<i64> {
        self.creation_date
    }

    /// Returns the suggested filename from the torrent metadata.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name with its last extension removed (`debian.iso` -> `debian`).
    pub fn name_without_extension(&self) -> &str {
        match self.name.rfind('.') {
            Some(i) if i > 0 => &self.name[..i],
            _ => &self.name,
        }
    }

    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    /// Concatenated piece hashes.
    pub fn pieces(&self) -> &[u8] {
        &self.pieces
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    pub fn info_hash(&self) -> &[u8; 20] {
        &self.info_hash
    }

    pub fn info_hash_hex(&self) -> String {
        to_hex(&self.info_hash)
    }

    pub fn num_pieces(&self) -> u32 {
        (self.pieces.len() / SHA1_HASH_SIZE) as u32
    }

    /// Expected SHA-1 of piece `index`.
    pub fn piece_hash(&self, index: u32) -> Option<&[u8]> {
        let begin = index as usize * SHA1_HASH_SIZE;
        self.pieces.get(begin..begin + SHA1_HASH_SIZE)
    }

    /// Byte offset of piece `index` within the content.
    pub fn piece_offset(&self, index: u32) -> u64 {
        index as u64 * self.piece_length as u64
    }

    /// Length of piece `index`; the last piece may be shorter.
    pub fn piece_size(&self, index: u32) -> u32 {
        let begin = self.piece_offset(index);
        let end = (begin + self.piece_length as u64).min(self.total_length);
        end.saturating_sub(begin) as u32
    }
}

fn parse_files(files: &Value) -> Result<Vec<FileEntry>> {
    let files = files
        .as_list()
        .ok_or_else(|| invalid("'files' is not a list"))?;

    files
        .iter()
        .map(|file| {
            let length = file
                .get("length")
                .ok_or_else(|| invalid("file entry without 'length'"))
                .and_then(|length| non_negative(length, "length"))?;
            let path = file
                .get("path")
                .and_then(Value::as_list)
                .ok_or_else(|| invalid("file entry without 'path'"))?
                .iter()
                .map(|segment| {
                    segment
                        .as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| invalid("file path segment is not a string"))
                })
                .collect::<Result<Vec<String>>>()?;
            Ok(FileEntry { path, length })
        })
        .collect()
}

/// Tiers of tracker URLs. Entries that are not strings are skipped.
fn parse_announce_list(value: &Value) -> Option<Vec<Vec<String>>> {
    let tiers: Vec<Vec<String>> = value
        .as_list()?
        .iter()
        .filter_map(Value::as_list)
        .map(|tier| {
            tier.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect::<Vec<String>>()
        })
        .filter(|tier| !tier.is_empty())
        .collect();

    if tiers.is_empty() {
        None
    } else {
        Some(tiers)
    }
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn serialize_hex<S: Serializer>(bytes: &[u8; 20], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&to_hex(bytes))
}

fn serialize_piece_hashes<S: Serializer>(
    pieces: &[u8],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(pieces.chunks(SHA1_HASH_SIZE).map(to_hex))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    fn info_dict(length: i64, piece_length: i64, num_hashes: usize) -> Value {
        Value::Dict(vec![
            (b"length".to_vec(), Value::Integer(length)),
            (b"name".to_vec(), bytes("debian.iso")),
            (b"piece length".to_vec(), Value::Integer(piece_length)),
            (b"pieces".to_vec(), Value::Bytes(vec![0xAB; num_hashes * 20])),
        ])
    }

    fn torrent(info: Value, comment: &str) -> Vec<u8> {
        bencode::encode(&Value::Dict(vec![
            (b"announce".to_vec(), bytes("http://tracker.example/announce")),
            (b"comment".to_vec(), bytes(comment)),
            (b"creation date".to_vec(), Value::Integer(1_700_000_000)),
            (b"info".to_vec(), info),
        ]))
    }

    #[test]
    fn test_parse_single_file() {
        let meta = TorrentMetadata::parse(&torrent(info_dict(40_000, 16_384, 3), "hi")).unwrap();

        assert_eq!(meta.announce(), "http://tracker.example/announce");
        assert_eq!(meta.comment(), Some("hi"));
        assert_eq!(meta.creation_date(), Some(1_700_000_000));
        assert_eq!(meta.created_by(), None);
        assert_eq!(meta.name(), "debian.iso");
        assert_eq!(meta.name_without_extension(), "debian");
        assert_eq!(meta.total_length(), 40_000);
        assert_eq!(meta.layout(), &FileLayout::Single { length: 40_000 });
        assert_eq!(meta.num_pieces(), 3);
        assert_eq!(meta.pieces().len(), 60);
        assert_eq!(meta.piece_hash(2), Some(&[0xAB; 20][..]));
        assert_eq!(meta.piece_hash(3), None);
        assert_eq!(meta.piece_size(0), 16_384);
        assert_eq!(meta.piece_size(2), 40_000 - 2 * 16_384);
        assert_eq!(meta.piece_offset(2), 32_768);
    }

    #[test]
    fn test_info_hash_matches_raw_info_slice() {
        let info = info_dict(40_000, 16_384, 3);
        let raw_info = bencode::encode(&info);
        let meta = TorrentMetadata::parse(&torrent(info, "x")).unwrap();

        let expected: [u8; 20] = Sha1::digest(&raw_info).into();
        assert_eq!(meta.info_hash(), &expected);
        assert_eq!(meta.info_hash_hex().len(), 40);
    }

    #[test]
    fn test_info_hash_stability() {
        let a = TorrentMetadata::parse(&torrent(info_dict(40_000, 16_384, 3), "one")).unwrap();
        let b = TorrentMetadata::parse(&torrent(info_dict(40_000, 16_384, 3), "two")).unwrap();
        let c = TorrentMetadata::parse(&torrent(info_dict(40_001, 16_384, 3), "one")).unwrap();
        let again = TorrentMetadata::parse(&torrent(info_dict(40_000, 16_384, 3), "one")).unwrap();

        // Bytes outside info do not matter, bytes inside do
        assert_eq!(a.info_hash(), b.info_hash());
        assert_eq!(a.info_hash(), again.info_hash());
        assert_ne!(a.info_hash(), c.info_hash());
    }

    #[test]
    fn test_info_hash_uses_document_key_order() {
        let sorted = info_dict(100, 100, 1);
        let mut unsorted = sorted.clone();
        if let Value::Dict(entries) = &mut unsorted {
            entries.reverse();
        }
        let a = TorrentMetadata::parse(&torrent(sorted, "")).unwrap();
        let b = TorrentMetadata::parse(&torrent(unsorted.clone(), "")).unwrap();

        let expected: [u8; 20] = Sha1::digest(bencode::encode(&unsorted)).into();
        assert_eq!(b.info_hash(), &expected);
        assert_ne!(a.info_hash(), b.info_hash());
    }

    #[test]
    fn test_parse_multi_file() {
        let file = |name: &str, length: i64| {
            Value::Dict(vec![
                (b"length".to_vec(), Value::Integer(length)),
                (b"path".to_vec(), Value::List(vec![bytes("dir"), bytes(name)])),
            ])
        };
        let info = Value::Dict(vec![
            (b"files".to_vec(), Value::List(vec![file("a.txt", 10), file("b.txt", 25)])),
            (b"name".to_vec(), bytes("bundle")),
            (b"piece length".to_vec(), Value::Integer(16)),
            (b"pieces".to_vec(), Value::Bytes(vec![1; 3 * 20])),
        ]);
        let meta = TorrentMetadata::parse(&torrent(info, "")).unwrap();

        assert_eq!(meta.total_length(), 35);
        assert_eq!(meta.num_pieces(), 3);
        assert_eq!(meta.piece_size(2), 3);
        match meta.layout() {
            FileLayout::Multi { files } => {
                assert_eq!(files.len(), 2);
                assert_eq!(files[1].path, vec!["dir".to_string(), "b.txt".to_string()]);
                assert_eq!(files[1].length, 25);
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_piece_count_invariant() {
        for (length, piece_length) in [(1, 1), (16_384, 16_384), (16_385, 16_384), (1_000_000, 262_144)] {
            let n = (length as u64).div_ceil(piece_length as u64) as usize;
            let meta = TorrentMetadata::parse(&torrent(info_dict(length, piece_length, n), "")).unwrap();
            assert_eq!(meta.num_pieces() as usize, n);
            assert_eq!(meta.pieces().len(), n * 20);
        }
    }

    #[test]
    fn test_rejects_invalid_torrents() {
        let missing_announce = bencode::encode(&Value::Dict(vec![(
            b"info".to_vec(),
            info_dict(10, 10, 1),
        )]));
        assert!(matches!(
            TorrentMetadata::parse(&missing_announce),
            Err(Error::InvalidTorrentFile(_))
        ));

        let mut no_length = info_dict(10, 10, 1);
        if let Value::Dict(entries) = &mut no_length {
            entries.retain(|(k, _)| k.as_slice() != b"length");
        }
        assert!(matches!(
            TorrentMetadata::parse(&torrent(no_length, "")),
            Err(Error::InvalidTorrentFile(_))
        ));

        // Piece count disagrees with total length
        assert!(matches!(
            TorrentMetadata::parse(&torrent(info_dict(100, 10, 3), "")),
            Err(Error::InvalidTorrentFile(_))
        ));

        assert!(matches!(
            TorrentMetadata::parse(&torrent(info_dict(100, 0, 0), "")),
            Err(Error::InvalidTorrentFile(_))
        ));

        // File lengths adding up past u64::MAX
        let huge = Value::Dict(vec![
            (b"length".to_vec(), Value::Integer(i64::MAX)),
            (b"path".to_vec(), Value::List(vec![bytes("part")])),
        ]);
        let overflowing = Value::Dict(vec![
            (b"files".to_vec(), Value::List(vec![huge.clone(), huge.clone(), huge])),
            (b"name".to_vec(), bytes("bundle")),
            (b"piece length".to_vec(), Value::Integer(16)),
            (b"pieces".to_vec(), Value::Bytes(vec![1; 20])),
        ]);
        assert!(matches!(
            TorrentMetadata::parse(&torrent(overflowing, "")),
            Err(Error::InvalidTorrentFile(_))
        ));

        assert!(matches!(
            TorrentMetadata::parse(b"d8:announce"),
            Err(Error::MalformedEncoding(_))
        ));
        assert!(matches!(
            TorrentMetadata::parse(b"li1ee"),
            Err(Error::InvalidTorrentFile(_))
        ));
    }

    #[test]
    fn test_announce_list() {
        let doc = bencode::encode(&Value::Dict(vec![
            (b"announce".to_vec(), bytes("http://a/announce")),
            (
                b"announce-list".to_vec(),
                Value::List(vec![
                    Value::List(vec![bytes("http://a/announce"), bytes("http://b/announce")]),
                    Value::List(vec![Value::Integer(3)]),
                    Value::List(vec![bytes("http://c/announce")]),
                ]),
            ),
            (b"info".to_vec(), info_dict(10, 10, 1)),
        ]));
        let meta = TorrentMetadata::parse(&doc).unwrap();
        let tiers = meta.announce_list().unwrap();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[1], vec!["http://c/announce".to_string()]);
    }

    #[test]
    fn test_serialize_json() {
        let meta = TorrentMetadata::parse(&torrent(info_dict(40_000, 16_384, 3), "hi")).unwrap();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["name"], "debian.iso");
        assert_eq!(json["info_hash"], meta.info_hash_hex());
        assert_eq!(json["piece_hashes"].as_array().unwrap().len(), 3);
        assert_eq!(json["piece_hashes"][0], "ab".repeat(20));
        assert_eq!(json["layout"]["single"]["length"], 40_000);
    }
}
