//! # File Assembly
//!
//! Once every piece is verified, the pieces are written at their offsets
//! (`index * piece_length`) into a file of exactly `total_length` bytes.
//!
//! The content is written to `<name>.part` first and renamed into place only
//! when every piece is on disk, so a failed download never leaves a partial
//! file under the final name.

use crate::error::{Error, Result};
use crate::torrent::TorrentMetadata;

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Sanitize a filename to prevent path traversal and basic issues.
pub fn sanitize_filename(filename: &str) -> String {
    // Replace path separators with underscores to prevent directory traversal
    let safe_name = filename.replace(['/', '\\'], "_");

    // Use default name if empty or a relative path component
    if safe_name.trim().is_empty() || safe_name == "." || safe_name == ".." {
        "download".to_string()
    } else {
        safe_name
    }
}

fn part_path(output: &Path) -> PathBuf {
    let mut name: OsString = output.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    output.with_file_name(name)
}

/// Write all pieces to `output`.
pub fn assemble(
    metadata: &TorrentMetadata,
    pieces: &HashMap<u32, Vec<u8>>,
    output: &Path,
) -> Result<()> {
    // Check every piece is present before touching the disk
    if let Some(missing) = (0..metadata.num_pieces()).find(|i| !pieces.contains_key(i)) {
        return Err(Error::MissingPiece(missing));
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let part = part_path(output);
    let result = write_pieces(metadata, pieces, &part);
    if result.is_err() {
        let _ = fs::remove_file(&part);
        return result;
    }

    fs::rename(&part, output)?;

    info!(
        "Saved {} ({} bytes) in {:?}",
        metadata.name(),
        metadata.total_length(),
        output
    );

    Ok(())
}

fn write_pieces(metadata: &TorrentMetadata, pieces: &HashMap<u32, Vec<u8>>, path: &Path) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.set_len(metadata.total_length())?;

    for index in 0..metadata.num_pieces() {
        let data = pieces.get(&index).ok_or(Error::MissingPiece(index))?;
        file.seek(SeekFrom::Start(metadata.piece_offset(index)))?;
        file.write_all(data)?;
    }

    file.sync_all()?;

    Ok(())
}

/// Persist a single verified piece as `<dir>/<nameWithoutExtension>-piece-<index>`.
pub fn persist_piece(metadata: &TorrentMetadata, index: u32, data: &[u8], dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let file_name = format!(
        "{}-piece-{}",
        sanitize_filename(metadata.name_without_extension()),
        index
    );
    let path = dir.join(file_name);
    fs::write(&path, data)?;

    info!("Saved piece {} of {} in {:?}", index, metadata.name(), path);

    Ok(path)
}
