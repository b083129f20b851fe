//! # Rivulet
//!
//! Command-line front end of the download engine.
//!
//! ## Usage
//!
//! ```bash
//! rivulet download <torrent_file> [-d <dir>] [-w <workers>] [-t <secs>] [--block-size <bytes>]
//! rivulet piece <torrent_file> <index>
//! rivulet info <torrent_file>
//! ```
//!
//! Set `RUST_LOG=debug` to trace the peer wire exchange.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rivulet::assembler::sanitize_filename;
use rivulet::{Engine, EngineConfig, Progress, ProgressSink, TorrentMetadata};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A command-line BitTorrent downloader, written in Rust."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the full content of a torrent
    Download {
        /// Path to the .torrent file
        torrent: PathBuf,

        /// Overwrite an existing output file without asking
        #[arg(short, long)]
        force: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Download and verify a single piece
    Piece {
        /// Path to the .torrent file
        torrent: PathBuf,

        /// Zero-based piece index
        index: u32,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Print the torrent metadata as JSON
    Info {
        /// Path to the .torrent file
        torrent: PathBuf,
    },
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Directory receiving downloads
    #[arg(short = 'd', long, default_value = "downloads")]
    output_dir: PathBuf,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 5)]
    workers: usize,

    /// Overall download timeout in seconds
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    /// Port announced to the tracker
    #[arg(short, long, default_value_t = 6881)]
    port: u16,

    /// Directory receiving single pieces [default: <OUTPUT_DIR>/temp]
    #[arg(long)]
    piece_dir: Option<PathBuf>,

    /// Size of each block request in bytes (at most 16384)
    #[arg(long, default_value_t = 16384)]
    block_size: u32,

    /// Read/write timeout on peer sockets in seconds
    #[arg(long, default_value_t = 15)]
    io_timeout: u64,

    /// Pause after a failed attempt in milliseconds
    #[arg(long, default_value_t = 1000)]
    retry_backoff: u64,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        let config = EngineConfig::default()
            .with_download_dir(&self.output_dir)
            .with_workers(self.workers)
            .with_download_timeout(Duration::from_secs(self.timeout))
            .with_port(self.port)
            .with_block_size(self.block_size)
            .with_io_timeout(Duration::from_secs(self.io_timeout))
            .with_retry_backoff(Duration::from_millis(self.retry_backoff));

        match &self.piece_dir {
            Some(dir) => config.with_piece_dir(dir),
            None => config,
        }
    }
}

/// Feeds verified pieces into a terminal progress bar.
struct BarSink {
    bar: ProgressBar,
}

impl ProgressSink for BarSink {
    fn notify(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    // Sinks may be called out of order by concurrent workers
    fn piece_completed(&self, progress: &Progress<'_>) {
        self.bar.inc(1);
        self.notify(&progress.to_string());
    }
}

fn open_torrent(path: &Path) -> Result<TorrentMetadata> {
    if !path.exists() {
        return Err(anyhow!("could not find torrent file: {:?}", path));
    }
    TorrentMetadata::open(path).with_context(|| format!("could not load torrent {:?}", path))
}

/// Ask before replacing an existing file.
fn confirm_overwrite(path: &Path) -> Result<bool> {
    println!("Output file {:?} already exists.", path);
    print!("Do you want to overwrite it? (y/N): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_lowercase();

    Ok(input == "y" || input == "yes")
}

fn download(torrent: PathBuf, force: bool, args: EngineArgs) -> Result<()> {
    let metadata = open_torrent(&torrent)?;
    let config = args.config();

    let output = config.download_dir.join(sanitize_filename(metadata.name()));
    if output.exists() && !force && !confirm_overwrite(&output)? {
        println!("Download cancelled.");
        return Ok(());
    }

    let bar = ProgressBar::new(metadata.num_pieces() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {pos}/{len} pieces [{bar:40.cyan/blue}] {percent}% {msg}")?
            .progress_chars("#>-"),
    );

    let engine = Engine::new(config)?.with_progress(Arc::new(BarSink { bar: bar.clone() }));
    let result = engine.download(&metadata);
    bar.finish_and_clear();

    let path = result?;
    println!("Saved in {:?}.", path);

    Ok(())
}

fn download_piece(torrent: PathBuf, index: u32, args: EngineArgs) -> Result<()> {
    let metadata = open_torrent(&torrent)?;
    let engine = Engine::new(args.config())?;

    let data = engine.download_piece(&metadata, index)?;
    println!(
        "Piece {} ({} bytes) saved in {:?}.",
        index,
        data.len(),
        engine.config().piece_dir
    );

    Ok(())
}

fn info(torrent: PathBuf) -> Result<()> {
    let metadata = open_torrent(&torrent)?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Download {
            torrent,
            force,
            engine,
        } => download(torrent, force, engine),
        Command::Piece {
            torrent,
            index,
            engine,
        } => download_piece(torrent, index, engine),
        Command::Info { torrent } => info(torrent),
    }
}

fn main() {
    // Initialize logger
    pretty_env_logger::init_timed();

    // Parse arguments
    let cli = Cli::parse();

    // Run program, eventually exit failure
    if let Err(error) = run(cli) {
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet::PeerAddress;
    use std::net::Ipv4Addr;

    #[test]
    fn test_engine_flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "rivulet",
            "download",
            "a.torrent",
            "-d",
            "out",
            "-w",
            "2",
            "--block-size",
            "4096",
            "--io-timeout",
            "3",
            "--retry-backoff",
            "250",
        ])
        .unwrap();

        let Command::Download { engine, .. } = cli.command else {
            panic!("expected the download subcommand");
        };
        let config = engine.config();
        assert_eq!(config.download_dir, PathBuf::from("out"));
        assert_eq!(config.piece_dir, PathBuf::from("out").join("temp"));
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.io_timeout, Duration::from_secs(3));
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_piece_dir_flag() {
        let cli = Cli::try_parse_from(["rivulet", "piece", "a.torrent", "4", "--piece-dir", "p"]).unwrap();

        let Command::Piece { index, engine, .. } = cli.command else {
            panic!("expected the piece subcommand");
        };
        assert_eq!(index, 4);
        assert_eq!(engine.config().piece_dir, PathBuf::from("p"));
    }

    #[test]
    fn test_bar_counts_out_of_order_completions() {
        let bar = ProgressBar::hidden();
        bar.set_length(3);
        let sink = BarSink { bar: bar.clone() };

        // Second worker reports before the first
        for completed in [2, 1] {
            sink.piece_completed(&Progress {
                index: completed as u32,
                completed,
                total: 3,
                name: "file.bin",
                peer: PeerAddress::new(Ipv4Addr::LOCALHOST, 6881),
            });
        }
        assert_eq!(bar.position(), 2);
    }
}
