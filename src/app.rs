use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::{FillPattern, ScanConfig, ScanMode};
use crate::device::DeviceScrubber;
use crate::superblock::Superblock;

#[derive(Parser, Debug)]
#[command(
    name = "integriscan",
    about = "Check and format dm-integrity device metadata",
    long_about = "Scans or repairs a block device in large sequential chunks, falling back \
                  to per-sector verification when a chunk read fails, and dumps the \
                  dm-integrity superblock.\n\n\
                  The device is wiped with zeroes, or with random data if --randomize is used."
)]
struct Cli {
    /// Chunk size in sectors for bulk device I/O
    #[arg(long, global = true, default_value_t = 8192, value_parser = clap::value_parser!(u64).range(1..))]
    blocksize: u64,

    /// Use buffered I/O instead of O_DIRECT
    #[arg(long, global = true)]
    no_direct: bool,

    /// Wipe with random data instead of zeroes
    #[arg(long, global = true)]
    randomize: bool,

    /// Enable debug traces
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump the dm-integrity superblock
    Dump { device: PathBuf },
    /// Read the whole device and report unreadable sectors
    Check { device: PathBuf },
    /// Check and rewrite sectors with IO errors
    Fix { device: PathBuf },
    /// Wipe the whole device
    Format { device: PathBuf },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn run_cli(args: &[String]) -> i32 {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() { 1 } else { 0 };
        }
    };

    init_tracing(cli.debug);

    let config = ScanConfig {
        block_sectors: cli.blocksize,
        direct_io: !cli.no_direct,
        fill: if cli.randomize {
            FillPattern::Random
        } else {
            FillPattern::Zero
        },
    };

    match cli.command {
        Command::Dump { device } => cmd_dump(&device),
        Command::Check { device } => cmd_scan(&device, ScanMode::Check, config),
        Command::Fix { device } => cmd_scan(&device, ScanMode::Fix, config),
        Command::Format { device } => cmd_scan(&device, ScanMode::Format, config),
    }
}

fn cmd_dump(device: &Path) -> i32 {
    match Superblock::read_from(device) {
        Ok(sb) => {
            println!("Info for integrity device {}.", device.display());
            println!("log2_interleave_sectors {}", sb.log2_interleave_sectors);
            println!("integrity_tag_size {}", sb.integrity_tag_size);
            println!("journal_sections {}", sb.journal_sections);
            println!("provided_data_sectors {}", sb.provided_data_sectors);
            0
        }
        Err(err) => {
            println!("{err}.");
            1
        }
    }
}

fn cmd_scan(device: &Path, mode: ScanMode, config: ScanConfig) -> i32 {
    debug!(device = %device.display(), ?mode, "running device command");
    let scrubber = DeviceScrubber::with_config(&device.to_string_lossy(), config);
    match scrubber.run(mode) {
        Ok(_report) => 0,
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}
