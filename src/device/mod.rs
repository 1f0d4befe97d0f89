mod block_io;
mod direct_io;
mod fill;
mod progress;
mod scan;
mod sector;

use std::io;

use thiserror::Error;

use crate::config::{FillPattern, ScanConfig};

pub use block_io::{BlockIo, FileDevice, device_size_sectors};
pub use scan::ScanReport;

pub const SECTOR_SIZE: usize = 512;

const DIRECT_IO_ALIGNMENT: usize = 4096;

/// Fatal scan conditions. Everything else (bad sectors, short writes,
/// failed rewrites, the final-flush failure) is reported inline and
/// counted in the [`ScanReport`] while the scan keeps going.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot determine size of {path}: {source}")]
    DeviceSize {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("seek failed at sector {sector}: {source}")]
    Seek {
        sector: u64,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct DeviceScrubber {
    device_path: String,
    block_sectors: u64,
    direct_io: bool,
    fill: FillPattern,
}

impl DeviceScrubber {
    pub fn new(path: &str) -> Self {
        Self::with_config(path, ScanConfig::default())
    }

    pub fn with_config(path: &str, config: ScanConfig) -> Self {
        Self {
            device_path: path.to_string(),
            block_sectors: config.block_sectors.max(1),
            direct_io: config.direct_io,
            fill: config.fill,
        }
    }
}
