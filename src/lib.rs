mod app;
mod config;
mod device;
mod superblock;

pub use crate::app::run_cli;
pub use crate::config::{FillPattern, ScanConfig, ScanMode};
pub use crate::device::{
    BlockIo, DeviceScrubber, FileDevice, SECTOR_SIZE, ScanError, ScanReport, device_size_sectors,
};
pub use crate::superblock::{SB_MAGIC, SB_VERSION, SUPERBLOCK_SIZE, Superblock, SuperblockError};
