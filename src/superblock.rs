use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

pub const SB_MAGIC: &[u8; 8] = b"integrt\0";
pub const SB_VERSION: u8 = 1;
pub const SUPERBLOCK_SIZE: usize = 24;

/// On-disk superblock of a dm-integrity volume. Stored packed,
/// multi-byte fields little-endian:
///
/// | offset | field                   | size |
/// |--------|-------------------------|------|
/// | 0      | magic                   | 8    |
/// | 8      | version                 | 1    |
/// | 9      | log2_interleave_sectors | 1 (signed) |
/// | 10     | integrity_tag_size      | 2    |
/// | 12     | journal_sections        | 4    |
/// | 16     | provided_data_sectors   | 8    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Superblock {
    pub log2_interleave_sectors: i8,
    pub integrity_tag_size: u16,
    pub journal_sections: u32,
    pub provided_data_sectors: u64,
}

#[derive(Debug, Error)]
pub enum SuperblockError {
    #[error("Cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("No header detected in {path}")]
    NoHeader { path: String },
}

impl Superblock {
    /// Decodes a raw on-disk superblock, validating magic and version.
    pub fn decode(raw: &[u8; SUPERBLOCK_SIZE]) -> Option<Self> {
        if &raw[0..8] != SB_MAGIC || raw[8] != SB_VERSION {
            return None;
        }
        Some(Self {
            log2_interleave_sectors: raw[9] as i8,
            integrity_tag_size: u16::from_le_bytes([raw[10], raw[11]]),
            journal_sections: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
            provided_data_sectors: u64::from_le_bytes([
                raw[16], raw[17], raw[18], raw[19], raw[20], raw[21], raw[22], raw[23],
            ]),
        })
    }

    pub fn encode(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut raw = [0u8; SUPERBLOCK_SIZE];
        raw[0..8].copy_from_slice(SB_MAGIC);
        raw[8] = SB_VERSION;
        raw[9] = self.log2_interleave_sectors as u8;
        raw[10..12].copy_from_slice(&self.integrity_tag_size.to_le_bytes());
        raw[12..16].copy_from_slice(&self.journal_sections.to_le_bytes());
        raw[16..24].copy_from_slice(&self.provided_data_sectors.to_le_bytes());
        raw
    }

    /// Reads and validates the superblock at the start of the device.
    /// Short reads and magic/version mismatches are both reported as a
    /// missing header, like the original tool.
    pub fn read_from(path: &Path) -> Result<Self, SuperblockError> {
        let display = path.display().to_string();
        let mut file = File::open(path).map_err(|source| SuperblockError::Open {
            path: display.clone(),
            source,
        })?;
        let mut raw = [0u8; SUPERBLOCK_SIZE];
        match file.read_exact(&mut raw) {
            Ok(()) => Self::decode(&raw).ok_or(SuperblockError::NoHeader { path: display }),
            Err(_) => Err(SuperblockError::NoHeader { path: display }),
        }
    }
}
