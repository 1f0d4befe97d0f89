use std::io::{self, Write};

use crate::config::ScanMode;

use super::SECTOR_SIZE;
use super::block_io::BlockIo;
use super::fill::init_sector;
use super::progress::clear_line;
use super::scan::ScanReport;

/// Outcome classification for a failed sector read. EIO and EILSEQ are
/// the two errno values media defects surface as; anything else is an
/// unexpected condition and is never auto-repaired.
pub(super) enum ReadFailure {
    PossibleBadSector,
    Unexpected,
}

pub(super) fn classify_read_error(err: &io::Error) -> ReadFailure {
    match err.raw_os_error() {
        Some(code) if code == libc::EIO || code == libc::EILSEQ => ReadFailure::PossibleBadSector,
        _ => ReadFailure::Unexpected,
    }
}

impl super::DeviceScrubber {
    /// Re-walks a chunk whose bulk read came up short, one sector at a
    /// time, isolating exactly which sectors are unreadable. Nothing in
    /// here aborts the outer scan; every failure is reported for its
    /// sector and the walk moves on.
    pub(super) fn scan_sectors_one_by_one<D: BlockIo>(
        &self,
        dev: &mut D,
        buf: &mut [u8],
        first_sector: u64,
        count: u64,
        mode: ScanMode,
        report: &mut ScanReport,
    ) {
        clear_line();
        let sector_buf = &mut buf[..SECTOR_SIZE];

        for sector in first_sector..first_sector + count {
            if let Err(e) = dev.seek_to_sector(sector) {
                println!("Seek error, sector {sector} ({e}).");
                report.unexpected_errors += 1;
                continue;
            }

            let err = match dev.read(&mut *sector_buf) {
                Ok(n) if n == SECTOR_SIZE => continue,
                Ok(n) => {
                    println!("Short read, sector {sector} ({n} bytes).");
                    report.unexpected_errors += 1;
                    continue;
                }
                Err(err) => err,
            };

            match classify_read_error(&err) {
                ReadFailure::Unexpected => {
                    println!("Error sector {sector} ({err}).");
                    report.unexpected_errors += 1;
                    continue;
                }
                ReadFailure::PossibleBadSector => {}
            }

            if mode != ScanMode::Fix {
                println!("IO error sector {sector}.");
                report.bad_sectors.push(sector);
                continue;
            }

            // Try to overwrite the sector.
            init_sector(sector_buf, self.fill);

            if let Err(e) = dev.seek_to_sector(sector) {
                println!("Seek error, sector {sector} ({e}).");
                report.wipe_failures.push(sector);
                continue;
            }

            match dev.write(sector_buf) {
                Ok(n) if n == SECTOR_SIZE => {
                    println!("Bad sector {sector} wiped.");
                    report.sectors_wiped.push(sector);
                }
                Ok(n) => {
                    println!("Wipe failed, sector {sector} ({n} bytes written).");
                    report.wipe_failures.push(sector);
                }
                Err(e) => {
                    println!("Wipe failed, sector {sector} ({e}).");
                    report.wipe_failures.push(sector);
                }
            }
        }
        let _ = io::stdout().flush();
    }
}
