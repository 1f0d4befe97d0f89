use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::config::ScanMode;

use super::block_io::{BlockIo, FileDevice, device_size_sectors};
use super::direct_io::{AlignedBuffer, open_device};
use super::fill::init_sector;
use super::progress::{ProgressMeter, clear_line};
use super::{DIRECT_IO_ALIGNMENT, DeviceScrubber, SECTOR_SIZE, ScanError};

/// What a scan pass found. Counts and sector lists accumulate across
/// the whole device; a non-empty `bad_sectors` does not make the pass
/// itself a failure.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanReport {
    pub total_sectors: u64,
    pub bytes_processed: u64,
    pub bad_sectors: Vec<u64>,
    pub sectors_wiped: Vec<u64>,
    pub wipe_failures: Vec<u64>,
    pub write_errors: u64,
    pub unexpected_errors: u64,
}

impl DeviceScrubber {
    /// Runs a full pass over the device in the given mode, resolving
    /// the device size first and opening with the access the mode
    /// needs. The handle is closed on every exit path when the
    /// [`FileDevice`] drops.
    pub fn run(&self, mode: ScanMode) -> Result<ScanReport, ScanError> {
        let path = Path::new(&self.device_path);
        debug!(device = %self.device_path, ?mode, "starting scan");

        let total_sectors =
            device_size_sectors(path).map_err(|source| ScanError::DeviceSize {
                path: self.device_path.clone(),
                source,
            })?;
        let file =
            open_device(path, mode, self.direct_io).map_err(|source| ScanError::Open {
                path: self.device_path.clone(),
                source,
            })?;
        let mut dev = FileDevice::new(file);
        self.scan_device(&mut dev, 0, total_sectors, mode)
    }

    /// Chunked pass over `start_sector..total_sectors`. Each chunk is
    /// `block_sectors` long except the final remainder. Bulk-read
    /// failures degrade to the per-sector walk; only a seek failure in
    /// this loop aborts the pass.
    pub fn scan_device<D: BlockIo>(
        &self,
        dev: &mut D,
        start_sector: u64,
        total_sectors: u64,
        mode: ScanMode,
    ) -> Result<ScanReport, ScanError> {
        debug_assert!(start_sector <= total_sectors);

        let chunk_capacity = self.block_sectors as usize * SECTOR_SIZE;
        let mut buffer = AlignedBuffer::new(chunk_capacity, DIRECT_IO_ALIGNMENT)?;
        let mut progress = ProgressMeter::new(total_sectors * SECTOR_SIZE as u64);
        let mut report = ScanReport {
            total_sectors,
            ..ScanReport::default()
        };
        let mut offset = start_sector;

        while offset < total_sectors {
            let chunk_sectors = self.block_sectors.min(total_sectors - offset);
            let chunk_len = chunk_sectors as usize * SECTOR_SIZE;

            if let Err(source) = dev.seek_to_sector(offset) {
                clear_line();
                return Err(ScanError::Seek {
                    sector: offset,
                    source,
                });
            }

            let chunk = &mut buffer.as_mut_slice()[..chunk_len];
            if mode == ScanMode::Format {
                debug!("wipe {}-{}", offset, offset + chunk_sectors);
                for sector in chunk.chunks_exact_mut(SECTOR_SIZE) {
                    init_sector(sector, self.fill);
                }
                match dev.write(chunk) {
                    Ok(n) if n == chunk_len => {}
                    Ok(_) | Err(_) => {
                        clear_line();
                        println!("Write error, sector {offset}.");
                        report.write_errors += 1;
                    }
                }
            } else {
                match dev.read(&mut *chunk) {
                    Ok(n) if n == chunk_len => {}
                    Ok(_) | Err(_) => self.scan_sectors_one_by_one(
                        dev,
                        chunk,
                        offset,
                        chunk_sectors,
                        mode,
                        &mut report,
                    ),
                }
            }

            offset += chunk_sectors;
            report.bytes_processed += chunk_len as u64;
            progress.update(offset * SECTOR_SIZE as u64);
        }

        if let Err(e) = dev.flush() {
            clear_line();
            println!("Sync failed ({e}).");
        }
        progress.finish(offset * SECTOR_SIZE as u64);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io;

    use super::*;
    use crate::config::{FillPattern, ScanConfig};

    /// In-memory device with injectable per-sector faults. Reads or
    /// writes covering any faulty sector fail with the configured
    /// errno, the way a real bulk operation over a media defect does.
    struct SimulatedDevice {
        data: Vec<u8>,
        bad: BTreeSet<u64>,
        unexpected: BTreeSet<u64>,
        failing_seeks: BTreeSet<u64>,
        failing_writes: BTreeSet<u64>,
        pos: u64,
        writes: Vec<u64>,
    }

    impl SimulatedDevice {
        fn new(sectors: u64) -> Self {
            let mut data = vec![0u8; sectors as usize * SECTOR_SIZE];
            for (index, sector) in data.chunks_exact_mut(SECTOR_SIZE).enumerate() {
                sector.fill(index as u8 | 1);
            }
            Self {
                data,
                bad: BTreeSet::new(),
                unexpected: BTreeSet::new(),
                failing_seeks: BTreeSet::new(),
                failing_writes: BTreeSet::new(),
                pos: 0,
                writes: Vec::new(),
            }
        }

        fn with_bad_sectors(sectors: u64, bad: &[u64]) -> Self {
            let mut dev = Self::new(sectors);
            dev.bad = bad.iter().copied().collect();
            dev
        }

        fn sector(&self, index: u64) -> &[u8] {
            let start = index as usize * SECTOR_SIZE;
            &self.data[start..start + SECTOR_SIZE]
        }
    }

    impl BlockIo for SimulatedDevice {
        fn seek_to_sector(&mut self, sector: u64) -> io::Result<()> {
            if self.failing_seeks.contains(&sector) {
                return Err(io::Error::from_raw_os_error(libc::EINVAL));
            }
            self.pos = sector;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let sectors = (buf.len() / SECTOR_SIZE) as u64;
            for sector in self.pos..self.pos + sectors {
                if self.bad.contains(&sector) {
                    return Err(io::Error::from_raw_os_error(libc::EIO));
                }
                if self.unexpected.contains(&sector) {
                    return Err(io::Error::from_raw_os_error(libc::ENOMEM));
                }
            }
            let start = self.pos as usize * SECTOR_SIZE;
            buf.copy_from_slice(&self.data[start..start + buf.len()]);
            self.pos += sectors;
            Ok(buf.len())
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let sectors = (buf.len() / SECTOR_SIZE) as u64;
            for sector in self.pos..self.pos + sectors {
                if self.failing_writes.contains(&sector) {
                    return Err(io::Error::from_raw_os_error(libc::EIO));
                }
            }
            let start = self.pos as usize * SECTOR_SIZE;
            self.data[start..start + buf.len()].copy_from_slice(buf);
            for sector in self.pos..self.pos + sectors {
                self.writes.push(sector);
                self.bad.remove(&sector);
            }
            self.pos += sectors;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn scrubber(block_sectors: u64, fill: FillPattern) -> DeviceScrubber {
        DeviceScrubber::with_config(
            "simulated",
            ScanConfig {
                block_sectors,
                direct_io: false,
                fill,
            },
        )
    }

    #[test]
    fn every_sector_processed_with_remainder_chunk() {
        // 1000 = 15 * 64 + 40, so the last chunk is a remainder.
        let mut dev = SimulatedDevice::new(1000);
        let report = scrubber(64, FillPattern::Zero)
            .scan_device(&mut dev, 0, 1000, ScanMode::Check)
            .unwrap();
        assert_eq!(report.bytes_processed, 1000 * SECTOR_SIZE as u64);
        assert_eq!(report.total_sectors, 1000);
        assert!(dev.writes.is_empty());
        assert!(report.bad_sectors.is_empty());
    }

    #[test]
    fn empty_device_completes_without_io() {
        let mut dev = SimulatedDevice::new(0);
        let report = scrubber(64, FillPattern::Zero)
            .scan_device(&mut dev, 0, 0, ScanMode::Check)
            .unwrap();
        assert_eq!(report.bytes_processed, 0);
        assert!(dev.writes.is_empty());
    }

    #[test]
    fn check_reports_bad_sectors_and_never_writes() {
        let mut dev = SimulatedDevice::with_bad_sectors(512, &[50, 51, 200]);
        let pristine = dev.data.clone();
        let report = scrubber(256, FillPattern::Zero)
            .scan_device(&mut dev, 0, 512, ScanMode::Check)
            .unwrap();
        assert_eq!(report.bad_sectors, vec![50, 51, 200]);
        assert!(report.sectors_wiped.is_empty());
        assert!(dev.writes.is_empty());
        assert_eq!(dev.data, pristine);
    }

    #[test]
    fn fix_wipes_only_bad_sectors() {
        let mut dev = SimulatedDevice::with_bad_sectors(512, &[50, 51, 200]);
        let pristine = dev.data.clone();
        let report = scrubber(256, FillPattern::Zero)
            .scan_device(&mut dev, 0, 512, ScanMode::Fix)
            .unwrap();
        assert_eq!(report.sectors_wiped, vec![50, 51, 200]);
        assert!(report.wipe_failures.is_empty());
        assert_eq!(dev.writes, vec![50, 51, 200]);
        for sector in 0..512u64 {
            if [50, 51, 200].contains(&sector) {
                assert!(dev.sector(sector).iter().all(|&b| b == 0));
            } else {
                let start = sector as usize * SECTOR_SIZE;
                assert_eq!(dev.sector(sector), &pristine[start..start + SECTOR_SIZE]);
            }
        }
    }

    #[test]
    fn second_fix_pass_is_idempotent() {
        let mut dev = SimulatedDevice::with_bad_sectors(512, &[50, 51, 200]);
        let scrub = scrubber(256, FillPattern::Zero);
        scrub.scan_device(&mut dev, 0, 512, ScanMode::Fix).unwrap();
        dev.writes.clear();
        let report = scrub.scan_device(&mut dev, 0, 512, ScanMode::Fix).unwrap();
        assert!(report.sectors_wiped.is_empty());
        assert!(dev.writes.is_empty());
    }

    #[test]
    fn format_zero_fills_every_sector_exactly_once() {
        let mut dev = SimulatedDevice::new(200);
        let report = scrubber(64, FillPattern::Zero)
            .scan_device(&mut dev, 0, 200, ScanMode::Format)
            .unwrap();
        assert_eq!(report.bytes_processed, 200 * SECTOR_SIZE as u64);
        assert!(dev.data.iter().all(|&b| b == 0));
        let mut written = dev.writes.clone();
        written.sort_unstable();
        assert_eq!(written, (0..200u64).collect::<Vec<_>>());
        assert_eq!(dev.writes.len(), 200);
    }

    #[test]
    fn format_random_fill_rewrites_with_non_zero_data() {
        let mut dev = SimulatedDevice::new(16);
        let pristine = dev.data.clone();
        scrubber(8, FillPattern::Random)
            .scan_device(&mut dev, 0, 16, ScanMode::Format)
            .unwrap();
        assert_eq!(dev.writes.len(), 16);
        assert_ne!(dev.data, pristine);
        assert!(dev.data.iter().any(|&b| b != 0));
    }

    #[test]
    fn format_write_failure_is_reported_and_scan_continues() {
        let mut dev = SimulatedDevice::new(200);
        dev.failing_writes.insert(100);
        let report = scrubber(64, FillPattern::Zero)
            .scan_device(&mut dev, 0, 200, ScanMode::Format)
            .unwrap();
        assert_eq!(report.write_errors, 1);
        assert_eq!(report.bytes_processed, 200 * SECTOR_SIZE as u64);
        // Every chunk outside the failed one (64..128) still got wiped.
        assert!(dev.sector(0).iter().all(|&b| b == 0));
        assert!(dev.sector(63).iter().all(|&b| b == 0));
        assert!(dev.sector(128).iter().all(|&b| b == 0));
        assert!(dev.sector(199).iter().all(|&b| b == 0));
        assert!(dev.sector(100).iter().any(|&b| b != 0));
    }

    #[test]
    fn failed_rewrite_is_a_wipe_failure_not_a_wipe() {
        let mut dev = SimulatedDevice::with_bad_sectors(128, &[50, 90]);
        dev.failing_writes.insert(50);
        let report = scrubber(64, FillPattern::Zero)
            .scan_device(&mut dev, 0, 128, ScanMode::Fix)
            .unwrap();
        assert_eq!(report.wipe_failures, vec![50]);
        assert_eq!(report.sectors_wiped, vec![90]);
        assert_eq!(report.bytes_processed, 128 * SECTOR_SIZE as u64);
        // The failed sector was never overwritten and stays bad.
        assert!(dev.bad.contains(&50));
        assert!(!dev.bad.contains(&90));
    }

    #[test]
    fn sector_seek_failure_skips_only_that_sector() {
        let mut dev = SimulatedDevice::with_bad_sectors(128, &[30, 40]);
        dev.failing_seeks.insert(30);
        let report = scrubber(64, FillPattern::Zero)
            .scan_device(&mut dev, 0, 128, ScanMode::Check)
            .unwrap();
        // Sector 30's seek failure is reported for that sector only;
        // the walk still reaches sector 40 and the scan finishes.
        assert_eq!(report.unexpected_errors, 1);
        assert_eq!(report.bad_sectors, vec![40]);
        assert_eq!(report.bytes_processed, 128 * SECTOR_SIZE as u64);
    }

    #[test]
    fn chunk_seek_failure_is_fatal() {
        let mut dev = SimulatedDevice::new(256);
        dev.failing_seeks.insert(128);
        let err = scrubber(64, FillPattern::Zero)
            .scan_device(&mut dev, 0, 256, ScanMode::Check)
            .unwrap_err();
        assert!(matches!(err, ScanError::Seek { sector: 128, .. }));
    }

    #[test]
    fn unexpected_errors_are_counted_but_never_repaired() {
        let mut dev = SimulatedDevice::new(128);
        dev.unexpected.insert(30);
        let report = scrubber(64, FillPattern::Zero)
            .scan_device(&mut dev, 0, 128, ScanMode::Fix)
            .unwrap();
        assert_eq!(report.unexpected_errors, 1);
        assert!(report.sectors_wiped.is_empty());
        assert!(report.bad_sectors.is_empty());
        assert!(dev.writes.is_empty());
    }

    #[test]
    fn report_serializes_for_embedding() {
        let mut dev = SimulatedDevice::with_bad_sectors(128, &[30]);
        let report = scrubber(64, FillPattern::Zero)
            .scan_device(&mut dev, 0, 128, ScanMode::Check)
            .unwrap();
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_sectors"], 128);
        assert_eq!(json["bad_sectors"], serde_json::json!([30]));
        assert_eq!(json["write_errors"], 0);
    }

    #[test]
    fn scan_honors_start_offset() {
        let mut dev = SimulatedDevice::with_bad_sectors(128, &[10, 100]);
        let report = scrubber(32, FillPattern::Zero)
            .scan_device(&mut dev, 64, 128, ScanMode::Check)
            .unwrap();
        assert_eq!(report.bad_sectors, vec![100]);
        assert_eq!(report.bytes_processed, 64 * SECTOR_SIZE as u64);
    }
}
