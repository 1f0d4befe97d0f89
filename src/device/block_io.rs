use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::SECTOR_SIZE;

/// Sector-addressed blocking I/O over an open device. The scan engine
/// works exclusively through this trait so device failures can be
/// simulated in tests.
pub trait BlockIo {
    fn seek_to_sector(&mut self, sector: u64) -> io::Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn flush(&mut self) -> io::Result<()>;
}

pub struct FileDevice {
    file: File,
}

impl FileDevice {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl BlockIo for FileDevice {
    fn seek_to_sector(&mut self, sector: u64) -> io::Result<()> {
        self.file
            .seek(SeekFrom::Start(sector * SECTOR_SIZE as u64))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// BLKGETSIZE64, _IOR(0x12, 114, u64).
#[cfg(target_os = "linux")]
const BLKGETSIZE64: libc::c_ulong = 0x8008_1272;

#[cfg(target_os = "linux")]
fn block_device_bytes(file: &File) -> io::Result<u64> {
    use std::os::unix::io::AsRawFd;

    let mut bytes: u64 = 0;
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut bytes) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(bytes)
}

/// Resolves the device's total size as a count of 512-byte sectors.
/// Block devices are sized with the BLKGETSIZE64 ioctl; regular files
/// (device images) fall back to their metadata length.
pub fn device_size_sectors(path: &Path) -> io::Result<u64> {
    let metadata = std::fs::metadata(path)?;

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::fs::FileTypeExt;

        if metadata.file_type().is_block_device() {
            let file = File::open(path)?;
            return Ok(block_device_bytes(&file)? / SECTOR_SIZE as u64);
        }
    }

    Ok(metadata.len() / SECTOR_SIZE as u64)
}
