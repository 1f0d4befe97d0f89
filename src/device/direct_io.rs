use std::alloc::{Layout, alloc, dealloc};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::ptr::NonNull;

use crate::config::ScanMode;

#[cfg(windows)]
const FILE_FLAG_NO_BUFFERING: u32 = 0x20000000;

/// Opens the device for a scan pass. Check runs read-only, fix and
/// format need read-write. Unbuffered access is requested unless the
/// caller disabled it.
pub(super) fn open_device(path: &Path, mode: ScanMode, direct: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    if mode.needs_write() {
        options.write(true);
    }
    if direct {
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_DIRECT);
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::OpenOptionsExt;
            options.custom_flags(FILE_FLAG_NO_BUFFERING);
        }
    }
    options.open(path)
}

/// Page-aligned chunk buffer, allocated once per scan and reused for
/// every chunk. Unbuffered device access requires the alignment.
pub(super) struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    alignment: usize,
}

impl AlignedBuffer {
    pub(super) fn new(len: usize, alignment: usize) -> io::Result<Self> {
        let layout = Layout::from_size_align(len, alignment).map_err(|_| {
            io::Error::new(ErrorKind::InvalidInput, "Invalid alignment for buffer.")
        })?;
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(ErrorKind::Other, "Failed to allocate aligned buffer.")
        })?;
        Ok(Self {
            ptr,
            len,
            alignment,
        })
    }

    pub(super) fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        let Ok(layout) = Layout::from_size_align(self.len, self.alignment) else {
            return;
        };
        unsafe {
            dealloc(self.ptr.as_ptr(), layout);
        }
    }
}
