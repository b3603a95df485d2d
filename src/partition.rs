use std::convert::TryInto;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use anyhow::{bail, Context, Result};
use fat_reader_rs::fat::ReadBytes;
use fs2::FileExt;
use log::debug;
use memmap::{Mmap, MmapOptions};
use nix::ioctl_read;

/// A disk image or block device, mapped read-only into memory.
pub struct Partition {
    mmap: Mmap,
}

impl Partition {
    pub fn open<P: AsRef<Path>>(partition_path: P) -> Result<Self> {
        let partition_path = partition_path.as_ref();
        let file = OpenOptions::new().read(true).open(partition_path)?;
        // the lock is only advisory and keeps out cooperating writers (e.g. another tool holding an exclusive lock)
        // the lock is automatically released after both file and mmap are dropped
        FileExt::try_lock_shared(&file)?;

        let size = Self::get_file_size(&file)?;
        if size == 0 {
            bail!("{} is empty", partition_path.display());
        }
        // SAFETY: We assume that no other process is modifying the partition while it is mapped
        let mmap = unsafe { MmapOptions::new().len(size).map(&file)? };
        debug!("Mapped {} ({} bytes)", partition_path.display(), size);
        Ok(Self { mmap })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    fn get_file_size(file: &File) -> Result<usize> {
        let metadata = file.metadata()?;
        let filetype = metadata.file_type();
        let len = if filetype.is_file() {
            metadata.len()
        } else if filetype.is_block_device() {
            Self::get_block_device_size(file)?
        } else {
            bail!("Expected path to a file or a block device")
        };

        len.try_into()
            .with_context(|| format!("File size {} does not fit into a usize", len))
    }

    // declared in linux/fs.h
    // The type is declared as size_t due to a bug that cannot be fixed due to backwards compatibility; u64 is what the
    // kernel actually writes. cfr. https://lists.debian.org/debian-glibc/2005/12/msg00069.html
    #[cfg(target_os = "linux")]
    ioctl_read!(block_device_size, 0x12, 114, u64);

    /// PANICS: Panics if `file` is not a block device.
    #[cfg(target_os = "linux")]
    fn get_block_device_size(file: &File) -> Result<u64> {
        assert!(file.metadata()?.file_type().is_block_device());
        let mut size = 0;
        // SAFETY: BLKGETSIZE64 writes exactly one u64 into `size`, which outlives the call.
        unsafe {
            Self::block_device_size(file.as_raw_fd(), &mut size)?;
        }
        Ok(size)
    }
}

impl ReadBytes for Partition {
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        self.as_slice().read_bytes(address, buf)
    }
}
