use std::cmp::min;
use std::io;

use log::warn;

use crate::error::{FatError, Result};
use crate::fat::{ClusterIdx, FatFs, ReadBytes};
use crate::util::FromU32;

/// A sequential read cursor over a file's cluster chain. The triple of current cluster, offset into it and remaining
/// file size is the entire read state; there is no hidden buffering, so a copy of a `FatFile` resumes exactly where the
/// original stood when it was copied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FatFile {
    cluster: ClusterIdx,
    /// in bytes, equal to the cluster size once the current cluster is exhausted
    offset: u32,
    remaining: u32,
}

impl FatFile {
    pub fn new(first_cluster: ClusterIdx, size: u32) -> Self {
        Self { cluster: first_cluster, offset: 0, remaining: size }
    }

    /// The number of bytes between the cursor and the end of the file, as declared by its directory entry.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn cluster(&self) -> ClusterIdx {
        self.cluster
    }

    /// Reads up to `buf.len()` bytes and advances the cursor past them. Returns the number of bytes read, 0 at the end
    /// of the file.
    ///
    /// A chain that ends before the declared file size is exhausted cuts the file short: the read returns what the
    /// chain holds and 0 from then on. Likewise, if the device fails after some bytes were read, those bytes are
    /// returned and the failing read is retried by the next call; only a failure before any byte was transferred is an
    /// error.
    pub fn read<R: ReadBytes>(&mut self, fs: &FatFs<R>, buf: &mut [u8]) -> Result<usize> {
        let cluster_size = fs.cluster_size();
        let mut transferred = 0;

        while transferred < buf.len() && self.remaining > 0 {
            if self.offset == cluster_size {
                match fs.next_cluster(self.cluster) {
                    Ok(next) => {
                        self.cluster = next;
                        self.offset = 0;
                    }
                    Err(err) => return partial_read(transferred, err),
                }
            }
            if !fs.is_data_cluster(self.cluster) {
                warn!("Cluster chain ends {} bytes before the end of the file", self.remaining);
                break;
            }

            let len = min(
                usize::fromx(min(cluster_size - self.offset, self.remaining)),
                buf.len() - transferred,
            );
            let address = fs.cluster_address(self.cluster) + u64::from(self.offset);
            if let Err(err) = fs.read_at(address, &mut buf[transferred..transferred + len]) {
                return partial_read(transferred, err);
            }

            // len <= remaining, so it fits into a u32
            let len_u32 = len as u32;
            self.offset += len_u32;
            self.remaining -= len_u32;
            transferred += len;
        }
        Ok(transferred)
    }

    /// Reads everything up to the end of the file (or its cluster chain) and appends it to `data`.
    ///
    /// `data` grows by at most one cluster per step, so a corrupt size in the directory entry cannot make it allocate
    /// more than the chain actually holds.
    pub fn read_to_end<R: ReadBytes>(&mut self, fs: &FatFs<R>, data: &mut Vec<u8>) -> Result<usize> {
        let start_len = data.len();
        let cluster_size = fs.cluster_size();
        while self.remaining > 0 {
            let filled = data.len();
            data.resize(filled + usize::fromx(min(cluster_size, self.remaining)), 0);
            match self.read(fs, &mut data[filled..]) {
                Ok(n) => {
                    data.truncate(filled + n);
                    if n == 0 {
                        break;
                    }
                }
                Err(err) => {
                    data.truncate(filled);
                    return Err(err);
                }
            }
        }
        Ok(data.len() - start_len)
    }
}

fn partial_read(transferred: usize, err: FatError) -> Result<usize> {
    if transferred == 0 {
        return Err(err);
    }
    warn!("Read stopped after {} bytes: {}", transferred, err);
    Ok(transferred)
}

/// Adapts a `FatFile` to `std::io::Read`, e.g. to stream a file with `io::copy`.
pub struct FileReader<'a, R: ReadBytes> {
    fs: &'a FatFs<R>,
    file: FatFile,
}

impl<'a, R: ReadBytes> FileReader<'a, R> {
    pub fn new(fs: &'a FatFs<R>, file: FatFile) -> Self {
        Self { fs, file }
    }

    pub fn file(&self) -> &FatFile {
        &self.file
    }
}

impl<'a, R: ReadBytes> io::Read for FileReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.file.read(self.fs, buf)?)
    }
}

impl<R: ReadBytes> FatFs<R> {
    pub fn open_reader(&self, path: &str) -> Result<FileReader<'_, R>> {
        Ok(FileReader::new(self, self.open(path)?))
    }
}
