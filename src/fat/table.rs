use log::{trace, warn};

use crate::error::Result;
use crate::fat::{ClusterIdx, FatFs, FatType, ReadBytes, FIRST_DATA_CLUSTER};

impl<R: ReadBytes> FatFs<R> {
    /// The first sector of a data cluster, as an absolute sector number on the device.
    /// PANICS: Panics if `cluster` is not a data cluster (i.e. < 2).
    pub fn first_sector_of(&self, cluster: ClusterIdx) -> u64 {
        assert!(cluster >= FIRST_DATA_CLUSTER, "cluster {} is not a data cluster", cluster);
        let data_cluster_idx = u64::from(cluster - FIRST_DATA_CLUSTER);
        (data_cluster_idx << self.log_sectors_per_cluster()) + u64::from(self.first_data_sector())
    }

    /// The first byte of a data cluster on the device.
    /// PANICS: Panics if `cluster` is not a data cluster (i.e. < 2).
    pub fn cluster_address(&self, cluster: ClusterIdx) -> u64 {
        self.sector_address(self.first_sector_of(cluster))
    }

    /// Reads `cluster`'s FAT entry, i.e. the raw successor of `cluster` in its chain. The result may be an end of chain
    /// marker, check it with `is_eof` before treating it as a data cluster.
    pub fn next_cluster(&self, cluster: ClusterIdx) -> Result<ClusterIdx> {
        let fat_type = self.fat_type();
        let byte_offset = u64::from(cluster) * u64::from(fat_type.fat_entry_size());
        let fat_sector = u64::from(self.first_fat_sector()) + (byte_offset >> self.log_bytes_per_sector());
        let sector_offset = byte_offset & u64::from(self.sector_size() - 1);
        let address = self.sector_address(fat_sector) + sector_offset;

        let next = match fat_type {
            FatType::Fat16 => {
                let mut entry = [0; 2];
                self.read_at(address, &mut entry)?;
                u32::from(u16::from_le_bytes(entry))
            }
            FatType::Fat32 => {
                let mut entry = [0; 4];
                self.read_at(address, &mut entry)?;
                u32::from_le_bytes(entry) & fat_type.fat_entry_mask()
            }
        };
        trace!("FAT entry of cluster {}: {:#x}", cluster, next);
        Ok(next)
    }

    /// True if `cluster` is a special value representing the end of a cluster chain.
    pub fn is_eof(&self, cluster: ClusterIdx) -> bool {
        cluster >= self.fat_type().chain_end()
    }

    /// True if `cluster` can hold data, i.e. it is neither reserved nor an end of chain marker.
    pub fn is_data_cluster(&self, cluster: ClusterIdx) -> bool {
        cluster >= FIRST_DATA_CLUSTER && !self.is_eof(cluster)
    }

    /// Iterates over the clusters of the chain starting at `first_cluster`, including `first_cluster` itself.
    pub fn cluster_chain(&self, first_cluster: ClusterIdx) -> ClusterChain<'_, R> {
        ClusterChain::new(first_cluster, self)
    }
}

/// Given the index of a file's first data cluster, iterates over the file's data cluster indices.
///
/// A chain longer than the volume's cluster count must contain a cycle, the iterator stops there instead of looping.
pub struct ClusterChain<'a, R: ReadBytes> {
    current_cluster: Option<ClusterIdx>,
    steps: u32,
    fs: &'a FatFs<R>,
}

impl<'a, R: ReadBytes> ClusterChain<'a, R> {
    pub fn new(first_cluster: ClusterIdx, fs: &'a FatFs<R>) -> Self {
        Self { current_cluster: Some(first_cluster), steps: 0, fs }
    }
}

impl<'a, R: ReadBytes> Iterator for ClusterChain<'a, R> {
    type Item = Result<ClusterIdx>;

    fn next(&mut self) -> Option<Self::Item> {
        let cluster = self.current_cluster.take()?;
        if !self.fs.is_data_cluster(cluster) {
            // 0 marks a file without data, anything else below 2 a broken link
            if !self.fs.is_eof(cluster) && cluster != 0 {
                warn!("Cluster chain links to reserved cluster {}", cluster);
            }
            return None;
        }
        if self.steps >= self.fs.cluster_count() {
            warn!("Cluster chain is longer than the volume, it must contain a cycle");
            return None;
        }
        self.steps += 1;

        match self.fs.next_cluster(cluster) {
            Ok(next) => {
                self.current_cluster = Some(next);
                Some(Ok(cluster))
            }
            Err(err) => Some(Err(err)),
        }
    }
}
