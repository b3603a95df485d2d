mod boot_sector;
mod dentry;
mod dir_iter;
mod file;
mod fs;
mod mbr;
mod path;
mod reader;
mod table;
#[cfg(test)]
pub(crate) mod test_image;

pub use self::boot_sector::*;
pub use self::dentry::*;
pub use self::dir_iter::*;
pub use self::file::*;
pub use self::fs::*;
pub use self::mbr::*;
pub use self::path::*;
pub use self::reader::*;
pub use self::table::*;

/// An index identifying a cluster in the partition, i.e. an index into the FAT.
pub type ClusterIdx = u32;

/// Both short directory entries and LFN entries are 32 bytes long.
pub const DENTRY_SIZE: usize = 32;

/// Clusters 0 and 1 are reserved, the n-th FAT entry corresponds to the (n-2)-th data cluster.
pub const FIRST_DATA_CLUSTER: ClusterIdx = 2;

/// Volumes with fewer data clusters are FAT12.
pub const FAT16_MIN_CLUSTERS: u32 = 4085;
/// Volumes with fewer data clusters (and at least `FAT16_MIN_CLUSTERS`) are FAT16.
pub const FAT32_MIN_CLUSTERS: u32 = 65525;
/// Volumes with at least this many data clusters cannot be addressed with 28 bit FAT32 entries.
pub const FAT32_MAX_CLUSTERS: u32 = 268_435_445;

/// The FAT version is not stored on disk, it is derived from the number of data clusters alone.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FatType {
    Fat16,
    Fat32,
}

impl FatType {
    /// Returns `None` for FAT12 and exFAT-sized cluster counts, neither of which is supported.
    pub fn from_cluster_count(cluster_count: u32) -> Option<Self> {
        match cluster_count {
            count if count < FAT16_MIN_CLUSTERS => None,
            count if count < FAT32_MIN_CLUSTERS => Some(Self::Fat16),
            count if count < FAT32_MAX_CLUSTERS => Some(Self::Fat32),
            _ => None,
        }
    }

    /// Size of one FAT entry in bytes
    pub fn fat_entry_size(self) -> u32 {
        match self {
            Self::Fat16 => 2,
            Self::Fat32 => 4,
        }
    }

    /// The smallest FAT entry value that marks the end of a cluster chain.
    pub fn chain_end(self) -> ClusterIdx {
        match self {
            Self::Fat16 => 0xFFF8,
            Self::Fat32 => 0x0FFF_FFF8,
        }
    }

    /// Only the lower 28 bits of a FAT32 entry are part of the cluster index.
    pub fn fat_entry_mask(self) -> u32 {
        match self {
            Self::Fat16 => 0xFFFF,
            Self::Fat32 => 0x0FFF_FFFF,
        }
    }
}

impl std::fmt::Display for FatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fat16 => write!(f, "FAT16"),
            Self::Fat32 => write!(f, "FAT32"),
        }
    }
}
