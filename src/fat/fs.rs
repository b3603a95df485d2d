use log::{debug, trace};

use crate::error::{FatError, Result};
use crate::fat::{
    has_boot_signature, BootSector, ClusterIdx, Directory, FatType, MbrPartitionEntry, ReadBytes, BOOT_SECTOR_SIZE,
    DENTRY_SIZE, FIRST_DATA_CLUSTER, MBR_SIZE,
};
use crate::util::exact_log2;

/// Where the root directory lives. FAT16 reserves a fixed, contiguous region between the FATs and the data region for
/// it; on FAT32 it is an ordinary cluster chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RootDir {
    Region { first_sector: u32, entry_count: u32 },
    Cluster(ClusterIdx),
}

/// A mounted FAT16/FAT32 volume.
///
/// A FAT partition consists of 4 regions: the reserved sectors (which include the boot sector), the file allocation
/// tables, the root directory region (FAT16 only) and the data region. `FatFs` stores where these regions start and
/// never changes after `mount`, all traversal state lives in caller-owned handles (`Directory`, `FatFile`). Nothing is
/// cached, every operation re-reads what it needs through the injected `ReadBytes`.
#[derive(Debug)]
pub struct FatFs<R: ReadBytes> {
    reader: R,
    boot_sector: BootSector,
    fat_type: FatType,
    log_bytes_per_sector: u8,
    log_sectors_per_cluster: u8,
    partition_start: u32,
    first_fat_sector: u32,
    root_dir: RootDir,
    first_data_sector: u32,
    cluster_count: u32,
}

impl<R: ReadBytes> FatFs<R> {
    /// Mounts the FAT volume in the first MBR partition of the device behind `reader`. `sector_size` must match the
    /// volume's bytes per sector (conventionally 512).
    pub fn mount(reader: R, sector_size: u32) -> Result<Self> {
        let mut mbr = [0; MBR_SIZE];
        reader.read_bytes(0, &mut mbr)?;
        if !has_boot_signature(&mbr) {
            return Err(FatError::InvalidBootSector);
        }

        // only the first entry is considered, there is no scan for other FAT partitions
        let partition = MbrPartitionEntry::from_mbr(&mbr, 0);
        if partition.is_empty() {
            return Err(FatError::NoPartitionFound);
        }
        let partition_start = partition.lba_start;
        debug!(
            "Partition 0: type {:#04x}, starts at sector {}, {} sectors",
            partition.partition_type, partition_start, partition.sector_count
        );

        let mut sector = [0; BOOT_SECTOR_SIZE];
        reader.read_bytes(u64::from(partition_start) * u64::from(sector_size), &mut sector)?;
        let boot_sector = BootSector::parse(&sector);

        if u32::from(boot_sector.bytes_per_sector) != sector_size {
            return Err(FatError::SectorSizeMismatch { expected: sector_size, found: boot_sector.bytes_per_sector });
        }
        let log_bytes_per_sector = exact_log2(boot_sector.bytes_per_sector)
            .ok_or(FatError::MalformedBpb("bytes per sector is not a power of two"))?;
        let log_sectors_per_cluster = exact_log2(boot_sector.sectors_per_cluster)
            .ok_or(FatError::MalformedBpb("sectors per cluster is not a power of two"))?;

        let sectors_per_fat = boot_sector.sectors_per_fat();
        if sectors_per_fat == 0 || boot_sector.fat_count == 0 {
            return Err(FatError::MalformedBpb("the volume has no FAT"));
        }
        let root_dir_sectors = boot_sector.root_dir_sectors();

        const OVERFLOW: FatError = FatError::MalformedBpb("regions exceed the 32 bit sector range");
        let first_fat_sector = partition_start.checked_add(u32::from(boot_sector.sectors_before_fat)).ok_or(OVERFLOW)?;
        let first_root_dir_sector = sectors_per_fat
            .checked_mul(u32::from(boot_sector.fat_count))
            .and_then(|fat_sectors| first_fat_sector.checked_add(fat_sectors))
            .ok_or(OVERFLOW)?;
        let first_data_sector = first_root_dir_sector.checked_add(root_dir_sectors).ok_or(OVERFLOW)?;

        let data_sector_count = boot_sector
            .sector_count()
            .checked_sub(first_data_sector - partition_start)
            .ok_or(FatError::MalformedBpb("the volume is smaller than its metadata regions"))?;
        let cluster_count = data_sector_count >> log_sectors_per_cluster;

        let fat_type =
            FatType::from_cluster_count(cluster_count).ok_or(FatError::UnsupportedFatVariant { cluster_count })?;

        let root_dir = match fat_type {
            FatType::Fat16 => RootDir::Region {
                first_sector: first_root_dir_sector,
                entry_count: u32::from(boot_sector.dir_entries),
            },
            FatType::Fat32 => {
                if root_dir_sectors != 0 {
                    return Err(FatError::MalformedBpb("FAT32 volume declares a fixed root directory region"));
                }
                let root_cluster = boot_sector.fat32.root_cluster_no;
                if root_cluster < FIRST_DATA_CLUSTER || fat_type.chain_end() <= root_cluster {
                    return Err(FatError::MalformedBpb("FAT32 root cluster is not a data cluster"));
                }
                RootDir::Cluster(root_cluster)
            }
        };

        if !boot_sector.has_signature() {
            return Err(FatError::InvalidBootSector);
        }

        debug!(
            "Mounted {}: {} clusters of {} bytes, FAT at sector {}, data at sector {}, root {:?}",
            fat_type,
            cluster_count,
            u32::from(boot_sector.bytes_per_sector) << log_sectors_per_cluster,
            first_fat_sector,
            first_data_sector,
            root_dir
        );

        Ok(Self {
            reader,
            boot_sector,
            fat_type,
            log_bytes_per_sector,
            log_sectors_per_cluster,
            partition_start,
            first_fat_sector,
            root_dir,
            first_data_sector,
            cluster_count,
        })
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.boot_sector
    }

    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    pub fn sector_size(&self) -> u32 {
        1 << self.log_bytes_per_sector
    }

    pub fn log_bytes_per_sector(&self) -> u8 {
        self.log_bytes_per_sector
    }

    pub fn log_sectors_per_cluster(&self) -> u8 {
        self.log_sectors_per_cluster
    }

    /// in bytes
    pub fn cluster_size(&self) -> u32 {
        self.sector_size() << self.log_sectors_per_cluster
    }

    pub fn dentries_per_cluster(&self) -> u32 {
        self.cluster_size() / DENTRY_SIZE as u32
    }

    /// The number of data clusters, i.e. valid cluster indices are `2..cluster_count + 2`.
    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    pub fn partition_start(&self) -> u32 {
        self.partition_start
    }

    pub fn first_fat_sector(&self) -> u32 {
        self.first_fat_sector
    }

    pub fn first_data_sector(&self) -> u32 {
        self.first_data_sector
    }

    pub fn root_dir(&self) -> RootDir {
        self.root_dir
    }

    pub fn volume_label(&self) -> String {
        let label = self.boot_sector.volume_label(self.fat_type);
        label.iter().map(|&byte| char::from(byte)).collect()
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Fills `buf` from the device, starting at the absolute byte `address`.
    pub(crate) fn read_at(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        trace!("Reading {} bytes at {:#x}", buf.len(), address);
        self.reader.read_bytes(address, buf)?;
        Ok(())
    }

    pub(crate) fn sector_address(&self, sector: u64) -> u64 {
        sector << self.log_bytes_per_sector
    }

    /// The first byte of the root directory.
    pub(crate) fn root_dir_address(&self) -> u64 {
        match self.root_dir {
            RootDir::Region { first_sector, .. } => self.sector_address(u64::from(first_sector)),
            RootDir::Cluster(cluster) => self.cluster_address(cluster),
        }
    }

    pub fn root(&self) -> Directory {
        Directory::root()
    }
}
