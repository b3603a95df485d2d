//! Fabricates partitioned FAT16/FAT32 images in memory. Only sectors that are written are stored, so even volumes with
//! hundreds of millions of clusters are cheap to build.

use std::collections::{BTreeMap, HashMap};
use std::io;

use crate::fat::reader::out_of_range;
use crate::fat::{lfn_checksum, Attributes, ClusterIdx, Directory, FatType, ReadBytes, DENTRY_SIZE, FIRST_DATA_CLUSTER};

pub const SECTOR_SIZE: u32 = 512;
const PARTITION_START: u32 = 63;
const LFN_CHAR_OFFSETS: [usize; 13] = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

#[derive(Debug, Clone)]
pub struct SparseImage {
    len: u64,
    sectors: HashMap<u64, Vec<u8>>,
}

impl SparseImage {
    pub fn new(len: u64) -> Self {
        Self { len, sectors: HashMap::new() }
    }

    pub fn write(&mut self, address: u64, data: &[u8]) {
        assert!(address + data.len() as u64 <= self.len, "write beyond the end of the image");
        let sector_size = u64::from(SECTOR_SIZE);
        let mut written = 0;
        while written < data.len() {
            let position = address + written as u64;
            let offset = (position % sector_size) as usize;
            let len = (SECTOR_SIZE as usize - offset).min(data.len() - written);
            let sector = self.sectors.entry(position / sector_size).or_insert_with(|| vec![0; SECTOR_SIZE as usize]);
            sector[offset..offset + len].copy_from_slice(&data[written..written + len]);
            written += len;
        }
    }
}

impl ReadBytes for SparseImage {
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        if address.checked_add(buf.len() as u64).map_or(true, |end| end > self.len) {
            return Err(out_of_range(address, buf.len()));
        }
        let sector_size = u64::from(SECTOR_SIZE);
        let mut read = 0;
        while read < buf.len() {
            let position = address + read as u64;
            let offset = (position % sector_size) as usize;
            let len = (SECTOR_SIZE as usize - offset).min(buf.len() - read);
            match self.sectors.get(&(position / sector_size)) {
                Some(sector) => buf[read..read + len].copy_from_slice(&sector[offset..offset + len]),
                None => buf[read..read + len].fill(0),
            }
            read += len;
        }
        Ok(())
    }
}

/// Fails every read that touches a byte at or beyond `fail_from`.
pub struct FailingReader {
    pub image: SparseImage,
    pub fail_from: u64,
}

impl ReadBytes for FailingReader {
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        if address + buf.len() as u64 > self.fail_from {
            return Err(io::Error::new(io::ErrorKind::Other, "injected device failure"));
        }
        self.image.read_bytes(address, buf)
    }
}

/// Builds an image with a single FAT partition starting at sector 63: 2 FATs, 1 (FAT16) or 32 (FAT32) reserved
/// sectors, a 512 entry root region on FAT16 and root cluster 2 on FAT32. The root directory always starts with a
/// volume label entry. Files and directories get the lowest free clusters; directory chains are extended with whatever
/// is free when `build` runs, so they usually end up fragmented.
pub struct ImageBuilder {
    fat_type: FatType,
    sectors_per_cluster: u32,
    reserved_sectors: u32,
    root_entries: u32,
    sectors_per_fat: u32,
    image: SparseImage,
    fat: BTreeMap<ClusterIdx, u32>,
    next_free: ClusterIdx,
    /// keyed by first cluster, 0 is the root directory
    dirs: BTreeMap<ClusterIdx, Vec<[u8; DENTRY_SIZE]>>,
}

impl ImageBuilder {
    pub const FAT16_CLUSTERS: u32 = 4200;
    pub const FAT32_CLUSTERS: u32 = 70_000;

    pub fn fat16() -> Self {
        Self::new(FatType::Fat16, Self::FAT16_CLUSTERS, 1)
    }

    pub fn fat32() -> Self {
        Self::new(FatType::Fat32, Self::FAT32_CLUSTERS, 1)
    }

    pub fn with_type(fat_type: FatType) -> Self {
        match fat_type {
            FatType::Fat16 => Self::fat16(),
            FatType::Fat32 => Self::fat32(),
        }
    }

    pub fn new(fat_type: FatType, cluster_count: u32, sectors_per_cluster: u8) -> Self {
        let (reserved_sectors, root_entries) = match fat_type {
            FatType::Fat16 => (1, 512),
            FatType::Fat32 => (32, 0),
        };
        let fat_bytes = (u64::from(cluster_count) + 2) * u64::from(fat_type.fat_entry_size());
        let sectors_per_fat = ((fat_bytes + u64::from(SECTOR_SIZE) - 1) / u64::from(SECTOR_SIZE)) as u32;
        let root_dir_sectors = root_entries * DENTRY_SIZE as u32 / SECTOR_SIZE;
        let sector_count = u64::from(reserved_sectors)
            + 2 * u64::from(sectors_per_fat)
            + u64::from(root_dir_sectors)
            + u64::from(cluster_count) * u64::from(sectors_per_cluster);
        let sector_count = u32::try_from(sector_count).unwrap();
        let image = SparseImage::new((u64::from(PARTITION_START) + u64::from(sector_count)) * u64::from(SECTOR_SIZE));

        let mut builder = Self {
            fat_type,
            sectors_per_cluster: u32::from(sectors_per_cluster),
            reserved_sectors,
            root_entries,
            sectors_per_fat,
            image,
            fat: BTreeMap::new(),
            next_free: FIRST_DATA_CLUSTER,
            dirs: BTreeMap::new(),
        };
        builder.write_mbr(sector_count);
        builder.write_boot_sector(sector_count, sectors_per_cluster);
        builder.set_fat(0, 0x0FFF_FFF8 & fat_type.fat_entry_mask());
        builder.set_fat(1, fat_type.fat_entry_mask());

        let label = short_slot(b"TESTVOL    ", Attributes::VOLUME_ID, 0, 0);
        builder.dirs.insert(0, vec![label]);
        if fat_type == FatType::Fat32 {
            let root_cluster = builder.allocate();
            assert_eq!(root_cluster, 2);
            builder.set_fat(root_cluster, builder.chain_end());
        }
        builder
    }

    fn write_mbr(&mut self, sector_count: u32) {
        let mut mbr = [0u8; 512];
        let entry = &mut mbr[0x1BE..0x1BE + 16];
        entry[0] = 0x80;
        entry[4] = match self.fat_type {
            FatType::Fat16 => 0x0E,
            FatType::Fat32 => 0x0C,
        };
        entry[8..12].copy_from_slice(&PARTITION_START.to_le_bytes());
        entry[12..16].copy_from_slice(&sector_count.to_le_bytes());
        mbr[510..].copy_from_slice(&[0x55, 0xAA]);
        self.image.write(0, &mbr);
    }

    fn write_boot_sector(&mut self, sector_count: u32, sectors_per_cluster: u8) {
        let mut sector = [0u8; 512];
        sector[..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        sector[3..11].copy_from_slice(b"MSWIN4.1");
        sector[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        sector[13] = sectors_per_cluster;
        sector[14..16].copy_from_slice(&(self.reserved_sectors as u16).to_le_bytes());
        sector[16] = 2;
        sector[17..19].copy_from_slice(&(self.root_entries as u16).to_le_bytes());
        sector[21] = 0xF8;
        sector[28..32].copy_from_slice(&PARTITION_START.to_le_bytes());

        let ext_bpb_offset = match self.fat_type {
            FatType::Fat16 => {
                if sector_count < 0x10000 {
                    sector[19..21].copy_from_slice(&(sector_count as u16).to_le_bytes());
                } else {
                    sector[32..36].copy_from_slice(&sector_count.to_le_bytes());
                }
                sector[22..24].copy_from_slice(&(self.sectors_per_fat as u16).to_le_bytes());
                36
            }
            FatType::Fat32 => {
                sector[32..36].copy_from_slice(&sector_count.to_le_bytes());
                sector[36..40].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
                sector[44..48].copy_from_slice(&2u32.to_le_bytes());
                sector[48..50].copy_from_slice(&1u16.to_le_bytes());
                sector[50..52].copy_from_slice(&6u16.to_le_bytes());
                64
            }
        };
        sector[ext_bpb_offset] = 0x80;
        sector[ext_bpb_offset + 2] = 0x29;
        sector[ext_bpb_offset + 3..ext_bpb_offset + 7].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        sector[ext_bpb_offset + 7..ext_bpb_offset + 18].copy_from_slice(b"TESTVOL    ");
        let fs_type: &[u8; 8] = match self.fat_type {
            FatType::Fat16 => b"FAT16   ",
            FatType::Fat32 => b"FAT32   ",
        };
        sector[ext_bpb_offset + 18..ext_bpb_offset + 26].copy_from_slice(fs_type);
        sector[510..].copy_from_slice(&[0x55, 0xAA]);
        self.image.write(self.bpb_address(), &sector);
    }

    pub fn partition_start(&self) -> u32 {
        PARTITION_START
    }

    pub fn bpb_address(&self) -> u64 {
        u64::from(PARTITION_START) * u64::from(SECTOR_SIZE)
    }

    pub fn cluster_size(&self) -> u32 {
        SECTOR_SIZE * self.sectors_per_cluster
    }

    pub fn chain_end(&self) -> u32 {
        self.fat_type.fat_entry_mask()
    }

    fn root_dir_sector(&self) -> u32 {
        PARTITION_START + self.reserved_sectors + 2 * self.sectors_per_fat
    }

    pub fn cluster_address(&self, cluster: ClusterIdx) -> u64 {
        assert!(cluster >= FIRST_DATA_CLUSTER);
        let root_dir_sectors = self.root_entries * DENTRY_SIZE as u32 / SECTOR_SIZE;
        let first_data_sector = u64::from(self.root_dir_sector() + root_dir_sectors);
        let sector = first_data_sector + u64::from(cluster - FIRST_DATA_CLUSTER) * u64::from(self.sectors_per_cluster);
        sector * u64::from(SECTOR_SIZE)
    }

    /// Writes `value` into the entry of `cluster` in both FATs.
    pub fn set_fat(&mut self, cluster: ClusterIdx, value: u32) {
        self.fat.insert(cluster, value);
        for fat_idx in 0..2 {
            let address = self.fat_entry_address(fat_idx, cluster);
            match self.fat_type {
                FatType::Fat16 => self.image.write(address, &(value as u16).to_le_bytes()),
                FatType::Fat32 => self.image.write(address, &value.to_le_bytes()),
            }
        }
    }

    /// Where the entry of `cluster` lives in the `fat_idx`-th FAT, for patching a built image.
    pub fn fat_entry_address(&self, fat_idx: u32, cluster: ClusterIdx) -> u64 {
        let fat_sector = PARTITION_START + self.reserved_sectors + fat_idx * self.sectors_per_fat;
        let entry_size = self.fat_type.fat_entry_size();
        u64::from(fat_sector) * u64::from(SECTOR_SIZE) + u64::from(cluster) * u64::from(entry_size)
    }

    pub fn allocate(&mut self) -> ClusterIdx {
        while self.fat.contains_key(&self.next_free) {
            self.next_free += 1;
        }
        let cluster = self.next_free;
        // reserve until the caller links it
        self.fat.insert(cluster, self.chain_end());
        cluster
    }

    /// Links `clusters` into one chain, terminated by an end of chain marker.
    pub fn link(&mut self, clusters: &[ClusterIdx]) {
        for (idx, &cluster) in clusters.iter().enumerate() {
            let next = clusters.get(idx + 1).copied().unwrap_or_else(|| self.chain_end());
            self.set_fat(cluster, next);
        }
    }

    /// Writes `data` to the clusters of a chain, in chain order.
    pub fn write_clusters(&mut self, clusters: &[ClusterIdx], data: &[u8]) {
        let cluster_size = self.cluster_size() as usize;
        assert!(data.len() <= clusters.len() * cluster_size);
        for (&cluster, chunk) in clusters.iter().zip(data.chunks(cluster_size)) {
            let address = self.cluster_address(cluster);
            self.image.write(address, chunk);
        }
    }

    pub fn clusters_for(&self, len: usize) -> usize {
        let cluster_size = self.cluster_size() as usize;
        (len + cluster_size - 1) / cluster_size
    }

    /// Adds a file occupying the lowest free clusters, returns its first cluster (0 for an empty file).
    pub fn add_file(&mut self, dir: Directory, name: &[u8; 11], data: &[u8]) -> ClusterIdx {
        let clusters = (0..self.clusters_for(data.len())).map(|_| self.allocate()).collect::<Vec<_>>();
        self.add_file_with_clusters(dir, name, data, &clusters)
    }

    /// Adds a file stored in exactly the given clusters, in the given order.
    pub fn add_file_with_clusters(
        &mut self,
        dir: Directory,
        name: &[u8; 11],
        data: &[u8],
        clusters: &[ClusterIdx],
    ) -> ClusterIdx {
        assert_eq!(clusters.len(), self.clusters_for(data.len()));
        self.link(clusters);
        self.write_clusters(clusters, data);
        let first_cluster = clusters.first().copied().unwrap_or(0);
        self.add_slot(dir, short_slot(name, Attributes::ARCHIVE, first_cluster, data.len() as u32));
        first_cluster
    }

    pub fn add_long_named_file(&mut self, dir: Directory, long_name: &str, name: &[u8; 11], data: &[u8]) -> ClusterIdx {
        for slot in lfn_slots(long_name, name) {
            self.add_slot(dir, slot);
        }
        self.add_file(dir, name, data)
    }

    /// Adds an empty directory including its `.` and `..` entries.
    pub fn add_dir(&mut self, parent: Directory, name: &[u8; 11]) -> Directory {
        let cluster = self.allocate();
        self.set_fat(cluster, self.chain_end());
        let dot = short_slot(b".          ", Attributes::DIRECTORY, cluster, 0);
        let dot_dot = short_slot(b"..         ", Attributes::DIRECTORY, parent.first_cluster, 0);
        self.dirs.insert(cluster, vec![dot, dot_dot]);
        self.add_slot(parent, short_slot(name, Attributes::DIRECTORY, cluster, 0));
        Directory::new(cluster)
    }

    /// Appends a raw slot to a directory.
    pub fn add_slot(&mut self, dir: Directory, slot: [u8; DENTRY_SIZE]) {
        self.dirs.get_mut(&dir.first_cluster).expect("unknown directory").push(slot);
    }

    pub fn build(mut self) -> SparseImage {
        let dirs = std::mem::take(&mut self.dirs);
        for (first_cluster, slots) in dirs {
            let bytes = slots.concat();
            if first_cluster == 0 && self.fat_type == FatType::Fat16 {
                assert!(slots.len() <= self.root_entries as usize, "root region overflow");
                let address = u64::from(self.root_dir_sector()) * u64::from(SECTOR_SIZE);
                self.image.write(address, &bytes);
                continue;
            }

            let first_cluster = if first_cluster == 0 { FIRST_DATA_CLUSTER } else { first_cluster };
            let mut clusters = vec![first_cluster];
            while clusters.len() < self.clusters_for(bytes.len()) {
                clusters.push(self.allocate());
            }
            self.link(&clusters);
            self.write_clusters(&clusters, &bytes);
        }
        self.image
    }
}

/// A short directory entry.
pub fn short_slot(name: &[u8; 11], attrs: Attributes, first_cluster: ClusterIdx, size: u32) -> [u8; DENTRY_SIZE] {
    let mut slot = [0u8; DENTRY_SIZE];
    slot[..11].copy_from_slice(name);
    slot[11] = attrs.bits();
    slot[20..22].copy_from_slice(&((first_cluster >> 16) as u16).to_le_bytes());
    slot[26..28].copy_from_slice(&(first_cluster as u16).to_le_bytes());
    slot[28..32].copy_from_slice(&size.to_le_bytes());
    slot
}

/// The LFN entries spelling out `long_name` for the short entry `name`, in on-disk order (last fragment first).
pub fn lfn_slots(long_name: &str, name: &[u8; 11]) -> Vec<[u8; DENTRY_SIZE]> {
    let checksum = lfn_checksum(name);
    let mut units = long_name.encode_utf16().collect::<Vec<_>>();
    let entry_count = (units.len() + 12) / 13;
    if units.len() % 13 != 0 {
        units.push(0x0000);
    }
    units.resize(entry_count * 13, 0xFFFF);

    (0..entry_count)
        .rev()
        .map(|idx| {
            let mut slot = [0u8; DENTRY_SIZE];
            slot[0] = (idx + 1) as u8 | if idx + 1 == entry_count { 0x40 } else { 0 };
            slot[11] = Attributes::LONG_NAME.bits();
            slot[13] = checksum;
            for (unit, &offset) in units[idx * 13..(idx + 1) * 13].iter().zip(LFN_CHAR_OFFSETS.iter()) {
                slot[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
            }
            slot
        })
        .collect()
}
