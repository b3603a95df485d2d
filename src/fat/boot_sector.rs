use crate::fat::mbr::{has_boot_signature, MBR_SIZE};
use crate::fat::{FatType, DENTRY_SIZE};
use crate::util::{byte_array, le_u16, le_u32, trim_padding};

pub const BOOT_SECTOR_SIZE: usize = MBR_SIZE;

const FAT16_EXTENDED_BPB_OFFSET: usize = 36;
const FAT32_BPB_OFFSET: usize = 36;
const FAT32_EXTENDED_BPB_OFFSET: usize = 64;
const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;

/// The BIOS parameter block, decoded field by field from the first sector of a FAT partition.
///
/// The fields up to `sector_count_2` are shared by all FAT versions. What follows depends on the version, which is not
/// stored on disk but derived from the cluster count, so both interpretations are decoded and the caller picks one.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BootSector {
    pub jump_instruction: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub sectors_before_fat: u16,
    pub fat_count: u8,
    pub dir_entries: u16,
    pub sector_count_1: u16,
    pub media_descriptor: u8,
    pub sectors_per_fat_16: u16,
    pub sectors_per_disk_track: u16,
    pub disk_heads: u16,
    pub hidden_sectors_before_partition: u32,
    pub sector_count_2: u32,
    pub fat32: Fat32Bpb,
    ext_bpb_16: ExtendedBpb,
    ext_bpb_32: ExtendedBpb,
    has_signature: bool,
}

/// The FAT32-only block following the common prefix.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Fat32Bpb {
    pub sectors_per_fat: u32,
    pub drive_description_flags: u16,
    pub version: u16,
    pub root_cluster_no: u32,
    pub fs_info_sector_no: u16,
    pub backup_boot_sector_no: u16,
}

/// The extended BPB, located directly after the common prefix on FAT16 and after the FAT32 block on FAT32.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ExtendedBpb {
    pub physical_drive_no: u8,
    pub ext_boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

impl ExtendedBpb {
    fn parse(sector: &[u8; BOOT_SECTOR_SIZE], offset: usize) -> Self {
        Self {
            physical_drive_no: sector[offset],
            ext_boot_signature: sector[offset + 2],
            volume_id: le_u32(sector, offset + 3),
            volume_label: byte_array(sector, offset + 7),
            fs_type: byte_array(sector, offset + 18),
        }
    }
}

impl BootSector {
    pub fn parse(sector: &[u8; BOOT_SECTOR_SIZE]) -> Self {
        Self {
            jump_instruction: byte_array(sector, 0),
            oem_name: byte_array(sector, 3),
            bytes_per_sector: le_u16(sector, 11),
            sectors_per_cluster: sector[13],
            sectors_before_fat: le_u16(sector, 14),
            fat_count: sector[16],
            dir_entries: le_u16(sector, 17),
            sector_count_1: le_u16(sector, 19),
            media_descriptor: sector[21],
            sectors_per_fat_16: le_u16(sector, 22),
            sectors_per_disk_track: le_u16(sector, 24),
            disk_heads: le_u16(sector, 26),
            hidden_sectors_before_partition: le_u32(sector, 28),
            sector_count_2: le_u32(sector, 32),
            fat32: Fat32Bpb {
                sectors_per_fat: le_u32(sector, FAT32_BPB_OFFSET),
                drive_description_flags: le_u16(sector, FAT32_BPB_OFFSET + 4),
                version: le_u16(sector, FAT32_BPB_OFFSET + 6),
                root_cluster_no: le_u32(sector, FAT32_BPB_OFFSET + 8),
                fs_info_sector_no: le_u16(sector, FAT32_BPB_OFFSET + 12),
                backup_boot_sector_no: le_u16(sector, FAT32_BPB_OFFSET + 14),
            },
            ext_bpb_16: ExtendedBpb::parse(sector, FAT16_EXTENDED_BPB_OFFSET),
            ext_bpb_32: ExtendedBpb::parse(sector, FAT32_EXTENDED_BPB_OFFSET),
            has_signature: has_boot_signature(sector),
        }
    }

    pub fn has_signature(&self) -> bool {
        self.has_signature
    }

    pub fn sector_count(&self) -> u32 {
        if self.sector_count_1 != 0 {
            u32::from(self.sector_count_1)
        } else {
            self.sector_count_2
        }
    }

    /// The size of one FAT in sectors: the 16 bit field if set, the FAT32 field otherwise.
    pub fn sectors_per_fat(&self) -> u32 {
        if self.sectors_per_fat_16 != 0 {
            u32::from(self.sectors_per_fat_16)
        } else {
            self.fat32.sectors_per_fat
        }
    }

    /// The number of sectors occupied by the fixed root directory region, always 0 on a well formed FAT32 volume.
    pub fn root_dir_sectors(&self) -> u32 {
        let root_dir_bytes = u32::from(self.dir_entries) * DENTRY_SIZE as u32;
        let bytes_per_sector = u32::from(self.bytes_per_sector);
        if bytes_per_sector == 0 {
            0
        } else {
            (root_dir_bytes + bytes_per_sector - 1) / bytes_per_sector
        }
    }

    pub fn extended_bpb(&self, fat_type: FatType) -> &ExtendedBpb {
        match fat_type {
            FatType::Fat16 => &self.ext_bpb_16,
            FatType::Fat32 => &self.ext_bpb_32,
        }
    }

    /// The volume label without padding, or an empty slice if the extended BPB is absent.
    pub fn volume_label(&self, fat_type: FatType) -> &[u8] {
        let ext_bpb = self.extended_bpb(fat_type);
        if ext_bpb.ext_boot_signature != EXTENDED_BOOT_SIGNATURE {
            &[]
        } else {
            trim_padding(&ext_bpb.volume_label)
        }
    }

    pub fn oem_name(&self) -> &[u8] {
        trim_padding(&self.oem_name)
    }
}
