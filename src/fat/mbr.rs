use crate::util::le_u32;

pub const MBR_SIZE: usize = 512;
pub const PARTITION_TABLE_OFFSET: usize = 0x1BE;
pub const PARTITION_ENTRY_SIZE: usize = 16;
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
pub const BOOT_SIGNATURE_OFFSET: usize = 510;

/// True iff a 512 byte boot record (MBR or FAT boot sector) ends in 0x55, 0xAA.
pub fn has_boot_signature(sector: &[u8; MBR_SIZE]) -> bool {
    sector[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2] == BOOT_SIGNATURE
}

/// One 16 byte entry of the MBR partition table. CHS addresses are ignored, only LBA is supported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MbrPartitionEntry {
    pub status: u8,
    pub partition_type: u8,
    pub lba_start: u32,
    pub sector_count: u32,
}

impl MbrPartitionEntry {
    pub fn parse(entry: &[u8; PARTITION_ENTRY_SIZE]) -> Self {
        Self {
            status: entry[0],
            partition_type: entry[4],
            lba_start: le_u32(entry, 8),
            sector_count: le_u32(entry, 12),
        }
    }

    /// Decodes the `idx`-th (0-based) entry of the partition table.
    /// PANICS: Panics if `idx >= 4`.
    pub fn from_mbr(mbr: &[u8; MBR_SIZE], idx: usize) -> Self {
        assert!(idx < 4, "an MBR has exactly 4 primary partition entries");
        let start = PARTITION_TABLE_OFFSET + idx * PARTITION_ENTRY_SIZE;
        let mut entry = [0; PARTITION_ENTRY_SIZE];
        entry.copy_from_slice(&mbr[start..start + PARTITION_ENTRY_SIZE]);
        Self::parse(&entry)
    }

    pub fn is_empty(&self) -> bool {
        self.partition_type == 0
    }
}
