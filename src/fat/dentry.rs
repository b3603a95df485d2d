use bitflags::bitflags;
use chrono::{NaiveDate, NaiveDateTime};
use static_assertions::const_assert_eq;

use crate::fat::{ClusterIdx, DENTRY_SIZE};
use crate::lohi::LoHi;
use crate::util::{byte_array, le_u16, le_u32};

/// Marks a slot that has never been used. No used slots follow it.
pub const DIR_TABLE_END_MARKER: u8 = 0x00;
/// Marks a deleted slot. The directory may contain more valid dentries after it.
pub const DELETED_MARKER: u8 = 0xE5;
/// Stored in place of a leading 0xE5, which would otherwise be read as `DELETED_MARKER`.
pub const ESCAPED_E5_MARKER: u8 = 0x05;

const LFN_ATTRS_MASK: u8 = 0x3F;
const LFN_SEQUENCE_NO_MASK: u8 = 0x1F;
const LFN_LAST_ENTRY_FLAG: u8 = 0x40;

const NAME_LOWERCASE_FLAG: u8 = 0x08;
const EXTENSION_LOWERCASE_FLAG: u8 = 0x10;

const FAT_BASE_YEAR: i32 = 1980;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
        const LONG_NAME = Self::READ_ONLY.bits() | Self::HIDDEN.bits() | Self::SYSTEM.bits() | Self::VOLUME_ID.bits();
    }
}

/// One 32 byte directory slot, classified by its first byte and attributes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FatPseudoDentry {
    Dentry(FatDentry),
    LongFileName(LongFileName),
    Deleted,
    DirTableEnd,
}

impl FatPseudoDentry {
    pub fn parse(slot: &[u8; DENTRY_SIZE]) -> Self {
        match slot[0] {
            DIR_TABLE_END_MARKER => Self::DirTableEnd,
            DELETED_MARKER => Self::Deleted,
            // only the lower 6 bits of the attributes are defined
            _ if slot[11] & LFN_ATTRS_MASK == Attributes::LONG_NAME.bits() => {
                Self::LongFileName(LongFileName::parse(slot))
            }
            _ => Self::Dentry(FatDentry::parse(slot)),
        }
    }

    pub fn as_dentry(&self) -> Option<&FatDentry> {
        match self {
            Self::Dentry(dentry) => Some(dentry),
            _ => None,
        }
    }

    pub fn as_long_file_name(&self) -> Option<&LongFileName> {
        match self {
            Self::LongFileName(long_file_name) => Some(long_file_name),
            _ => None,
        }
    }
}

/// A short (8.3) directory entry. `short_name` and `short_extension` are stored exactly as on disk, i.e. a leading
/// 0xE5 is still escaped as 0x05.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct FatDentry {
    pub short_name: [u8; 8],
    pub short_extension: [u8; 3],
    pub attrs: Attributes,
    pub short_name_case: u8,
    pub create_time_10_ms: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub access_date: u16,
    pub first_cluster_hi: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub first_cluster_lo: u16,
    pub file_size: u32,
}

impl FatDentry {
    pub fn parse(slot: &[u8; DENTRY_SIZE]) -> Self {
        Self {
            short_name: byte_array(slot, 0),
            short_extension: byte_array(slot, 8),
            attrs: Attributes::from_bits_retain(slot[11]),
            short_name_case: slot[12],
            create_time_10_ms: slot[13],
            create_time: le_u16(slot, 14),
            create_date: le_u16(slot, 16),
            access_date: le_u16(slot, 18),
            first_cluster_hi: le_u16(slot, 20),
            mod_time: le_u16(slot, 22),
            mod_date: le_u16(slot, 24),
            first_cluster_lo: le_u16(slot, 26),
            file_size: le_u32(slot, 28),
        }
    }

    pub fn first_cluster(&self) -> ClusterIdx {
        LoHi::<u32, u16, u16>::new(self.first_cluster_lo, self.first_cluster_hi).get()
    }

    pub fn is_dir(&self) -> bool {
        self.attrs.contains(Attributes::DIRECTORY)
    }

    pub fn is_volume_id(&self) -> bool {
        self.attrs.contains(Attributes::VOLUME_ID)
    }

    /// True iff the dentry represents either the current directory `.` or the parent directory `..`
    pub fn is_dot_dir(&self) -> bool {
        self.short_name[0] == b'.'
    }

    /// True iff the file name has an extension
    pub fn has_file_extension(&self) -> bool {
        self.short_extension[0] != b' '
    }

    pub fn has_lowercase_name(&self) -> bool {
        self.short_name_case & NAME_LOWERCASE_FLAG != 0
    }

    pub fn has_lowercase_extension(&self) -> bool {
        self.short_name_case & EXTENSION_LOWERCASE_FLAG != 0
    }

    /// The name as it is stored on disk, including the 0x05 escape. This is what LFN checksums are computed over.
    pub fn raw_name(&self) -> [u8; 11] {
        let mut name = [0; 11];
        name[..8].copy_from_slice(&self.short_name);
        name[8..].copy_from_slice(&self.short_extension);
        name
    }

    /// The padded 11 byte name with the 0x05 escape resolved.
    pub fn name(&self) -> [u8; 11] {
        let mut name = self.raw_name();
        if name[0] == ESCAPED_E5_MARKER {
            name[0] = DELETED_MARKER;
        }
        name
    }

    pub fn lfn_checksum(&self) -> u8 {
        lfn_checksum(&self.raw_name())
    }

    /// Renders the short name as `NAME.EXT`. Short names are OEM encoded; bytes outside ASCII are mapped as Latin-1.
    pub fn read_short_file_name(&self) -> String {
        let name = self.name();
        let mut name_string = to_string_trimmed(&name[..8]);
        if self.has_lowercase_name() {
            name_string.make_ascii_lowercase();
        }

        if self.has_file_extension() {
            let mut extension_string = to_string_trimmed(&name[8..]);
            if self.has_lowercase_extension() {
                extension_string.make_ascii_lowercase();
            }
            name_string = format!("{}.{}", name_string, extension_string);
        }
        name_string
    }

    pub fn create_datetime(&self) -> Option<NaiveDateTime> {
        fat_datetime(self.create_date, self.create_time, self.create_time_10_ms)
    }

    pub fn mod_datetime(&self) -> Option<NaiveDateTime> {
        fat_datetime(self.mod_date, self.mod_time, 0)
    }

    pub fn access_date(&self) -> Option<NaiveDate> {
        fat_date(self.access_date)
    }
}

fn to_string_trimmed(field: &[u8]) -> String {
    let string: String = field.iter().map(|&byte| char::from(byte)).collect();
    string.trim_end_matches(' ').to_string()
}

/// Decodes a FAT date (bits 0-4 day, 5-8 month, 9-15 years since 1980). Returns `None` for unset or invalid dates.
pub fn fat_date(date: u16) -> Option<NaiveDate> {
    let year = FAT_BASE_YEAR + i32::from(date >> 9);
    let month = u32::from((date >> 5) & 0x0F);
    let day = u32::from(date & 0x1F);
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Decodes a FAT date and time (bits 0-4 seconds/2, 5-10 minutes, 11-15 hours). `time_10_ms` is the creation time
/// refinement in units of 10 ms (0-199).
pub fn fat_datetime(date: u16, time: u16, time_10_ms: u8) -> Option<NaiveDateTime> {
    let hour = u32::from(time >> 11);
    let minute = u32::from((time >> 5) & 0x3F);
    let second = u32::from(time & 0x1F) * 2 + u32::from(time_10_ms / 100);
    let milli = u32::from(time_10_ms % 100) * 10;
    fat_date(date)?.and_hms_milli_opt(hour, minute, second, milli)
}

/// The checksum over a short name that every LFN entry belonging to it carries.
pub fn lfn_checksum(raw_name: &[u8; 11]) -> u8 {
    raw_name.iter().fold(0u8, |sum, &byte| sum.rotate_right(1).wrapping_add(byte))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LongFileName {
    sequence_no: u8,
    name_1: [u16; 5],
    attrs: u8,
    lfn_type: u8,
    checksum: u8,
    name_2: [u16; 6],
    first_cluster: u16,
    name_3: [u16; 2],
}

const_assert_eq!(LongFileName::CHARS_PER_ENTRY, 5 + 6 + 2);

impl LongFileName {
    pub const CHARS_PER_ENTRY: usize = 13;

    pub fn parse(slot: &[u8; DENTRY_SIZE]) -> Self {
        Self {
            sequence_no: slot[0],
            name_1: utf16_units(slot, 1),
            attrs: slot[11],
            lfn_type: slot[12],
            checksum: slot[13],
            name_2: utf16_units(slot, 14),
            first_cluster: le_u16(slot, 26),
            name_3: utf16_units(slot, 28),
        }
    }

    /// The position of this LFN entry in the complete name, 1-based. On disk, LFN entries appear
    /// in reverse order, so the first entry's `sequence_no` equals the number of entries.
    pub fn sequence_no(&self) -> u8 {
        // in a valid LFN entry, bits 0-4 represent the sequence number
        self.sequence_no & LFN_SEQUENCE_NO_MASK
    }

    /// True iff this entry holds the end of the name, i.e. it is physically the first entry of its run.
    pub fn is_last(&self) -> bool {
        self.sequence_no & LFN_LAST_ENTRY_FLAG != 0
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// All 13 UCS-2 code units of this entry, including the 0x0000 terminator and 0xFFFF padding if present.
    pub fn to_utf16(&self) -> [u16; Self::CHARS_PER_ENTRY] {
        let mut units = [0; Self::CHARS_PER_ENTRY];
        units[..5].copy_from_slice(&self.name_1);
        units[5..11].copy_from_slice(&self.name_2);
        units[11..].copy_from_slice(&self.name_3);
        units
    }
}

fn utf16_units<const N: usize>(slot: &[u8; DENTRY_SIZE], offset: usize) -> [u16; N] {
    let mut units = [0; N];
    for (idx, unit) in units.iter_mut().enumerate() {
        *unit = le_u16(slot, offset + 2 * idx);
    }
    units
}
