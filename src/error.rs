use std::fmt::{self, Display, Formatter};
use std::io;

use crate::fat::FAT16_MIN_CLUSTERS;

pub type Result<T> = std::result::Result<T, FatError>;

/// Everything that can go wrong while mounting or traversing a FAT volume.
///
/// Mount errors are fatal for the mount call only; all other errors are per call and leave the mounted volume and any
/// other open handles untouched.
#[derive(Debug)]
pub enum FatError {
    /// The MBR or the boot sector does not end in the 0x55, 0xAA signature.
    InvalidBootSector,
    /// The first partition table entry has type 0.
    NoPartitionFound,
    SectorSizeMismatch { expected: u32, found: u16 },
    /// The data cluster count puts the volume outside of FAT16/FAT32 (i.e. it is FAT12 or exFAT-sized).
    UnsupportedFatVariant { cluster_count: u32 },
    MalformedBpb(&'static str),
    Io(io::Error),
    /// A path component that should have been a directory does not exist.
    EntryNotFound(String),
    /// The last path component does not exist.
    FileNotFound(String),
    NotADirectory(String),
    IsADirectory(String),
}

impl Display for FatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBootSector => write!(f, "boot sector signature 0x55AA not found"),
            Self::NoPartitionFound => write!(f, "the first partition table entry is empty"),
            Self::SectorSizeMismatch { expected, found } => {
                write!(f, "the volume uses {} bytes per sector, expected {}", found, expected)
            }
            Self::UnsupportedFatVariant { cluster_count } if *cluster_count < FAT16_MIN_CLUSTERS => {
                write!(f, "FAT12 volumes ({} clusters) are not supported", cluster_count)
            }
            Self::UnsupportedFatVariant { cluster_count } => {
                write!(f, "volumes with {} clusters are too large for FAT32", cluster_count)
            }
            Self::MalformedBpb(reason) => write!(f, "malformed BIOS parameter block: {}", reason),
            Self::Io(err) => write!(f, "read from the backing device failed: {}", err),
            Self::EntryNotFound(name) => write!(f, "no such directory: '{}'", name),
            Self::FileNotFound(name) => write!(f, "no such file: '{}'", name),
            Self::NotADirectory(name) => write!(f, "'{}' is not a directory", name),
            Self::IsADirectory(name) => write!(f, "'{}' is a directory", name),
        }
    }
}

impl std::error::Error for FatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for FatError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Lets `FatError`s cross `std::io` interfaces such as `FileReader`'s `Read` impl. Backend errors are passed through
/// unchanged.
impl From<FatError> for io::Error {
    fn from(err: FatError) -> Self {
        match err {
            FatError::Io(err) => err,
            FatError::FileNotFound(_) | FatError::EntryNotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            err => io::Error::new(io::ErrorKind::Other, err),
        }
    }
}
