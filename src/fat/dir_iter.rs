use std::char::{decode_utf16, REPLACEMENT_CHARACTER};

use chrono::{NaiveDate, NaiveDateTime};
use log::{trace, warn};

use crate::error::{FatError, Result};
use crate::fat::{
    Attributes, ClusterIdx, FatDentry, FatFs, FatPseudoDentry, LongFileName, ReadBytes, RootDir, DENTRY_SIZE,
};

/// A name has at most 255 UCS-2 characters, i.e. it needs at most 20 LFN entries.
const MAX_LFN_ENTRIES: usize = 20;

/// A handle to a directory: the directory's first cluster, with 0 standing for the root directory (which is also what
/// `..` entries in top-level directories point to).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Directory {
    pub first_cluster: ClusterIdx,
}

impl Directory {
    pub const fn root() -> Self {
        Self { first_cluster: 0 }
    }

    pub const fn new(first_cluster: ClusterIdx) -> Self {
        Self { first_cluster }
    }

    pub fn is_root(&self) -> bool {
        self.first_cluster == 0
    }
}

/// A live directory entry together with its long name, if it has a valid one.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub dentry: FatDentry,
    pub long_name: Option<String>,
}

impl DirEntry {
    /// The long name if present, the short name otherwise
    pub fn name(&self) -> String {
        match &self.long_name {
            Some(long_name) => long_name.clone(),
            None => self.dentry.read_short_file_name(),
        }
    }

    pub fn short_name(&self) -> String {
        self.dentry.read_short_file_name()
    }

    pub fn attributes(&self) -> Attributes {
        self.dentry.attrs
    }

    pub fn is_dir(&self) -> bool {
        self.dentry.is_dir()
    }

    pub fn size(&self) -> u32 {
        self.dentry.file_size
    }

    pub fn first_cluster(&self) -> ClusterIdx {
        self.dentry.first_cluster()
    }

    /// The handle of the directory this entry describes, or `None` if it is a file.
    pub fn as_directory(&self) -> Option<Directory> {
        self.is_dir().then(|| Directory::new(self.first_cluster()))
    }

    pub fn created(&self) -> Option<NaiveDateTime> {
        self.dentry.create_datetime()
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        self.dentry.mod_datetime()
    }

    pub fn accessed(&self) -> Option<NaiveDate> {
        self.dentry.access_date()
    }
}

impl<R: ReadBytes> FatFs<R> {
    /// Iterates over all slots of `dir` up to its end marker, including deleted and LFN slots.
    pub fn pseudo_dentry_iter(&self, dir: Directory) -> FatPseudoDentryIter<'_, R> {
        FatPseudoDentryIter::new(dir, self)
    }

    /// Iterates over the live entries of `dir` (including `.` and `..`) in on-disk order.
    pub fn read_dir(&self, dir: Directory) -> DirEntryIter<'_, R> {
        DirEntryIter::new(self.pseudo_dentry_iter(dir))
    }
}

#[derive(Debug, Copy, Clone)]
enum DirCursor {
    /// The FAT16 root directory, a contiguous run of slots outside the data region.
    Region { remaining_entries: u32 },
    /// `clusters_visited` includes the current cluster and bounds the walk by the volume's cluster count, a longer
    /// chain must contain a cycle.
    Chain { cluster: ClusterIdx, dentry_idx: u32, clusters_visited: u32 },
}

/// Walks the 32 byte slots of a directory, following its cluster chain. Ends at the first slot marked as the end of the
/// directory table, at the end of the chain or at the end of the FAT16 root region, whichever comes first.
pub struct FatPseudoDentryIter<'a, R: ReadBytes> {
    fs: &'a FatFs<R>,
    cursor: DirCursor,
    address: u64,
    finished: bool,
}

impl<'a, R: ReadBytes> FatPseudoDentryIter<'a, R> {
    pub fn new(dir: Directory, fs: &'a FatFs<R>) -> Self {
        let first_cluster = match (dir.is_root(), fs.root_dir()) {
            (true, RootDir::Region { entry_count, .. }) => {
                return Self {
                    fs,
                    cursor: DirCursor::Region { remaining_entries: entry_count },
                    address: fs.root_dir_address(),
                    finished: false,
                };
            }
            (true, RootDir::Cluster(root_cluster)) => root_cluster,
            (false, _) => dir.first_cluster,
        };

        let finished = !fs.is_data_cluster(first_cluster);
        if finished {
            warn!("Directory starts at invalid cluster {}", first_cluster);
        }
        Self {
            fs,
            cursor: DirCursor::Chain { cluster: first_cluster, dentry_idx: 0, clusters_visited: 1 },
            address: if finished { 0 } else { fs.cluster_address(first_cluster) },
            finished,
        }
    }

    /// Possibly deleted, LFN or end marker
    fn try_next(&mut self) -> Result<Option<FatPseudoDentry>> {
        match &mut self.cursor {
            DirCursor::Region { remaining_entries } => {
                if *remaining_entries == 0 {
                    return Ok(None);
                }
                *remaining_entries -= 1;
            }
            DirCursor::Chain { cluster, dentry_idx, clusters_visited } => {
                if *dentry_idx == self.fs.dentries_per_cluster() {
                    if *clusters_visited >= self.fs.cluster_count() {
                        warn!("Directory chain is longer than the volume, it must contain a cycle");
                        return Ok(None);
                    }
                    let next = self.fs.next_cluster(*cluster)?;
                    if !self.fs.is_data_cluster(next) {
                        return Ok(None);
                    }
                    trace!("Directory continues in cluster {}", next);
                    *cluster = next;
                    *dentry_idx = 0;
                    *clusters_visited += 1;
                    self.address = self.fs.cluster_address(next);
                }
                *dentry_idx += 1;
            }
        }

        let mut slot = [0; DENTRY_SIZE];
        self.fs.read_at(self.address, &mut slot)?;
        self.address += DENTRY_SIZE as u64;
        Ok(Some(FatPseudoDentry::parse(&slot)))
    }
}

impl<'a, R: ReadBytes> Iterator for FatPseudoDentryIter<'a, R> {
    type Item = Result<FatPseudoDentry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.try_next() {
            Ok(Some(FatPseudoDentry::DirTableEnd)) | Ok(None) => {
                self.finished = true;
                None
            }
            Ok(Some(pseudo_dentry)) => Some(Ok(pseudo_dentry)),
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// Yields the live short entries of a directory, skipping deleted slots and attaching the long name spelled out by the
/// LFN slots directly preceding each entry.
pub struct DirEntryIter<'a, R: ReadBytes> {
    pseudo_dentry_iter: FatPseudoDentryIter<'a, R>,
    /// LFN slots seen since the last short entry, in on-disk order
    lfn_entries: Vec<LongFileName>,
}

impl<'a, R: ReadBytes> DirEntryIter<'a, R> {
    pub fn new(pseudo_dentry_iter: FatPseudoDentryIter<'a, R>) -> Self {
        Self { pseudo_dentry_iter, lfn_entries: Vec::new() }
    }
}

impl<'a, R: ReadBytes> Iterator for DirEntryIter<'a, R> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.pseudo_dentry_iter.next()? {
                Err(err) => return Some(Err(err)),
                Ok(FatPseudoDentry::LongFileName(long_file_name)) => {
                    if self.lfn_entries.len() == MAX_LFN_ENTRIES {
                        self.lfn_entries.remove(0);
                    }
                    self.lfn_entries.push(long_file_name);
                }
                Ok(FatPseudoDentry::Dentry(dentry)) => {
                    let long_name = read_long_file_name(&self.lfn_entries, dentry.lfn_checksum());
                    if long_name.is_none() && !self.lfn_entries.is_empty() {
                        warn!(
                            "Ignoring LFN entries not matching short name '{}'",
                            dentry.read_short_file_name()
                        );
                    }
                    self.lfn_entries.clear();
                    return Some(Ok(DirEntry { dentry, long_name }));
                }
                Ok(FatPseudoDentry::Deleted) | Ok(FatPseudoDentry::DirTableEnd) => self.lfn_entries.clear(),
            }
        }
    }
}

/// Reassembles a long name from the LFN entries preceding a short entry (given in on-disk order). Starting at the entry
/// closest to the short entry, sequence numbers must count up from 1 and every checksum must match, until the entry
/// flagged as last. Anything else yields `None` and the entry is only known by its short name.
pub fn read_long_file_name(lfn_entries: &[LongFileName], checksum: u8) -> Option<String> {
    let mut name = Vec::with_capacity(lfn_entries.len() * LongFileName::CHARS_PER_ENTRY);
    for (expected_sequence_no, lfn_entry) in (1..).zip(lfn_entries.iter().rev()) {
        if lfn_entry.checksum() != checksum || lfn_entry.sequence_no() != expected_sequence_no {
            return None;
        }
        name.extend_from_slice(&lfn_entry.to_utf16());
        if lfn_entry.is_last() {
            let len = name.iter().position(|&character| character == 0x0000).unwrap_or(name.len());
            if len == 0 {
                return None;
            }
            // By the standard, long file names are encoded in UCS-2, but Linux writes UTF-16. UTF-16 is a superset,
            // so decode as UTF-16 and replace unpaired surrogates.
            return Some(
                decode_utf16(name[..len].iter().copied())
                    .map(|character| character.unwrap_or(REPLACEMENT_CHARACTER))
                    .collect(),
            );
        }
    }
    None
}

impl<R: ReadBytes> FatFs<R> {
    /// Collects all live entries of `dir`.
    pub fn list_dir(&self, dir: Directory) -> Result<Vec<DirEntry>> {
        self.read_dir(dir).collect()
    }

    /// Shorthand for resolving a directory path and listing it.
    pub fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.open_dir(path)?;
        self.list_dir(dir)
    }

    /// Returns the entry of the file or directory at `path`.
    pub fn stat(&self, path: &str) -> Result<DirEntry> {
        let (parent, name) = self.open_parent(path)?;
        let name = name.ok_or_else(|| FatError::FileNotFound(path.to_string()))?;
        for entry in self.read_dir(parent) {
            let entry = entry?;
            if !entry.dentry.is_volume_id() && name.matches(&entry.dentry) {
                return Ok(entry);
            }
        }
        Err(FatError::FileNotFound(name.to_string()))
    }
}
