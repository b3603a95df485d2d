use std::fmt::{self, Display, Formatter};

use log::debug;

use crate::error::{FatError, Result};
use crate::fat::{DirEntry, Directory, FatDentry, FatFile, FatFs, ReadBytes};
use crate::util::trim_padding;

const PATH_SEPARATORS: [char; 2] = ['/', '\\'];
const BASE_LEN: usize = 8;
const EXTENSION_LEN: usize = 3;

/// Splits off the first component of `path`, skipping one leading separator. Returns the component, the rest of the
/// path after the separator following it, and whether it is the last component (a trailing separator does not start
/// another component).
pub fn split_component(path: &str) -> (&str, &str, bool) {
    let path = path.strip_prefix(&PATH_SEPARATORS[..]).unwrap_or(path);
    match path.split_once(&PATH_SEPARATORS[..]) {
        Some((component, rest)) => (component, rest, rest.is_empty()),
        None => (path, "", true),
    }
}

/// A name in the padded 11 byte 8.3 form it is stored in on disk, e.g. `"readme.md"` becomes `"README  MD "`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ShortName([u8; 11]);

impl ShortName {
    pub const DOT: Self = Self(*b".          ");
    pub const DOT_DOT: Self = Self(*b"..         ");

    /// Normalizes a path component: split at the last '.', uppercase, pad the base to 8 and the extension to 3 bytes.
    /// Longer parts are truncated and characters outside ASCII become '_'. `.` and `..` are kept as they are.
    pub fn from_component(component: &str) -> Self {
        match component {
            "." => return Self::DOT,
            ".." => return Self::DOT_DOT,
            _ => {}
        }
        let (base, extension) = component.rsplit_once('.').unwrap_or((component, ""));
        let mut name = [b' '; 11];
        fill_padded(&mut name[..BASE_LEN], base);
        fill_padded(&mut name[BASE_LEN..BASE_LEN + EXTENSION_LEN], extension);
        Self(name)
    }

    pub fn as_bytes(&self) -> &[u8; 11] {
        &self.0
    }

    /// Compares against the entry's stored short name, ignoring ASCII case. Long names are never considered.
    pub fn matches(&self, dentry: &FatDentry) -> bool {
        self.0.eq_ignore_ascii_case(&dentry.name())
    }

    fn base(&self) -> &[u8] {
        trim_padding(&self.0[..BASE_LEN])
    }

    fn extension(&self) -> &[u8] {
        trim_padding(&self.0[BASE_LEN..])
    }
}

fn fill_padded(field: &mut [u8], part: &str) {
    let bytes = part.chars().map(|c| if c.is_ascii() { c.to_ascii_uppercase() as u8 } else { b'_' });
    for (dst, src) in field.iter_mut().zip(bytes) {
        *dst = src;
    }
}

/// Renders as `BASE.EXT` (or just `BASE`), which normalizes back to the same `ShortName`.
impl Display for ShortName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if *self == Self::DOT || *self == Self::DOT_DOT {
            return write!(f, "{}", String::from_utf8_lossy(self.base()));
        }
        write!(f, "{}", String::from_utf8_lossy(self.base()))?;
        if !self.extension().is_empty() {
            write!(f, ".{}", String::from_utf8_lossy(self.extension()))?;
        }
        Ok(())
    }
}

impl<R: ReadBytes> FatFs<R> {
    /// Scans `dir` for the entry whose short name is `name`. Volume labels are skipped, they are not files.
    pub fn find_entry(&self, dir: Directory, name: &ShortName) -> Result<Option<DirEntry>> {
        for entry in self.read_dir(dir) {
            let entry = entry?;
            if !entry.dentry.is_volume_id() && name.matches(&entry.dentry) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Looks up the subdirectory `name` of `dir`. `..` is resolved through the on-disk `..` entry.
    pub fn change_dir(&self, dir: Directory, name: &ShortName) -> Result<Directory> {
        let entry = self.find_entry(dir, name)?.ok_or_else(|| FatError::EntryNotFound(name.to_string()))?;
        let subdir = entry.as_directory().ok_or_else(|| FatError::NotADirectory(name.to_string()))?;
        debug!("Changed from directory {} to '{}' at cluster {}", dir.first_cluster, name, subdir.first_cluster);
        Ok(subdir)
    }

    /// Walks all but the last component of `path`, starting at the root. Returns the directory reached and the last
    /// component, which is `None` if the path ends in the directory itself (e.g. `/`, `a/.`).
    pub(crate) fn open_parent(&self, path: &str) -> Result<(Directory, Option<ShortName>)> {
        let mut dir = self.root();
        let mut rest = path;
        loop {
            let (component, remainder, is_last) = split_component(rest);
            let name = match component {
                "" | "." => None,
                component => Some(ShortName::from_component(component)),
            };
            if is_last {
                return Ok((dir, name));
            }
            if let Some(name) = name {
                dir = self.change_dir(dir, &name)?;
            }
            rest = remainder;
        }
    }

    /// Resolves a path to a directory handle, `/` being the root directory.
    pub fn open_dir(&self, path: &str) -> Result<Directory> {
        match self.open_parent(path)? {
            (dir, None) => Ok(dir),
            (parent, Some(name)) => self.change_dir(parent, &name),
        }
    }

    /// Resolves `path` to a regular file and returns a read cursor positioned at its first byte.
    pub fn open(&self, path: &str) -> Result<FatFile> {
        let (parent, name) = self.open_parent(path)?;
        let name = name.ok_or_else(|| FatError::IsADirectory(path.to_string()))?;
        let entry = self.find_entry(parent, &name)?.ok_or_else(|| FatError::FileNotFound(name.to_string()))?;
        if entry.is_dir() {
            return Err(FatError::IsADirectory(name.to_string()));
        }
        debug!("Opened '{}': {} bytes starting at cluster {}", name, entry.size(), entry.first_cluster());
        Ok(FatFile::new(entry.first_cluster(), entry.size()))
    }
}
