//! Read-only access to FAT16 and FAT32 volumes through an injected byte-range reader.
//!
//! ```no_run
//! use fat_reader_rs::{FatFs, Result};
//!
//! fn print_file(image: Vec<u8>) -> Result<()> {
//!     let fs = FatFs::mount(image, 512)?;
//!     let mut file = fs.open("/boot/kernel.cfg")?;
//!     let mut data = Vec::new();
//!     file.read_to_end(&fs, &mut data)?;
//!     println!("{}", String::from_utf8_lossy(&data));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod fat;
mod lohi;
mod util;

pub use crate::error::{FatError, Result};
pub use crate::fat::{DirEntry, Directory, FatFile, FatFs, FatType, FileReader, FnReader, ReadBytes};
