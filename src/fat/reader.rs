use std::convert::TryFrom;
use std::io;

/// The read capability a FAT volume is mounted on. The filesystem never writes and never touches the device in any
/// other way, every byte it interprets is fetched through this trait on demand.
///
/// `read_bytes` takes `&self`: several `FatFile`s over the same `FatFs` may be advanced independently, so
/// implementations that are used that way must tolerate interleaved calls.
pub trait ReadBytes {
    /// Fill `buf` with the `buf.len()` bytes starting at byte `address` of the device, or fail.
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> io::Result<()>;
}

impl ReadBytes for [u8] {
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(address).map_err(|_| out_of_range(address, buf.len()))?;
        let end = start.checked_add(buf.len()).ok_or_else(|| out_of_range(address, buf.len()))?;
        let bytes = self.get(start..end).ok_or_else(|| out_of_range(address, buf.len()))?;
        buf.copy_from_slice(bytes);
        Ok(())
    }
}

impl ReadBytes for Vec<u8> {
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        self.as_slice().read_bytes(address, buf)
    }
}

impl<T: ReadBytes + ?Sized> ReadBytes for &T {
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_bytes(address, buf)
    }
}

impl<T: ReadBytes + ?Sized> ReadBytes for Box<T> {
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_bytes(address, buf)
    }
}

/// Adapts a plain function or closure `(address, destination) -> io::Result<()>` into a `ReadBytes`.
pub struct FnReader<F>(pub F)
where F: Fn(u64, &mut [u8]) -> io::Result<()>;

impl<F> ReadBytes for FnReader<F>
where F: Fn(u64, &mut [u8]) -> io::Result<()>
{
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        (self.0)(address, buf)
    }
}

pub(crate) fn out_of_range(address: u64, len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {} bytes at {:#x} is out of range", len, address),
    )
}
