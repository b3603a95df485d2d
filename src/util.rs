use std::mem::size_of;

use num::PrimInt;
use static_assertions::const_assert;

const_assert!(size_of::<usize>() >= size_of::<u32>());

/// Lossless `u32` -> `usize` conversion. `usize::from(u32)` does not exist because of 16 bit targets, which we don't
/// support anyway (see the assertion above).
pub trait FromU32 {
    fn fromx(n: u32) -> Self;
}

impl FromU32 for usize {
    fn fromx(n: u32) -> Self {
        n as usize
    }
}

/// Returns `log2(n)` if `n` is a power of two, `None` otherwise (including for 0).
pub fn exact_log2<T: PrimInt>(n: T) -> Option<u8> {
    if n.count_ones() == 1 {
        // a PrimInt has at most 128 bits, so this always fits
        Some(n.trailing_zeros() as u8)
    } else {
        None
    }
}

/// PANICS: Panics if `bytes` is shorter than `offset + 2`.
pub fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// PANICS: Panics if `bytes` is shorter than `offset + 4`.
pub fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

/// Copies a fixed-width field out of an on-disk structure.
/// PANICS: Panics if `bytes` is shorter than `offset + N`.
pub fn byte_array<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut array = [0; N];
    array.copy_from_slice(&bytes[offset..offset + N]);
    array
}

/// Strips the space padding FAT uses for fixed-width text fields.
pub fn trim_padding(field: &[u8]) -> &[u8] {
    let len = field.iter().rposition(|&character| character != b' ').map_or(0, |idx| idx + 1);
    &field[..len]
}
