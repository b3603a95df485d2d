use std::marker::PhantomData;
use std::mem::size_of;

use num::PrimInt;

/// Sometimes for space/compatibility reasons a single value is split into two smaller values which are stored
/// non-adjacently on disk (e.g.: a FAT32 dentry's first cluster 0x0012_BEEF into hi value 0x0012 at byte 20 and lo
/// value 0xBEEF at byte 26). `LoHi` recombines the two halves.
#[derive(Debug, Copy, Clone)]
pub struct LoHi<Full, LoHalf, HiHalf>
where
    Full: PrimInt + From<LoHalf> + From<HiHalf>,
    LoHalf: PrimInt,
    HiHalf: PrimInt,
{
    pub lo: LoHalf,
    pub hi: HiHalf,
    _full: PhantomData<Full>,
}

impl<Full, LoHalf, HiHalf> LoHi<Full, LoHalf, HiHalf>
where
    Full: PrimInt + From<LoHalf> + From<HiHalf>,
    LoHalf: PrimInt,
    HiHalf: PrimInt,
{
    const LO_HALF_BIT_COUNT: usize = size_of::<LoHalf>() * 8;

    /// PANICS: Panics if a `LoHalf` and a `HiHalf` don't fully fit into a `Full`.
    pub fn new(lo: LoHalf, hi: HiHalf) -> Self {
        // ideally would be a const_assert, but it doesn't work with generics
        assert!(
            size_of::<LoHalf>() + size_of::<HiHalf>() <= size_of::<Full>(),
            "Attempting to create a LoHi where a `LoHalf` and a `HiHalf` do not fit into a `Full`."
        );
        Self { lo, hi, _full: PhantomData }
    }

    pub fn get(&self) -> Full {
        let hi: Full = self.hi.into();
        let lo: Full = self.lo.into();
        (hi << Self::LO_HALF_BIT_COUNT) | lo
    }
}
