//! Fixed-capacity bitmasks for RBG, PRB and CCE occupancy.
//!
//! Masks are `Copy` and never allocate, so they can be cloned freely inside the
//! per-TTI hot path.

use std::fmt;

/// Maximum number of bits a [`BoundedMask`] can hold.
pub const MAX_MASK_BITS: usize = 128;

/// A bitmask with a runtime length of at most [`MAX_MASK_BITS`] bits.
///
/// Bits at positions `>= len()` are always zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoundedMask {
    bits: u128,
    len: usize,
}

/// Downlink resource-block-group mask.
pub type RbgMask = BoundedMask;
/// Uplink physical-resource-block mask.
pub type PrbMask = BoundedMask;
/// PDCCH control-channel-element mask.
pub type PdcchMask = BoundedMask;

impl BoundedMask {
    /// Create an empty mask of `len` bits. `len` is clamped to [`MAX_MASK_BITS`].
    pub fn new(len: usize) -> Self {
        Self {
            bits: 0,
            len: len.min(MAX_MASK_BITS),
        }
    }

    /// Create a mask of `len` bits with the given positions set.
    ///
    /// Positions outside the mask are ignored.
    pub fn from_bits(len: usize, positions: &[usize]) -> Self {
        let mut mask = Self::new(len);
        for &pos in positions {
            mask.set(pos);
        }
        mask
    }

    fn range_bits(&self, start: usize, end: usize) -> u128 {
        let end = end.min(self.len);
        if start >= end {
            return 0;
        }
        let width = end - start;
        let ones = if width >= MAX_MASK_BITS {
            u128::MAX
        } else {
            (1u128 << width) - 1
        };
        ones << start
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set every bit in `[start, end)`.
    pub fn fill(&mut self, start: usize, end: usize) {
        self.bits |= self.range_bits(start, end);
    }

    pub fn set(&mut self, pos: usize) {
        if pos < self.len {
            self.bits |= 1u128 << pos;
        }
    }

    pub fn test(&self, pos: usize) -> bool {
        pos < self.len && (self.bits >> pos) & 1 == 1
    }

    /// Clear all bits, keeping the length.
    pub fn reset(&mut self) {
        self.bits = 0;
    }

    /// Change the length, dropping bits that no longer fit.
    pub fn resize(&mut self, len: usize) {
        self.len = len.min(MAX_MASK_BITS);
        self.bits &= self.range_bits(0, self.len);
    }

    /// Number of set bits.
    #[inline]
    pub fn count(&self) -> u32 {
        self.bits.count_ones()
    }

    #[inline]
    pub fn none(&self) -> bool {
        self.bits == 0
    }

    #[inline]
    pub fn intersects(&self, other: &BoundedMask) -> bool {
        self.bits & other.bits != 0
    }

    /// Bitwise OR. The result takes the larger of the two lengths.
    pub fn union(&self, other: &BoundedMask) -> BoundedMask {
        BoundedMask {
            bits: self.bits | other.bits,
            len: self.len.max(other.len),
        }
    }

    /// Index of the highest set bit, if any.
    pub fn highest_set(&self) -> Option<usize> {
        if self.bits == 0 {
            None
        } else {
            Some(MAX_MASK_BITS - 1 - self.bits.leading_zeros() as usize)
        }
    }

    /// Iterate over the positions of set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&pos| self.test(pos))
    }
}

impl std::ops::BitOrAssign for BoundedMask {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(&rhs);
    }
}

impl fmt::Debug for BoundedMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundedMask({})", self)
    }
}

/// Renders bit 0 first, e.g. `0110` for bits 1 and 2 of a 4-bit mask.
impl fmt::Display for BoundedMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pos in 0..self.len {
            f.write_str(if self.test(pos) { "1" } else { "0" })?;
        }
        Ok(())
    }
}
