//! Flags of interest over the rows or columns of a page.
#![deny(missing_docs)]

use std::fmt::{Debug, Formatter};

use bit_vec::BitVec;
use itertools::Itertools;
use sdds_error::{SddsResult, sdds_bail};

/// How newly computed flags combine with the existing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FlagOp {
    /// Replace the existing flags.
    #[default]
    Set,
    /// Keep a flag set if it was set or is newly selected.
    Or,
    /// Keep a flag set only if it was set and is newly selected.
    And,
}

impl FlagOp {
    /// Combine an existing flag with a newly computed one.
    #[inline]
    pub fn apply(self, existing: bool, selected: bool) -> bool {
        match self {
            FlagOp::Set => selected,
            FlagOp::Or => existing || selected,
            FlagOp::And => existing && selected,
        }
    }
}

/// A fixed-length set of flags, all set ("of interest") by default.
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    bits: BitVec,
}

impl Mask {
    /// A mask of `len` flags, all set.
    pub fn new_true(len: usize) -> Self {
        Self {
            bits: BitVec::from_elem(len, true),
        }
    }

    /// A mask of `len` flags, all clear.
    pub fn new_false(len: usize) -> Self {
        Self {
            bits: BitVec::from_elem(len, false),
        }
    }

    /// A mask copied from booleans.
    pub fn from_bools(flags: &[bool]) -> Self {
        Self {
            bits: flags.iter().copied().collect(),
        }
    }

    /// Number of flags.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True when the mask holds no flags.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The flag at `index`; out-of-range flags read as clear.
    #[inline]
    pub fn value(&self, index: usize) -> bool {
        self.bits.get(index).unwrap_or(false)
    }

    /// Set or clear one flag.
    pub fn set(&mut self, index: usize, value: bool) -> SddsResult<()> {
        if index >= self.len() {
            sdds_bail!(ValueOutOfRange: "flag {} out of range for mask of length {}", index, self.len());
        }
        self.bits.set(index, value);
        Ok(())
    }

    /// Set or clear every flag.
    pub fn set_all(&mut self, value: bool) {
        self.bits = BitVec::from_elem(self.len(), value);
    }

    /// Grow or shrink to `len` flags. New flags take `value`.
    pub fn resize(&mut self, len: usize, value: bool) {
        let current = self.len();
        if len > current {
            self.bits.grow(len - current, value);
        } else {
            self.bits.truncate(len);
        }
    }

    /// Combine `selected` into the mask with `op`.
    pub fn combine(&mut self, selected: &[bool], op: FlagOp) -> SddsResult<()> {
        if selected.len() != self.len() {
            sdds_bail!(
                "expected {} flags but received {}",
                self.len(),
                selected.len()
            );
        }
        for (i, s) in selected.iter().enumerate() {
            let existing = self.value(i);
            self.bits.set(i, op.apply(existing, *s));
        }
        Ok(())
    }

    /// Number of set flags.
    pub fn true_count(&self) -> usize {
        self.bits.iter().filter(|b| *b).count()
    }

    /// Indices of the set flags, ascending.
    pub fn indices(&self) -> Vec<usize> {
        self.bits.iter().positions(|b| b).collect()
    }

    /// Iterate the flags in order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter()
    }

    /// The flags as booleans.
    pub fn to_bools(&self) -> Vec<bool> {
        self.bits.iter().collect()
    }

    /// Reorder so that flag `i` becomes the old flag `order[i]`.
    pub fn permute(&mut self, order: &[usize]) {
        self.bits = order.iter().map(|&i| self.value(i)).collect();
    }

    /// Swap two flags.
    pub fn swap(&mut self, a: usize, b: usize) {
        let (va, vb) = (self.value(a), self.value(b));
        if a < self.len() && b < self.len() {
            self.bits.set(a, vb);
            self.bits.set(b, va);
        }
    }
}

impl Debug for Mask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Mask({}/{}: {})",
            self.true_count(),
            self.len(),
            self.bits.iter().map(|b| if b { '1' } else { '0' }).join("")
        )
    }
}

impl FromIterator<bool> for Mask {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        Self {
            bits: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(FlagOp::Set, vec![false, true, false, true])]
    #[case(FlagOp::Or, vec![true, true, false, true])]
    #[case(FlagOp::And, vec![false, true, false, false])]
    fn combine(#[case] op: FlagOp, #[case] expected: Vec<bool>) {
        let mut mask = Mask::from_bools(&[true, true, false, false]);
        mask.combine(&[false, true, false, true], op).unwrap();
        assert_eq!(mask.to_bools(), expected);
    }

    #[test]
    fn all_and_none() {
        let mut mask = Mask::new_true(5);
        assert_eq!(mask.true_count(), 5);
        mask.set_all(false);
        assert_eq!(mask.true_count(), 0);
        mask.set_all(true);
        assert_eq!(mask.indices(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn resize_and_permute() {
        let mut mask = Mask::from_bools(&[true, false]);
        mask.resize(4, true);
        assert_eq!(mask.to_bools(), vec![true, false, true, true]);
        mask.permute(&[1, 0, 3, 2]);
        assert_eq!(mask.to_bools(), vec![false, true, true, true]);
        mask.resize(1, true);
        assert_eq!(mask.len(), 1);
    }

    #[test]
    fn combine_length_mismatch() {
        assert!(Mask::new_true(2).combine(&[true], FlagOp::Or).is_err());
        assert!(Mask::new_true(2).set(2, false).is_err());
    }

    mod props {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn true_count_is_popcount(flags in prop::collection::vec(any::<bool>(), 0..200)) {
                let mask = Mask::from_bools(&flags);
                prop_assert_eq!(mask.true_count(), flags.iter().filter(|f| **f).count());
                prop_assert_eq!(mask.indices().len(), mask.true_count());
            }
        }
    }
}
