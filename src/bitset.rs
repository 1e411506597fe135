//! Compact bitset over alignment site indices.
//!
//! # Overview
//! The operation cache of a tree remembers which sites have already been
//! charged against it. Site indices are dense (`0..num_sites`), so one bit
//! per site is enough.
//!
//! # Example
//! For an alignment of 8 sites where sites 0, 2 and 5 were counted:
//! - bitset `0b00100101`

/// A growable bitset of site indices.
///
/// Internally stores bits in `Vec<u64>` words, 64 sites per word.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Marks `idx` as present, growing the word vector if needed.
    /// Returns `true` if the bit was not set before.
    ///
    /// # Example
    /// ```
    /// # use subtree_scheduler::bitset::Bitset;
    /// let mut bs = Bitset::default();
    /// assert!(bs.insert(5));
    /// assert!(!bs.insert(5));
    /// assert_eq!(bs.0[0], 0b100000);
    /// ```
    #[inline]
    pub fn insert(&mut self, idx: usize) -> bool {
        let word = idx >> 6;
        let bit = idx & 63;
        if word >= self.0.len() {
            self.0.resize(word + 1, 0);
        }
        let fresh = self.0[word] & (1u64 << bit) == 0;
        self.0[word] |= 1u64 << bit;
        fresh
    }

    /// Iterates the set indices in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(wi, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let tz = w.trailing_zeros() as usize;
                w &= w - 1;
                Some((wi << 6) + tz)
            })
        })
    }
}
