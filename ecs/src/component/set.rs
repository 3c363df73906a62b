use std::{
    fmt,
    ops::{BitAnd, BitOr, Sub},
};

use crate::component::{ComponentId, MAX_COMPONENTS};

const WORD_BITS: usize = u64::BITS as usize;
const WORDS: usize = MAX_COMPONENTS / WORD_BITS;

/// A fixed-width bitset naming a set of component ids.
///
/// This is the identity of an archetype: two archetypes never share a set. Every operation works
/// on an inline array of words and never allocates, so sets are cheap to copy, compare and hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentSet {
    words: [u64; WORDS],
}

impl ComponentSet {
    /// The empty set.
    pub const EMPTY: Self = Self { words: [0; WORDS] };

    /// Construct an empty set.
    #[inline]
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Construct a set from a list of ids. Duplicates collapse.
    pub fn from_ids(ids: impl IntoIterator<Item = ComponentId>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.insert(id);
        }
        set
    }

    /// Add an id. Returns `true` if the id was not already present.
    #[inline]
    pub fn insert(&mut self, id: ComponentId) -> bool {
        let (word, mask) = Self::locate(id);
        let absent = self.words[word] & mask == 0;
        self.words[word] |= mask;
        absent
    }

    /// Remove an id. Returns `true` if the id was present.
    #[inline]
    pub fn remove(&mut self, id: ComponentId) -> bool {
        let (word, mask) = Self::locate(id);
        let present = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        present
    }

    /// Get a copy of this set with `id` added.
    #[inline]
    pub fn with(mut self, id: ComponentId) -> Self {
        self.insert(id);
        self
    }

    /// Get a copy of this set with `id` removed.
    #[inline]
    pub fn without(mut self, id: ComponentId) -> Self {
        self.remove(id);
        self
    }

    /// Test a single id.
    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        let (word, mask) = Self::locate(id);
        self.words[word] & mask != 0
    }

    /// Determine if every id in `other` is also in this set (`other ⊆ self`).
    #[inline]
    pub fn contains_all(&self, other: &ComponentSet) -> bool {
        other.is_subset(self)
    }

    /// Determine if every id in this set is also in `other` (`self ⊆ other`).
    #[inline]
    pub fn is_subset(&self, other: &ComponentSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == *a)
    }

    /// Determine if this set shares at least one id with `other`.
    #[inline]
    pub fn intersects(&self, other: &ComponentSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    #[inline]
    pub fn union(&self, other: &ComponentSet) -> Self {
        self.zip_with(other, |a, b| a | b)
    }

    #[inline]
    pub fn intersection(&self, other: &ComponentSet) -> Self {
        self.zip_with(other, |a, b| a & b)
    }

    /// Get the ids in self that are not in other.
    #[inline]
    pub fn difference(&self, other: &ComponentSet) -> Self {
        self.zip_with(other, |a, b| a & !b)
    }

    /// Returns the number of ids in this set.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns true if this set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Iterate the ids in ascending order.
    #[inline]
    pub fn iter(&self) -> Iter {
        Iter {
            words: self.words,
            word: 0,
        }
    }

    #[inline]
    fn locate(id: ComponentId) -> (usize, u64) {
        (id.index() / WORD_BITS, 1 << (id.index() % WORD_BITS))
    }

    #[inline]
    fn zip_with(&self, other: &ComponentSet, f: impl Fn(u64, u64) -> u64) -> Self {
        let mut words = [0; WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = f(self.words[i], other.words[i]);
        }
        Self { words }
    }
}

impl fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|id| id.raw())).finish()
    }
}

impl FromIterator<ComponentId> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        Self::from_ids(iter)
    }
}

impl BitOr for ComponentSet {
    type Output = ComponentSet;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(&rhs)
    }
}

impl BitAnd for ComponentSet {
    type Output = ComponentSet;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.intersection(&rhs)
    }
}

impl Sub for ComponentSet {
    type Output = ComponentSet;

    fn sub(self, rhs: Self) -> Self::Output {
        self.difference(&rhs)
    }
}

impl<'a> IntoIterator for &'a ComponentSet {
    type Item = ComponentId;
    type IntoIter = Iter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over the ids of a [`ComponentSet`].
pub struct Iter {
    words: [u64; WORDS],
    word: usize,
}

impl Iterator for Iter {
    type Item = ComponentId;

    fn next(&mut self) -> Option<Self::Item> {
        while self.word < WORDS {
            let bits = self.words[self.word];
            if bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                // Clear the lowest set bit.
                self.words[self.word] = bits & (bits - 1);
                return Some(ComponentId::new((self.word * WORD_BITS + bit) as u8));
            }
            self.word += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::hash::{DefaultHasher, Hash, Hasher};

    use super::*;

    fn set(ids: &[u8]) -> ComponentSet {
        ids.iter().copied().map(ComponentId::new).collect()
    }

    #[test]
    fn insert_order_does_not_matter() {
        // Given
        let set1 = set(&[2, 1, 200]);
        let set2 = set(&[200, 2, 1, 1]);

        // Then
        assert_eq!(set1, set2);
        let mut hasher1 = DefaultHasher::new();
        set1.hash(&mut hasher1);
        let mut hasher2 = DefaultHasher::new();
        set2.hash(&mut hasher2);
        assert_eq!(hasher1.finish(), hasher2.finish());
    }

    #[test]
    fn single_bit_operations() {
        // Given
        let mut set = ComponentSet::new();

        // When
        assert!(set.insert(ComponentId::new(63)));
        assert!(set.insert(ComponentId::new(64)));
        assert!(!set.insert(ComponentId::new(64)));

        // Then
        assert!(set.contains(ComponentId::new(63)));
        assert!(set.contains(ComponentId::new(64)));
        assert!(!set.contains(ComponentId::new(65)));
        assert_eq!(set.len(), 2);

        // When
        assert!(set.remove(ComponentId::new(63)));
        assert!(!set.remove(ComponentId::new(63)));

        // Then
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn subset_predicates() {
        // Given
        let big = set(&[1, 2, 3, 255]);
        let small = set(&[1, 255]);
        let other = set(&[1, 4]);

        // Then
        assert!(small.is_subset(&big));
        assert!(big.contains_all(&small));
        assert!(big.contains_all(&big));
        assert!(!big.contains_all(&other));
        assert!(ComponentSet::EMPTY.is_subset(&small));
        assert!(big.intersects(&other));
        assert!(!small.intersects(&set(&[2, 3])));
    }

    #[test]
    fn set_algebra() {
        // Given
        let a = set(&[1, 2, 3]);
        let b = set(&[2, 3, 4]);

        // Then
        assert_eq!(a | b, set(&[1, 2, 3, 4]));
        assert_eq!(a & b, set(&[2, 3]));
        assert_eq!(a - b, set(&[1]));
        assert_eq!(a.with(ComponentId::new(9)), set(&[1, 2, 3, 9]));
        assert_eq!(a.without(ComponentId::new(2)), set(&[1, 3]));
    }

    #[test]
    fn iteration_is_ascending() {
        // Given
        let set = set(&[255, 0, 128, 64, 7]);

        // When
        let ids: Vec<u8> = set.iter().map(|id| id.raw()).collect();

        // Then
        assert_eq!(ids, vec![0, 7, 64, 128, 255]);
    }

    #[test]
    fn is_empty_and_len() {
        assert!(ComponentSet::EMPTY.is_empty());
        assert_eq!(ComponentSet::EMPTY.len(), 0);
        assert_eq!(format!("{:?}", set(&[3, 1])), "{1, 3}");
    }
}
