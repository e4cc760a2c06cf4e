// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use bit_set::BitSet;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A set of column indices.
///
/// Column sets are derived on demand from scalar expressions and relation
/// payloads to answer questions like "does this predicate only reference the
/// left input of the join". Equality, ordering and hashing consider only the
/// members of the set.
#[derive(Clone, Default)]
pub struct ColumnSet {
    bits: BitSet,
}

impl ColumnSet {
    /// Returns an empty set.
    pub fn new() -> ColumnSet {
        ColumnSet::default()
    }

    /// Returns the set `{start, start + 1, ..., end - 1}`.
    pub fn range(start: usize, end: usize) -> ColumnSet {
        (start..end).collect()
    }

    /// Adds a column, returning whether it was newly inserted.
    pub fn insert(&mut self, column: usize) -> bool {
        self.bits.insert(column)
    }

    /// Removes a column, returning whether it was present.
    pub fn remove(&mut self, column: usize) -> bool {
        self.bits.remove(column)
    }

    /// Reports whether the column is in the set.
    pub fn contains(&self, column: usize) -> bool {
        self.bits.contains(column)
    }

    /// The number of columns in the set.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Reports whether the set has no columns.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Iterates over the columns in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter()
    }

    /// The smallest column in the set.
    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    /// Returns the union of the two sets.
    pub fn union(&self, other: &ColumnSet) -> ColumnSet {
        let mut bits = self.bits.clone();
        bits.union_with(&other.bits);
        ColumnSet { bits }
    }

    /// Returns the intersection of the two sets.
    pub fn intersection(&self, other: &ColumnSet) -> ColumnSet {
        let mut bits = self.bits.clone();
        bits.intersect_with(&other.bits);
        ColumnSet { bits }
    }

    /// Returns the columns of `self` not in `other`.
    pub fn difference(&self, other: &ColumnSet) -> ColumnSet {
        let mut bits = self.bits.clone();
        bits.difference_with(&other.bits);
        ColumnSet { bits }
    }

    /// Reports whether every column of `self` is in `other`.
    pub fn is_subset(&self, other: &ColumnSet) -> bool {
        self.bits.is_subset(&other.bits)
    }

    /// Reports whether every column of `other` is in `self`.
    pub fn contains_all(&self, other: &ColumnSet) -> bool {
        other.is_subset(self)
    }

    /// Reports whether the sets share a column.
    pub fn intersects(&self, other: &ColumnSet) -> bool {
        !self.bits.is_disjoint(&other.bits)
    }

    /// Returns the set with every column increased by `by`.
    pub fn shift_up(&self, by: usize) -> ColumnSet {
        self.iter().map(|c| c + by).collect()
    }

    /// Returns the set with every column decreased by `by`. Columns below
    /// `by` are dropped.
    pub fn shift_down(&self, by: usize) -> ColumnSet {
        self.iter().filter_map(|c| c.checked_sub(by)).collect()
    }

    /// The number of members strictly smaller than `column`.
    pub fn count_below(&self, column: usize) -> usize {
        self.iter().take_while(|c| *c < column).count()
    }

    /// The position of `column` in ascending order, if it is a member.
    pub fn index_of(&self, column: usize) -> Option<usize> {
        self.contains(column).then(|| self.count_below(column))
    }

    /// The columns in ascending order.
    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }
}

impl FromIterator<usize> for ColumnSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut set = ColumnSet::new();
        for c in iter {
            set.insert(c);
        }
        set
    }
}

impl Extend<usize> for ColumnSet {
    fn extend<T: IntoIterator<Item = usize>>(&mut self, iter: T) {
        for c in iter {
            self.insert(c);
        }
    }
}

impl PartialEq for ColumnSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ColumnSet {}

impl PartialOrd for ColumnSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ColumnSet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl Hash for ColumnSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.iter() {
            c.hash(state);
        }
        self.len().hash(state);
    }
}

impl Serialize for ColumnSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ColumnSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Vec::<usize>::deserialize(deserializer)?.into_iter().collect())
    }
}

impl fmt::Debug for ColumnSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ColumnSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[relopt_ore::test]
    fn test_equality_ignores_capacity() {
        let mut a = ColumnSet::range(0, 100);
        for c in 3..100 {
            a.remove(c);
        }
        let b = ColumnSet::range(0, 3);
        assert_eq!(a, b);
    }

    #[relopt_ore::test]
    fn test_set_algebra() {
        let left = ColumnSet::range(0, 3);
        let refs: ColumnSet = [1, 4].into_iter().collect();
        assert!(!refs.is_subset(&left));
        assert!(refs.intersects(&left));
        assert_eq!(refs.intersection(&left).to_vec(), vec![1]);
        assert_eq!(refs.difference(&left).to_vec(), vec![4]);
        assert_eq!(refs.union(&left).to_vec(), vec![0, 1, 2, 4]);
        assert_eq!(refs.shift_down(3).to_vec(), vec![1]);
        assert_eq!(refs.shift_up(2).to_vec(), vec![3, 6]);
    }

    #[relopt_ore::test]
    fn test_ranks() {
        let kept: ColumnSet = [0, 2, 5].into_iter().collect();
        assert_eq!(kept.count_below(5), 2);
        assert_eq!(kept.count_below(3), 2);
        assert_eq!(kept.index_of(2), Some(1));
        assert_eq!(kept.index_of(3), None);
        assert_eq!(kept.to_string(), "{0, 2, 5}");
    }
}
