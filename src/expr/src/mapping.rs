// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::{ColumnSet, PlanError};

/// A partial function from source column indices to target column indices.
///
/// Mappings describe how the columns of one row layout move when a rewrite
/// changes the layout, e.g. when a projection prunes columns or a join is
/// rebuilt over reordered inputs. Scalar expressions are rewritten through a
/// mapping with [`ScalarExpr::remap`](crate::ScalarExpr::remap); a reference
/// to a source column without an image is an error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mapping {
    targets: Vec<Option<usize>>,
    target_count: usize,
}

impl Mapping {
    /// A mapping with no pairs.
    pub fn new(source_count: usize, target_count: usize) -> Mapping {
        Mapping {
            targets: vec![None; source_count],
            target_count,
        }
    }

    /// The mapping that sends each of `n` columns to itself.
    pub fn identity(n: usize) -> Mapping {
        Mapping {
            targets: (0..n).map(Some).collect(),
            target_count: n,
        }
    }

    /// The mapping induced by a projection that emits `sources[i]` as its
    /// `i`th column.
    ///
    /// A source emitted more than once maps to its first position.
    pub fn from_sources(sources: &[usize], source_count: usize) -> Mapping {
        let mut mapping = Mapping::new(source_count, sources.len());
        for (target, source) in sources.iter().enumerate().rev() {
            mapping.targets[*source] = Some(target);
        }
        mapping
    }

    /// The mapping that keeps the columns of `kept` and closes the gaps.
    ///
    /// Column `c` maps to the number of kept columns smaller than `c`.
    pub fn from_kept(kept: &ColumnSet, source_count: usize) -> Mapping {
        let mut mapping = Mapping::new(source_count, kept.len());
        for (target, source) in kept.iter().enumerate() {
            mapping.targets[source] = Some(target);
        }
        mapping
    }

    /// Adds the pair `source -> target`, replacing any previous image.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn set(&mut self, source: usize, target: usize) {
        assert!(target < self.target_count, "target {} out of range", target);
        self.targets[source] = Some(target);
    }

    /// The number of source columns.
    pub fn source_count(&self) -> usize {
        self.targets.len()
    }

    /// The number of target columns.
    pub fn target_count(&self) -> usize {
        self.target_count
    }

    /// The image of `source`, if it has one.
    pub fn target(&self, source: usize) -> Option<usize> {
        self.targets.get(source).copied().flatten()
    }

    /// The first source mapping to `target`, if any.
    pub fn source(&self, target: usize) -> Option<usize> {
        self.targets.iter().position(|t| *t == Some(target))
    }

    /// Like [`Mapping::target`], but reports a missing image as an error.
    pub fn try_target(&self, source: usize) -> Result<usize, PlanError> {
        self.target(source)
            .ok_or(PlanError::UnmappedColumn(source))
    }

    /// Shifts every source up by `offset` within a source space of size
    /// `source_count`.
    pub fn offset_source(&self, offset: usize, source_count: usize) -> Mapping {
        let mut mapping = Mapping::new(source_count, self.target_count);
        for (source, target) in self.pairs() {
            mapping.targets[source + offset] = Some(target);
        }
        mapping
    }

    /// Shifts every target up by `offset` within a target space of size
    /// `target_count`.
    pub fn offset_target(&self, offset: usize, target_count: usize) -> Mapping {
        Mapping {
            targets: self.targets.iter().map(|t| t.map(|t| t + offset)).collect(),
            target_count,
        }
    }

    /// Combines two mappings over the same sources. Where both have an image
    /// for a source, `self` wins.
    pub fn merge(&self, other: &Mapping) -> Mapping {
        let source_count = self.source_count().max(other.source_count());
        let targets = (0..source_count)
            .map(|s| self.target(s).or_else(|| other.target(s)))
            .collect();
        Mapping {
            targets,
            target_count: self.target_count.max(other.target_count),
        }
    }

    /// Iterates over the `(source, target)` pairs in source order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.targets
            .iter()
            .enumerate()
            .filter_map(|(s, t)| t.map(|t| (s, t)))
    }

    /// Reports whether this mapping sends each of its columns to itself and
    /// has as many sources as targets.
    pub fn is_identity(&self) -> bool {
        self.source_count() == self.target_count
            && self
                .targets
                .iter()
                .enumerate()
                .all(|(s, t)| *t == Some(s))
    }

    /// Maps every member of `set`.
    pub fn apply_set(&self, set: &ColumnSet) -> Result<ColumnSet, PlanError> {
        set.iter().map(|c| self.try_target(c)).collect()
    }

    /// The image of every source, in source order.
    ///
    /// Projecting these columns from the target layout restores the source
    /// layout.
    pub fn targets_in_source_order(&self) -> Result<Vec<usize>, PlanError> {
        (0..self.source_count()).map(|s| self.try_target(s)).collect()
    }
}
