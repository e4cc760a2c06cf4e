// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Join kinds and join-condition analysis.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scalar::func::BinaryFunc;
use crate::scalar::strong;
use crate::{ColumnSet, ScalarExpr};

/// The kind of a binary join.
///
/// `Semi` and `Anti` joins emit only the columns of their left input: the
/// left rows with at least one (resp. no) matching right row.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
}

impl JoinKind {
    /// Whether unmatched right rows are padded with nulls for the left
    /// columns.
    pub fn generates_nulls_on_left(&self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Full)
    }

    /// Whether unmatched left rows are padded with nulls for the right
    /// columns.
    pub fn generates_nulls_on_right(&self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Full)
    }

    pub fn is_outer(&self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Right | JoinKind::Full)
    }

    /// Whether the output includes the right input's columns.
    pub fn projects_right(&self) -> bool {
        !matches!(self, JoinKind::Semi | JoinKind::Anti)
    }

    /// The kind that results from discarding the null-padded rows on the
    /// left.
    pub fn cancel_nulls_on_left(&self) -> JoinKind {
        match self {
            JoinKind::Right => JoinKind::Inner,
            JoinKind::Full => JoinKind::Left,
            other => *other,
        }
    }

    /// The kind that results from discarding the null-padded rows on the
    /// right.
    pub fn cancel_nulls_on_right(&self) -> JoinKind {
        match self {
            JoinKind::Left => JoinKind::Inner,
            JoinKind::Full => JoinKind::Right,
            other => *other,
        }
    }

    /// Whether a filter above the join may become part of its condition.
    pub fn can_push_into_from_above(&self) -> bool {
        matches!(self, JoinKind::Inner | JoinKind::Semi)
    }

    /// Whether a filter above the join that references only left columns may
    /// move onto the left input.
    pub fn can_push_left_from_above(&self) -> bool {
        matches!(
            self,
            JoinKind::Inner | JoinKind::Left | JoinKind::Semi | JoinKind::Anti
        )
    }

    /// Whether a filter above the join that references only right columns
    /// may move onto the right input.
    pub fn can_push_right_from_above(&self) -> bool {
        matches!(self, JoinKind::Inner | JoinKind::Right)
    }

    /// Whether a condition conjunct that references only left columns may
    /// move onto the left input.
    pub fn can_push_left_from_within(&self) -> bool {
        matches!(self, JoinKind::Inner | JoinKind::Right | JoinKind::Semi)
    }

    /// Whether a condition conjunct that references only right columns may
    /// move onto the right input.
    pub fn can_push_right_from_within(&self) -> bool {
        matches!(self, JoinKind::Inner | JoinKind::Left | JoinKind::Semi)
    }

    /// Simplifies an outer join given conjuncts that are applied to its
    /// output: a null-generating side whose padded rows every such filter
    /// would reject is not null-generating after all.
    pub fn strengthen(
        &self,
        above_filters: &[ScalarExpr],
        left_arity: usize,
        right_arity: usize,
    ) -> JoinKind {
        let mut kind = *self;
        if kind.generates_nulls_on_left() {
            let left = ColumnSet::range(0, left_arity);
            if above_filters.iter().any(|f| strong::is_not_true(f, &left)) {
                kind = kind.cancel_nulls_on_left();
            }
        }
        if kind.generates_nulls_on_right() {
            let right = ColumnSet::range(left_arity, left_arity + right_arity);
            if above_filters.iter().any(|f| strong::is_not_true(f, &right)) {
                kind = kind.cancel_nulls_on_right();
            }
        }
        kind
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
            JoinKind::Semi => "semi",
            JoinKind::Anti => "anti",
        })
    }
}

/// A join condition split into equi-conjuncts and the rest.
///
/// `left_keys[i] = right_keys[i]` for each `i`, with right keys numbered
/// within the right input. The residual conjuncts use the join's combined
/// numbering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinInfo {
    pub left_keys: Vec<usize>,
    pub right_keys: Vec<usize>,
    pub residual: Vec<ScalarExpr>,
}

impl JoinInfo {
    /// Analyzes `condition` for a join whose left input has `left_arity`
    /// columns.
    pub fn of(condition: &ScalarExpr, left_arity: usize) -> JoinInfo {
        let mut info = JoinInfo::default();
        for conjunct in condition.conjuncts() {
            match equi_columns(&conjunct, left_arity) {
                Some((l, r)) => {
                    info.left_keys.push(l);
                    info.right_keys.push(r - left_arity);
                }
                None => info.residual.push(conjunct),
            }
        }
        info
    }

    /// Whether the condition is a conjunction of column equalities across
    /// the two inputs.
    pub fn is_equi(&self) -> bool {
        self.residual.is_empty()
    }
}

/// If `expr` is `#l = #r` (in either order) with `l` from the left input and
/// `r` from the right, returns `(l, r)` in combined numbering.
pub fn equi_columns(expr: &ScalarExpr, left_arity: usize) -> Option<(usize, usize)> {
    match expr {
        ScalarExpr::CallBinary {
            func: BinaryFunc::Eq,
            expr1,
            expr2,
        } => match (expr1.as_column()?, expr2.as_column()?) {
            (a, b) if a < left_arity && b >= left_arity => Some((a, b)),
            (a, b) if b < left_arity && a >= left_arity => Some((b, a)),
            _ => None,
        },
        _ => None,
    }
}
