// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Estimates about relational expressions.
//!
//! Rules consult a [`Statistics`] oracle for row counts, predicate
//! selectivities, uniqueness and known predicates. Every answer is advisory,
//! and every method may answer "unknown". Rules read the oracle through
//! [`TransformCtx`], which maps unknown answers to conservative defaults:
//! an unknown row count is the configured default, an unknown selectivity
//! is 1.0, and unknown uniqueness is "not unique".

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use relopt_expr::{
    BinaryFunc, ColumnSet, JoinKind, Mapping, RelExpr, RelKind, ScalarExpr, SetOpKind, UnaryFunc,
};
use relopt_ore::cast::CastLossy;
use relopt_repr::{GlobalId, Row};

use crate::{dyncfgs, TransformCtx};

/// A metadata oracle.
pub trait Statistics: fmt::Debug {
    /// The number of rows `expr` produces.
    fn row_count(&self, expr: &RelExpr) -> Option<f64>;

    /// The fraction of the rows of `expr` for which `predicate` holds.
    fn selectivity(&self, expr: &RelExpr, predicate: &ScalarExpr) -> Option<f64>;

    /// Whether no two rows of `expr` agree on all of `columns`.
    fn is_unique(&self, expr: &RelExpr, columns: &ColumnSet) -> Option<bool>;

    /// Conjuncts known to hold for every row of `expr`.
    fn pulled_up_predicates(&self, expr: &RelExpr) -> Vec<ScalarExpr>;
}

impl<'a> TransformCtx<'a> {
    pub fn row_count(&self, expr: &RelExpr) -> f64 {
        self.stats.row_count(expr).unwrap_or_else(|| {
            f64::cast_lossy(dyncfgs::OPTIMIZER_DEFAULT_ROW_COUNT.get(self.config))
        })
    }

    pub fn selectivity(&self, expr: &RelExpr, predicate: &ScalarExpr) -> f64 {
        self.stats
            .selectivity(expr, predicate)
            .map_or(1.0, |s| s.clamp(0.0, 1.0))
    }

    pub fn is_unique(&self, expr: &RelExpr, columns: &ColumnSet) -> bool {
        self.stats.is_unique(expr, columns).unwrap_or(false)
    }
}

/// Guesses the selectivity of a predicate from its shape alone.
///
/// Conjunctions multiply the guesses of their conjuncts.
pub fn guess_selectivity(predicate: &ScalarExpr) -> f64 {
    predicate
        .conjuncts()
        .iter()
        .map(|conjunct| match conjunct {
            ScalarExpr::CallBinary {
                func: BinaryFunc::Eq,
                ..
            } => 0.15,
            ScalarExpr::CallBinary {
                func: BinaryFunc::Lt | BinaryFunc::Lte | BinaryFunc::Gt | BinaryFunc::Gte,
                ..
            } => 0.5,
            ScalarExpr::CallUnary {
                func: UnaryFunc::IsNotNull,
                ..
            } => 0.9,
            ScalarExpr::CallUnary {
                func: UnaryFunc::IsNull,
                ..
            } => 0.1,
            e if e.is_literal_false() || e.is_literal_null() => 0.0,
            _ => 0.25,
        })
        .product()
}

/// Statistics derived from declared keys, literal rows, the shape of
/// expressions and per-collection row counts.
#[derive(Clone, Debug, Default)]
pub struct DefaultStatistics {
    row_counts: BTreeMap<GlobalId, f64>,
}

impl DefaultStatistics {
    pub fn new() -> DefaultStatistics {
        DefaultStatistics::default()
    }

    /// Records the number of rows in collection `id`.
    pub fn with_row_count(mut self, id: GlobalId, rows: f64) -> DefaultStatistics {
        self.row_counts.insert(id, rows);
        self
    }
}

impl Statistics for DefaultStatistics {
    fn row_count(&self, expr: &RelExpr) -> Option<f64> {
        match expr.kind() {
            RelKind::Get { id } => self.row_counts.get(id).copied(),
            RelKind::Values { rows } => Some(f64::cast_lossy(rows.len())),
            RelKind::Filter { input, predicate } => {
                Some(self.row_count(input)? * guess_selectivity(predicate))
            }
            RelKind::Project { input, .. } | RelKind::Window { input, .. } => {
                self.row_count(input)
            }
            RelKind::Join {
                left,
                right,
                condition,
                kind,
                ..
            } => {
                let l = self.row_count(left)?;
                let r = self.row_count(right)?;
                let selectivity = guess_selectivity(condition);
                let matched = l * r * selectivity;
                Some(match kind {
                    JoinKind::Inner => matched,
                    JoinKind::Left => matched.max(l),
                    JoinKind::Right => matched.max(r),
                    JoinKind::Full => matched.max(l).max(r),
                    JoinKind::Semi => l * selectivity,
                    JoinKind::Anti => l * (1.0 - selectivity),
                })
            }
            RelKind::Aggregate {
                input,
                group_set,
                grouping_sets,
                ..
            } => {
                if group_set.is_empty() && grouping_sets.is_none() {
                    return Some(1.0);
                }
                let sets = grouping_sets.as_ref().map_or(1, |s| s.len());
                Some((self.row_count(input)? / 10.0).max(1.0) * f64::cast_lossy(sets))
            }
            RelKind::Sort {
                input,
                offset,
                fetch,
                ..
            } => {
                let rows = (self.row_count(input)? - f64::cast_lossy(*offset)).max(0.0);
                Some(match fetch {
                    Some(fetch) => rows.min(f64::cast_lossy(*fetch)),
                    None => rows,
                })
            }
            RelKind::SetOp { kind, inputs, .. } => {
                let counts: Vec<f64> = inputs
                    .iter()
                    .map(|i| self.row_count(i))
                    .collect::<Option<_>>()?;
                match kind {
                    SetOpKind::Union => Some(counts.iter().sum()),
                    SetOpKind::Intersect => counts.into_iter().reduce(f64::min),
                    SetOpKind::Minus => counts.first().copied(),
                }
            }
            RelKind::Subset { alternatives } => alternatives
                .iter()
                .filter_map(|a| self.row_count(a))
                .reduce(f64::min),
        }
    }

    fn selectivity(&self, _expr: &RelExpr, predicate: &ScalarExpr) -> Option<f64> {
        Some(guess_selectivity(predicate))
    }

    fn is_unique(&self, expr: &RelExpr, columns: &ColumnSet) -> Option<bool> {
        if expr.typ().is_key_subset(&columns.to_vec()) {
            return Some(true);
        }
        match expr.kind() {
            RelKind::Values { rows } => {
                let columns = columns.to_vec();
                Some(rows.iter().map(|r| r.project(&columns)).all_unique())
            }
            RelKind::Filter { input, .. } | RelKind::Sort { input, .. } => {
                self.is_unique(input, columns)
            }
            RelKind::Project { input, exprs } => {
                // Rows unique on a subset of the columns are unique on all of
                // them.
                let passed: ColumnSet = columns
                    .iter()
                    .filter_map(|c| exprs.get(c).and_then(|e| e.as_column()))
                    .collect();
                match self.is_unique(input, &passed) {
                    Some(true) => Some(true),
                    _ => None,
                }
            }
            RelKind::Window { input, .. } => {
                let below = columns.intersection(&ColumnSet::range(0, input.arity()));
                match self.is_unique(input, &below) {
                    Some(true) => Some(true),
                    _ => None,
                }
            }
            RelKind::Join {
                left,
                kind: JoinKind::Semi | JoinKind::Anti,
                ..
            } => self.is_unique(left, columns),
            RelKind::Subset { alternatives } => alternatives
                .iter()
                .any(|a| self.is_unique(a, columns) == Some(true))
                .then_some(true),
            _ => None,
        }
    }

    fn pulled_up_predicates(&self, expr: &RelExpr) -> Vec<ScalarExpr> {
        let mut predicates = match expr.kind() {
            RelKind::Get { .. } => vec![],
            RelKind::Values { rows } => constant_columns(rows, expr),
            RelKind::Filter { input, predicate } => {
                let mut predicates = self.pulled_up_predicates(input);
                predicates.extend(
                    predicate
                        .conjuncts()
                        .into_iter()
                        .filter(|c| !c.contains_windowed()),
                );
                predicates
            }
            RelKind::Project { input, exprs } => {
                let mut mapping = Mapping::new(input.arity(), exprs.len());
                for (i, e) in exprs.iter().enumerate().rev() {
                    if let Some(c) = e.as_column() {
                        mapping.set(c, i);
                    }
                }
                let mut predicates: Vec<ScalarExpr> = self
                    .pulled_up_predicates(input)
                    .iter()
                    .filter_map(|p| p.remap(&mapping).ok())
                    .collect();
                for (i, e) in exprs.iter().enumerate() {
                    match e {
                        ScalarExpr::Column(c) => {
                            if let Some(first) = mapping.target(*c).filter(|first| *first != i) {
                                predicates.push(
                                    ScalarExpr::column(first)
                                        .call_binary(ScalarExpr::column(i), BinaryFunc::Eq),
                                );
                            }
                        }
                        ScalarExpr::Literal(datum, _) if !datum.is_null() => predicates.push(
                            ScalarExpr::column(i).call_binary(e.clone(), BinaryFunc::Eq),
                        ),
                        _ => {}
                    }
                }
                predicates
            }
            RelKind::Join {
                left,
                right,
                condition,
                kind,
                ..
            } => {
                let left_arity = left.arity();
                let shifted_right = || {
                    self.pulled_up_predicates(right)
                        .iter()
                        .map(|p| p.shift_up(left_arity))
                        .collect::<Vec<_>>()
                };
                match kind {
                    JoinKind::Inner => {
                        let mut predicates = self.pulled_up_predicates(left);
                        predicates.extend(shifted_right());
                        predicates.extend(condition.conjuncts());
                        predicates
                    }
                    JoinKind::Semi => {
                        let left_columns = ColumnSet::range(0, left_arity);
                        let mut predicates = self.pulled_up_predicates(left);
                        predicates.extend(
                            condition
                                .conjuncts()
                                .into_iter()
                                .filter(|c| c.support().is_subset(&left_columns)),
                        );
                        predicates
                    }
                    JoinKind::Left | JoinKind::Anti => self.pulled_up_predicates(left),
                    JoinKind::Right => shifted_right(),
                    JoinKind::Full => vec![],
                }
            }
            RelKind::Aggregate {
                input,
                group_set,
                grouping_sets: None,
                ..
            } => {
                let mapping = Mapping::from_kept(group_set, input.arity());
                self.pulled_up_predicates(input)
                    .iter()
                    .filter(|p| p.support().is_subset(group_set))
                    .filter_map(|p| p.remap(&mapping).ok())
                    .collect()
            }
            RelKind::Aggregate { .. } => vec![],
            RelKind::Window { input, .. } | RelKind::Sort { input, .. } => {
                self.pulled_up_predicates(input)
            }
            RelKind::SetOp { kind, inputs, .. } => {
                let mut per_input = inputs.iter().map(|i| self.pulled_up_predicates(i));
                let first = per_input.next().unwrap_or_default();
                match kind {
                    SetOpKind::Union => {
                        let rest: Vec<_> = per_input.collect();
                        first
                            .into_iter()
                            .filter(|p| rest.iter().all(|r| r.contains(p)))
                            .collect()
                    }
                    SetOpKind::Intersect => first.into_iter().chain(per_input.flatten()).collect(),
                    SetOpKind::Minus => first,
                }
            }
            RelKind::Subset { alternatives } => alternatives
                .first()
                .map(|a| self.pulled_up_predicates(a))
                .unwrap_or_default(),
        };
        let mut seen = Vec::with_capacity(predicates.len());
        predicates.retain(|p| {
            let new = !p.is_literal_true() && !seen.contains(p);
            if new {
                seen.push(p.clone());
            }
            new
        });
        predicates
    }
}

/// `#c = literal` for each column of a literal collection that holds the
/// same non-null value in every row.
fn constant_columns(rows: &[Row], expr: &RelExpr) -> Vec<ScalarExpr> {
    let Some((first, rest)) = rows.split_first() else {
        return vec![];
    };
    let mut predicates = Vec::new();
    for (c, datum) in first.iter().enumerate() {
        if datum.is_null() || rest.iter().any(|r| r[c] != *datum) {
            continue;
        }
        let scalar_type = datum
            .scalar_type()
            .unwrap_or(expr.desc().get_type(c).scalar_type);
        predicates.push(ScalarExpr::column(c).call_binary(
            ScalarExpr::literal(datum.clone(), scalar_type),
            BinaryFunc::Eq,
        ));
    }
    predicates
}

/// Reports whether `expr` has the shape `#a = #b`, returning the columns.
pub fn column_equality(expr: &ScalarExpr) -> Option<(usize, usize)> {
    match expr {
        ScalarExpr::CallBinary {
            func: BinaryFunc::Eq,
            expr1,
            expr2,
        } => Some((expr1.as_column()?, expr2.as_column()?)),
        _ => None,
    }
}

/// Reports whether `expr` compares a column with a non-null literal.
pub fn column_constant(expr: &ScalarExpr) -> Option<usize> {
    match expr {
        ScalarExpr::CallBinary {
            func: BinaryFunc::Eq,
            expr1,
            expr2,
        } => match (&**expr1, &**expr2) {
            (ScalarExpr::Column(c), lit) | (lit, ScalarExpr::Column(c))
                if lit.as_literal().is_some_and(|d| !d.is_null()) =>
            {
                Some(*c)
            }
            _ => None,
        },
        _ => None,
    }
}
