// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Reorders trees of inner joins.

use relopt_expr::{JoinKind, RelExpr, RelKind, ScalarExpr};

use crate::{Operand, Rule, RuleCall, TransformError};

pub mod bushy;

pub use bushy::optimize_bushy_join_order;

/// Replaces a tree of inner joins, and the filters directly above its joins,
/// by the join order of [`optimize_bushy_join_order`].
///
/// Conjuncts that read a single factor are pushed onto that factor, and
/// conjuncts that read none or more than two factors are applied by a filter
/// above the new tree. Trees of fewer than three factors are left alone.
#[derive(Debug)]
pub struct BushyJoinOrder;

impl BushyJoinOrder {
    fn is_inner_join(expr: &RelExpr) -> bool {
        matches!(
            expr.kind(),
            RelKind::Join {
                kind: JoinKind::Inner,
                correlation_ids,
                ..
            } if correlation_ids.is_empty()
        )
    }

    fn is_join_tree(expr: &RelExpr) -> bool {
        match expr.kind() {
            RelKind::Filter { input, .. } => Self::is_inner_join(input),
            _ => Self::is_inner_join(expr),
        }
    }

    /// Collects the factors of the join tree rooted at `expr`, and its
    /// conjuncts shifted to the combined numbering of all factors.
    fn flatten(
        expr: &RelExpr,
        offset: usize,
        factors: &mut Vec<RelExpr>,
        conjuncts: &mut Vec<ScalarExpr>,
    ) {
        match expr.kind() {
            RelKind::Join {
                left,
                right,
                condition,
                ..
            } if Self::is_inner_join(expr) => {
                Self::flatten(left, offset, factors, conjuncts);
                Self::flatten(right, offset + left.arity(), factors, conjuncts);
                conjuncts.extend(condition.conjuncts().iter().map(|c| c.shift_up(offset)));
            }
            RelKind::Filter { input, predicate } if Self::is_inner_join(input) => {
                Self::flatten(input, offset, factors, conjuncts);
                conjuncts.extend(predicate.conjuncts().iter().map(|c| c.shift_up(offset)));
            }
            _ => factors.push(expr.clone()),
        }
    }
}

impl Rule for BushyJoinOrder {
    fn name(&self) -> &'static str {
        "BushyJoinOrder"
    }

    fn operand(&self) -> Operand {
        Operand::any().with_predicate(BushyJoinOrder::is_join_tree)
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let mut factors = Vec::new();
        let mut conjuncts = Vec::new();
        Self::flatten(call.rel(0), 0, &mut factors, &mut conjuncts);
        if factors.len() < 3 {
            call.decline("fewer than three join factors");
            return Ok(());
        }

        let mut offsets = Vec::with_capacity(factors.len());
        let mut total = 0;
        for factor in &factors {
            offsets.push(total);
            total += factor.arity();
        }
        let factor_of = |c: usize| offsets.partition_point(|offset| *offset <= c) - 1;

        let mut local = vec![Vec::new(); factors.len()];
        let mut predicates = Vec::new();
        let mut above = Vec::new();
        for conjunct in conjuncts {
            let mut touched = conjunct.support().iter().map(factor_of).collect::<Vec<_>>();
            touched.dedup();
            match touched[..] {
                [factor] => local[factor].push(conjunct.shift_down(offsets[factor])?),
                [_, _] => predicates.push(conjunct),
                _ => above.push(conjunct),
            }
        }

        let mut b = call.builder();
        let mut filtered = Vec::with_capacity(factors.len());
        for (factor, predicates) in factors.into_iter().zip(local) {
            b.push(factor).filter(predicates)?;
            filtered.push(b.build()?);
        }
        let tree = optimize_bushy_join_order(filtered, predicates, *call.ctx())?;
        b.push(tree).filter(above)?;
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}
