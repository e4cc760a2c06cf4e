// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Pushes filters into and through binary joins.
//!
//! Conjuncts of a filter above a join, and of the join's own condition, move
//! into whichever input they reference when that preserves the rows the join
//! pads with nulls. Filters above an outer join that reject every padded row
//! first simplify the join toward an inner join.

use relopt_expr::{equi_columns, JoinKind, NodeType, RelExpr, RelKind, ScalarExpr};

use crate::{dyncfgs, Operand, Rule, RuleCall, TransformError};

/// Pushes a filter above a join into the join's condition and inputs.
#[derive(Debug)]
pub struct FilterIntoJoin;

impl Rule for FilterIntoJoin {
    fn name(&self) -> &'static str {
        "FilterIntoJoin"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Filter).with_inputs(vec![Operand::of(NodeType::Join)])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let (filter, join) = (call.rel(0).clone(), call.rel(1).clone());
        perform(call, Some(&filter), &join)
    }
}

/// Pushes single-sided conjuncts of a join's condition into its inputs.
#[derive(Debug)]
pub struct JoinConditionPush;

impl Rule for JoinConditionPush {
    fn name(&self) -> &'static str {
        "JoinConditionPush"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Join)
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let join = call.rel(0).clone();
        perform(call, None, &join)
    }
}

/// Conjuncts sorted by where they end up.
#[derive(Debug, Default)]
struct Classified {
    /// Conjuncts applied above the join.
    above: Vec<ScalarExpr>,
    /// Conjuncts of the join condition, in combined numbering.
    join: Vec<ScalarExpr>,
    /// Conjuncts applied to the left input.
    left: Vec<ScalarExpr>,
    /// Conjuncts applied to the right input, in its own numbering.
    right: Vec<ScalarExpr>,
}

impl Classified {
    /// Moves the conjuncts of `filters` that may move and returns the rest.
    fn classify(
        &mut self,
        filters: Vec<ScalarExpr>,
        left_arity: usize,
        push_into: bool,
        push_left: bool,
        push_right: bool,
    ) -> Result<Vec<ScalarExpr>, TransformError> {
        let mut kept = Vec::new();
        for filter in filters {
            let support = filter.support();
            let left_only = support.iter().all(|c| c < left_arity);
            let right_only = support.iter().all(|c| c >= left_arity);
            if push_left && left_only {
                self.left.push(filter);
            } else if push_right && right_only {
                self.right.push(filter.shift_down(left_arity)?);
            } else if push_into {
                if !self.join.contains(&filter) {
                    self.join.push(filter);
                }
            } else {
                kept.push(filter);
            }
        }
        Ok(kept)
    }
}

fn perform(
    call: &mut RuleCall,
    filter: Option<&RelExpr>,
    join: &RelExpr,
) -> Result<(), TransformError> {
    let RelKind::Join {
        left,
        right,
        condition,
        kind,
        correlation_ids,
    } = join.kind()
    else {
        return Ok(());
    };
    let orig_join_filters = condition.conjuncts();
    let orig_above_filters = match filter.map(RelExpr::kind) {
        Some(RelKind::Filter { predicate, .. }) => predicate.conjuncts(),
        _ => vec![],
    };
    if filter.is_none() && orig_join_filters.is_empty() {
        call.decline("no join condition to push");
        return Ok(());
    }

    let mut join_kind = *kind;
    if !orig_above_filters.is_empty()
        && join_kind.is_outer()
        && dyncfgs::OPTIMIZER_OUTER_JOIN_STRENGTHENING.get(call.config())
    {
        join_kind = join_kind.strengthen(&orig_above_filters, left.arity(), right.arity());
    }

    let left_arity = left.arity();
    let mut classified = Classified {
        join: orig_join_filters.clone(),
        ..Default::default()
    };

    let above = classified.classify(
        orig_above_filters.clone(),
        left_arity,
        join_kind.can_push_into_from_above(),
        join_kind.can_push_left_from_above(),
        join_kind.can_push_right_from_above(),
    )?;
    classified.above = above;

    // Conjuncts of an anti join's condition decide which left rows survive;
    // they cannot be applied to either input.
    if join_kind != JoinKind::Anti {
        let join_filters = std::mem::take(&mut classified.join);
        let kept = classified.classify(
            join_filters,
            left_arity,
            false,
            join_kind.can_push_left_from_within(),
            join_kind.can_push_right_from_within(),
        )?;
        classified.join = kept;
    }

    if join_kind == JoinKind::Inner
        && dyncfgs::OPTIMIZER_JOIN_CONDITION_EQUI_ONLY.get(call.config())
    {
        let (equi, other): (Vec<_>, Vec<_>) = std::mem::take(&mut classified.join)
            .into_iter()
            .partition(|c| equi_columns(c, left_arity).is_some());
        classified.join = equi;
        classified.above.extend(other);
    }

    // Nothing moved if every conjunct is where it started.
    let unchanged = classified.left.is_empty()
        && classified.right.is_empty()
        && classified.join.len() == orig_join_filters.len()
        && classified.above.len() == orig_above_filters.len()
        && classified.join.iter().all(|c| orig_join_filters.contains(c));
    if unchanged && join_kind == *kind {
        call.decline("no conjunct moved and the join kind is unchanged");
        return Ok(());
    }

    let mut b = call.builder();
    b.push(left.clone())
        .filter(classified.left)?
        .push(right.clone())
        .filter(classified.right)?
        .join_correlated(
            join_kind,
            ScalarExpr::and_all(classified.join),
            correlation_ids.clone(),
        )?
        .filter(classified.above)?;
    call.transform_to(b.build()?)
}

#[cfg(test)]
mod tests {
    use relopt_dyncfg::ConfigSet;
    use relopt_expr::{BinaryFunc, RelBuilder};
    use relopt_expr_test_util::{emp_dept, TestCatalog};
    use relopt_repr::{Datum, ScalarType};

    use super::*;
    use crate::tests::{fire, fire_with};
    use crate::DefaultStatistics;

    fn int(i: i64) -> ScalarExpr {
        ScalarExpr::literal(Datum::Int64(i), ScalarType::Int64)
    }

    fn eng() -> ScalarExpr {
        ScalarExpr::literal(Datum::String("eng".into()), ScalarType::String)
    }

    fn eq(a: ScalarExpr, b: ScalarExpr) -> ScalarExpr {
        a.call_binary(b, BinaryFunc::Eq)
    }

    /// `emp JOIN dept ON emp.dept_id = dept.dept_id` with extra condition
    /// conjuncts, filtered by `above`.
    fn emp_join_dept(
        catalog: &TestCatalog,
        kind: JoinKind,
        extra: Vec<ScalarExpr>,
        above: Vec<ScalarExpr>,
    ) -> RelExpr {
        let mut condition = vec![eq(ScalarExpr::column(2), ScalarExpr::column(4))];
        condition.extend(extra);
        let mut b = RelBuilder::new();
        b.push(catalog.get("emp").unwrap())
            .push(catalog.get("dept").unwrap())
            .join(kind, ScalarExpr::and_all(condition))
            .unwrap()
            .filter(above)
            .unwrap();
        b.build().unwrap()
    }

    fn unwrap_join(expr: &RelExpr) -> (&RelExpr, &RelExpr, &ScalarExpr, JoinKind) {
        match expr.kind() {
            RelKind::Join {
                left,
                right,
                condition,
                kind,
                ..
            } => (left, right, condition, *kind),
            _ => panic!("expected a join, got\n{}", expr),
        }
    }

    fn filter_predicate(expr: &RelExpr) -> String {
        match expr.kind() {
            RelKind::Filter { predicate, .. } => predicate.to_string(),
            _ => panic!("expected a filter, got\n{}", expr),
        }
    }

    #[relopt_ore::test]
    fn test_inner_join_pushes_both_sides() {
        let catalog = emp_dept();
        let original = emp_join_dept(
            &catalog,
            JoinKind::Inner,
            vec![],
            vec![eq(ScalarExpr::column(0), int(1)), eq(ScalarExpr::column(5), eng())],
        );

        let results = fire(&FilterIntoJoin, &original);
        assert_eq!(results.len(), 1);
        let (left, right, condition, kind) = unwrap_join(&results[0]);
        assert_eq!(kind, JoinKind::Inner);
        assert_eq!(condition.to_string(), "(#2 = #4)");
        assert_eq!(filter_predicate(left), "(#0 = 1)");
        assert_eq!(filter_predicate(right), "(#1 = \"eng\")");
        catalog.check_equivalent(&original, &results[0]).unwrap();
    }

    #[relopt_ore::test]
    fn test_left_join_pushes_left_only() {
        let catalog = emp_dept();
        let original = emp_join_dept(
            &catalog,
            JoinKind::Left,
            vec![],
            vec![ScalarExpr::column(3).call_binary(int(100), BinaryFunc::Gt)],
        );

        let results = fire(&FilterIntoJoin, &original);
        assert_eq!(results.len(), 1);
        let (left, right, _, kind) = unwrap_join(&results[0]);
        assert_eq!(kind, JoinKind::Left);
        assert_eq!(filter_predicate(left), "(#3 > 100)");
        assert!(matches!(right.kind(), RelKind::Get { .. }));
        catalog.check_equivalent(&original, &results[0]).unwrap();
    }

    #[relopt_ore::test]
    fn test_cross_side_filter_joins_condition() {
        let catalog = emp_dept();
        let local = ScalarExpr::column(3).call_binary(int(100), BinaryFunc::Gt);
        let cross = ScalarExpr::column(0).call_binary(ScalarExpr::column(4), BinaryFunc::Lt);
        let original = emp_join_dept(
            &catalog,
            JoinKind::Inner,
            vec![local],
            vec![cross.clone()],
        );

        let results = fire(&FilterIntoJoin, &original);
        assert_eq!(results.len(), 1);
        let (left, right, condition, kind) = unwrap_join(&results[0]);
        assert_eq!(kind, JoinKind::Inner);
        let conjuncts = condition.conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert!(conjuncts.contains(&eq(ScalarExpr::column(2), ScalarExpr::column(4))));
        assert!(conjuncts.contains(&cross));
        assert_eq!(filter_predicate(left), "(#3 > 100)");
        assert!(matches!(right.kind(), RelKind::Get { .. }));
        catalog.check_equivalent(&original, &results[0]).unwrap();
    }

    #[relopt_ore::test]
    fn test_null_rejecting_filter_strengthens_left_join() {
        let catalog = emp_dept();
        let original = emp_join_dept(
            &catalog,
            JoinKind::Left,
            vec![],
            vec![eq(ScalarExpr::column(5), eng())],
        );

        let results = fire(&FilterIntoJoin, &original);
        assert_eq!(results.len(), 1);
        let (_, right, _, kind) = unwrap_join(&results[0]);
        assert_eq!(kind, JoinKind::Inner);
        assert_eq!(filter_predicate(right), "(#1 = \"eng\")");
        catalog.check_equivalent(&original, &results[0]).unwrap();

        // Without strengthening, the filter cannot move.
        let config = crate::dyncfgs::all_dyncfgs(ConfigSet::default());
        assert!(dyncfgs::OPTIMIZER_OUTER_JOIN_STRENGTHENING.set(&config, false));
        let stats = DefaultStatistics::default();
        assert!(fire_with(&FilterIntoJoin, &original, &stats, &config).is_empty());
    }

    #[relopt_ore::test]
    fn test_is_null_filter_keeps_outer_join() {
        let catalog = emp_dept();
        // Employees without a matching department.
        let original = emp_join_dept(
            &catalog,
            JoinKind::Left,
            vec![],
            vec![ScalarExpr::column(4).call_is_null()],
        );
        assert!(fire(&FilterIntoJoin, &original).is_empty());
    }

    #[relopt_ore::test]
    fn test_condition_pushes_into_inner_side_of_left_join() {
        let catalog = emp_dept();
        let original = emp_join_dept(
            &catalog,
            JoinKind::Left,
            vec![eq(ScalarExpr::column(5), eng())],
            vec![],
        );

        let results = fire(&JoinConditionPush, &original);
        assert_eq!(results.len(), 1);
        let (left, right, condition, kind) = unwrap_join(&results[0]);
        assert_eq!(kind, JoinKind::Left);
        assert_eq!(condition.to_string(), "(#2 = #4)");
        assert!(matches!(left.kind(), RelKind::Get { .. }));
        assert_eq!(filter_predicate(right), "(#1 = \"eng\")");
        catalog.check_equivalent(&original, &results[0]).unwrap();
    }

    #[relopt_ore::test]
    fn test_left_conjunct_of_left_join_condition_stays() {
        let catalog = emp_dept();
        let original = emp_join_dept(
            &catalog,
            JoinKind::Left,
            vec![eq(ScalarExpr::column(0), int(1))],
            vec![],
        );
        assert!(fire(&JoinConditionPush, &original).is_empty());
    }

    #[relopt_ore::test]
    fn test_anti_join_condition_stays() {
        let catalog = emp_dept();
        let original = emp_join_dept(
            &catalog,
            JoinKind::Anti,
            vec![eq(ScalarExpr::column(5), eng())],
            vec![],
        );
        assert!(fire(&JoinConditionPush, &original).is_empty());
    }

    #[relopt_ore::test]
    fn test_equi_only_moves_residual_above() {
        let catalog = emp_dept();
        let residual = ScalarExpr::column(3).call_binary(ScalarExpr::column(4), BinaryFunc::Gt);
        let original = emp_join_dept(&catalog, JoinKind::Inner, vec![residual], vec![]);
        assert!(fire(&JoinConditionPush, &original).is_empty());

        let config = crate::dyncfgs::all_dyncfgs(ConfigSet::default());
        assert!(dyncfgs::OPTIMIZER_JOIN_CONDITION_EQUI_ONLY.set(&config, true));
        let stats = DefaultStatistics::default();
        let results = fire_with(&JoinConditionPush, &original, &stats, &config);
        assert_eq!(results.len(), 1);
        assert_eq!(filter_predicate(&results[0]), "(#3 > #4)");
        let RelKind::Filter { input, .. } = results[0].kind() else {
            unreachable!()
        };
        let (_, _, condition, _) = unwrap_join(input);
        assert_eq!(condition.to_string(), "(#2 = #4)");
        catalog.check_equivalent(&original, &results[0]).unwrap();
    }
}
