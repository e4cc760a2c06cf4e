// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use relopt_expr::{AggregateCall, Mapping, NodeType, RelKind};

use crate::{Operand, Rule, RuleCall, TransformError};

/// Moves a filter above an aggregate by adding the columns it reads to the
/// group key.
///
/// A top aggregate rolls the finer groups back up to the original ones, which
/// requires every call to have a roll-up function and not to be `DISTINCT`.
/// A filter that reads only grouping columns is left below the aggregate.
#[derive(Debug)]
pub struct AggregateFilterTranspose;

impl Rule for AggregateFilterTranspose {
    fn name(&self) -> &'static str {
        "AggregateFilterTranspose"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Aggregate).with_inputs(vec![Operand::of(NodeType::Filter)])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let (
            RelKind::Aggregate {
                group_set,
                grouping_sets,
                aggregates,
                ..
            },
            RelKind::Filter { input, predicate },
        ) = (call.rel(0).kind(), call.rel(1).kind())
        else {
            return Ok(());
        };
        let filter_columns = predicate.support();
        let new_group_set = group_set.union(&filter_columns);
        // A filter over a global aggregate decides whether it sees any rows,
        // not whether it produces one.
        if new_group_set.is_empty() {
            call.decline("no group key to move the filter above");
            return Ok(());
        }
        if call.ctx().is_unique(input, &new_group_set) {
            call.decline("input is already unique on the new group key");
            return Ok(());
        }

        // Filters over grouping columns belong below the aggregate.
        if filter_columns.is_subset(group_set) && grouping_sets.is_none() {
            call.decline("filter reads only grouping columns");
            return Ok(());
        }

        let mut top_calls = Vec::with_capacity(aggregates.len());
        for (i, aggregate) in aggregates.iter().enumerate() {
            if aggregate.distinct {
                call.decline("distinct aggregates cannot be rolled up");
                return Ok(());
            }
            let Some(rollup) = aggregate.func.rollup() else {
                call.decline("aggregate has no roll-up function");
                return Ok(());
            };
            top_calls.push(AggregateCall::new(
                rollup,
                vec![new_group_set.len() + i],
                aggregate.name.clone(),
            ));
        }
        let mapping = Mapping::from_kept(&new_group_set, input.arity());
        let condition = predicate.remap(&mapping)?;
        let top_group_set = mapping.apply_set(group_set)?;
        let top_grouping_sets = grouping_sets
            .as_ref()
            .map(|sets| {
                sets.iter()
                    .map(|s| mapping.apply_set(s))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        let mut b = call.builder();
        b.push(input.clone())
            .aggregate(new_group_set, None, aggregates.clone())?
            .filter([condition])?
            .aggregate(top_group_set, top_grouping_sets, top_calls)?;
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}

#[cfg(test)]
mod tests {
    use relopt_expr::{AggregateFunc, BinaryFunc, ColumnSet, RelBuilder, RelExpr, ScalarExpr};
    use relopt_expr_test_util::emp_dept;
    use relopt_repr::{Datum, Row, ScalarType};

    use relopt_dyncfg::ConfigSet;

    use super::*;
    use crate::predicate_pushdown::FilterAggregateTranspose;
    use crate::tests::fire;
    use crate::{dyncfgs, DefaultStatistics, Fixpoint, TransformCtx};

    fn int(i: i64) -> ScalarExpr {
        ScalarExpr::literal(Datum::Int64(i), ScalarType::Int64)
    }

    fn aggregate_over_filter(
        group_set: ColumnSet,
        aggregates: Vec<AggregateCall>,
        predicate: ScalarExpr,
    ) -> RelExpr {
        let catalog = emp_dept();
        let mut b = RelBuilder::new();
        b.push(catalog.get("emp").unwrap())
            .filter([predicate])
            .unwrap()
            .aggregate(group_set, None, aggregates)
            .unwrap();
        b.build().unwrap()
    }

    #[relopt_ore::test]
    fn test_rolls_up_finer_groups() {
        let catalog = emp_dept();
        // select dept_id, sum(salary) from emp where salary > 100 group by dept_id
        let original = aggregate_over_filter(
            ColumnSet::range(2, 3),
            vec![AggregateCall::new(AggregateFunc::Sum, vec![3], "s")],
            ScalarExpr::column(3).call_binary(int(100), BinaryFunc::Gt),
        );

        let results = fire(&AggregateFilterTranspose, &original);
        assert_eq!(results.len(), 1);
        let RelKind::Aggregate {
            input,
            group_set,
            aggregates,
            ..
        } = results[0].kind()
        else {
            panic!("expected a top aggregate, got\n{}", results[0]);
        };
        assert_eq!(*group_set, ColumnSet::range(0, 1));
        assert_eq!(aggregates[0].func, AggregateFunc::Sum);
        assert_eq!(aggregates[0].args, vec![2]);
        let RelKind::Filter { input, predicate } = input.kind() else {
            panic!("expected a filter below the top aggregate");
        };
        assert_eq!(predicate.to_string(), "(#1 > 100)");
        assert!(matches!(input.kind(), RelKind::Aggregate { .. }));
        catalog.check_equivalent(&original, &results[0]).unwrap();
    }

    #[relopt_ore::test]
    fn test_count_of_empty_grand_total() {
        let catalog = emp_dept();
        // select count(*) from emp where dept_id = 30
        let original = aggregate_over_filter(
            ColumnSet::new(),
            vec![AggregateCall::count_star("c")],
            ScalarExpr::column(2).call_binary(int(30), BinaryFunc::Eq),
        );

        let results = fire(&AggregateFilterTranspose, &original);
        assert_eq!(results.len(), 1);
        let RelKind::Aggregate { aggregates, .. } = results[0].kind() else {
            panic!("expected a top aggregate, got\n{}", results[0]);
        };
        assert_eq!(aggregates[0].func, AggregateFunc::Sum0);
        assert_eq!(
            catalog.evaluate(&results[0]).unwrap(),
            vec![[Datum::Int64(0)].into_iter().collect::<Row>()]
        );
        catalog.check_equivalent(&original, &results[0]).unwrap();
    }

    #[relopt_ore::test]
    fn test_group_key_filter_stays_below() {
        let catalog = emp_dept();
        // select dept_id, count(*) from emp where dept_id = 10 group by dept_id
        let below = aggregate_over_filter(
            ColumnSet::range(2, 3),
            vec![AggregateCall::count_star("c")],
            ScalarExpr::column(2).call_binary(int(10), BinaryFunc::Eq),
        );
        assert!(fire(&AggregateFilterTranspose, &below).is_empty());

        // The same query with the filter above the aggregate settles with
        // the filter below it.
        let above = {
            let mut b = RelBuilder::new();
            b.push(catalog.get("emp").unwrap())
                .aggregate(ColumnSet::range(2, 3), None, vec![AggregateCall::count_star("c")])
                .unwrap()
                .filter([ScalarExpr::column(0).call_binary(int(10), BinaryFunc::Eq)])
                .unwrap();
            b.build().unwrap()
        };
        let stats = DefaultStatistics::default();
        let config = dyncfgs::all_dyncfgs(ConfigSet::default());
        let ctx = TransformCtx::new(&stats, &config);
        let fixpoint = Fixpoint::new(vec![
            Box::new(AggregateFilterTranspose),
            Box::new(FilterAggregateTranspose),
        ]);
        assert_eq!(fixpoint.optimize(below.clone(), ctx).unwrap(), below);
        let optimized = fixpoint.optimize(above.clone(), ctx).unwrap();
        assert_eq!(optimized, below);
        catalog.check_equivalent(&above, &optimized).unwrap();
    }

    #[relopt_ore::test]
    fn test_declines() {
        let by_salary = ScalarExpr::column(3).call_binary(int(100), BinaryFunc::Gt);

        // emp is unique on emp_id.
        let unique = aggregate_over_filter(
            ColumnSet::range(0, 1),
            vec![AggregateCall::count_star("c")],
            by_salary.clone(),
        );
        assert!(fire(&AggregateFilterTranspose, &unique).is_empty());

        let avg = aggregate_over_filter(
            ColumnSet::range(2, 3),
            vec![AggregateCall::new(AggregateFunc::Avg, vec![3], "a")],
            by_salary.clone(),
        );
        assert!(fire(&AggregateFilterTranspose, &avg).is_empty());

        let distinct = aggregate_over_filter(
            ColumnSet::range(2, 3),
            vec![AggregateCall::new(AggregateFunc::Count, vec![1], "c").distinct(true)],
            by_salary,
        );
        assert!(fire(&AggregateFilterTranspose, &distinct).is_empty());

        let constant = aggregate_over_filter(
            ColumnSet::new(),
            vec![AggregateCall::count_star("c")],
            ScalarExpr::literal_null(ScalarType::Bool).call_is_null(),
        );
        assert!(fire(&AggregateFilterTranspose, &constant).is_empty());
    }
}
