// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Rules must produce equivalent expressions with the same schema, and must
//! not fire on their own output forever.

use proptest::prelude::*;
use relopt_dyncfg::ConfigSet;
use relopt_expr::{BinaryFunc, JoinKind, NodeType, RelBuilder, RelExpr, RelKind, ScalarExpr};
use relopt_expr_test_util::generators::{arb_catalog, arb_plan, TABLES};
use relopt_expr_test_util::TestCatalog;
use relopt_ore::cast::CastLossy;
use relopt_transform::aggregate_pushdown::{AggregateFilterTranspose, AggregateJoinTranspose};
use relopt_transform::column_pruning::{ProjectJoinTranspose, ProjectWindowTranspose};
use relopt_transform::empty_propagation::empty_rules;
use relopt_transform::fusion::filter::FilterMerge;
use relopt_transform::fusion::project::{ProjectMerge, ProjectRemove};
use relopt_transform::join_order::{optimize_bushy_join_order, BushyJoinOrder};
use relopt_transform::predicate_pushdown::{
    FilterAggregateTranspose, FilterIntoJoin, FilterProjectTranspose, FilterSetOpTranspose,
    JoinConditionPush,
};
use relopt_transform::{apply_rule, dyncfgs, DefaultStatistics, Fixpoint, Rule, TransformCtx};

/// Each rule, and the shape of expressions it matches.
fn rules() -> Vec<(Box<dyn Rule>, Vec<NodeType>)> {
    use NodeType::*;
    vec![
        (Box::new(FilterIntoJoin), vec![Filter, Join]),
        (Box::new(JoinConditionPush), vec![Join]),
        (Box::new(FilterProjectTranspose), vec![Filter, Project]),
        (Box::new(FilterSetOpTranspose), vec![Filter, SetOp]),
        (Box::new(FilterAggregateTranspose), vec![Filter, Aggregate]),
        (Box::new(ProjectJoinTranspose), vec![Project, Join]),
        (Box::new(ProjectWindowTranspose), vec![Project, Window]),
        (Box::new(AggregateFilterTranspose), vec![Aggregate, Filter]),
        (Box::new(AggregateJoinTranspose), vec![Aggregate, Join]),
        (Box::new(FilterMerge), vec![Filter, Filter]),
        (Box::new(ProjectMerge), vec![Project, Project]),
        (Box::new(ProjectRemove), vec![Project]),
        (Box::new(BushyJoinOrder), vec![Filter, Join, Join]),
    ]
}

/// The index of a rule in [`rules`], and a catalog and expression shaped for
/// that rule.
fn arb_rule_and_plan() -> impl Strategy<Value = (usize, TestCatalog, RelExpr)> {
    (0..rules().len()).prop_flat_map(|i| {
        let (_, shape) = rules().swap_remove(i);
        arb_plan(shape, 3).prop_map(move |(catalog, expr)| (i, catalog, expr))
    })
}

fn stats_for(catalog: &TestCatalog) -> DefaultStatistics {
    catalog
        .row_counts()
        .fold(DefaultStatistics::new(), |stats, (id, rows)| {
            stats.with_row_count(id, f64::cast_lossy(rows))
        })
}

fn names(expr: &RelExpr) -> Vec<String> {
    expr.desc().iter_names().map(|n| n.to_string()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[relopt_ore::test]
    #[cfg_attr(miri, ignore)] // too slow
    fn rules_preserve_rows_and_schema((i, catalog, expr) in arb_rule_and_plan()) {
        let (rule, _) = rules().swap_remove(i);
        let stats = stats_for(&catalog);
        let config = dyncfgs::all_dyncfgs(ConfigSet::default());
        let ctx = TransformCtx::new(&stats, &config);
        let replacements = apply_rule(rule.as_ref(), &expr, ctx);
        prop_assert!(replacements.is_ok(), "{}: {:?}\n{}", rule.name(), replacements, expr);
        for replacement in replacements.unwrap() {
            prop_assert_eq!(names(&expr), names(&replacement), "{}", rule.name());
            prop_assert!(expr.desc().accepts(replacement.desc()), "{}", rule.name());
            let equivalent = catalog.check_equivalent(&expr, &replacement);
            prop_assert!(equivalent.is_ok(), "{}: {}", rule.name(), equivalent.unwrap_err());
        }
    }

    #[relopt_ore::test]
    #[cfg_attr(miri, ignore)] // too slow
    fn rules_reach_a_fixpoint((i, catalog, expr) in arb_rule_and_plan()) {
        let (rule, _) = rules().swap_remove(i);
        let name = rule.name();
        let stats = stats_for(&catalog);
        let config = dyncfgs::all_dyncfgs(ConfigSet::default());
        let ctx = TransformCtx::new(&stats, &config);
        let optimized = Fixpoint::new(vec![rule]).optimize(expr.clone(), ctx);
        prop_assert!(optimized.is_ok(), "{}: {:?}\n{}", name, optimized, expr);
        let optimized = optimized.unwrap();
        let equivalent = catalog.check_equivalent(&expr, &optimized);
        prop_assert!(equivalent.is_ok(), "{}: {}", name, equivalent.unwrap_err());
    }

    #[relopt_ore::test]
    #[cfg_attr(miri, ignore)] // too slow
    fn empty_propagation_preserves_rows((catalog, expr) in arb_plan(vec![], 3)) {
        let stats = stats_for(&catalog);
        let config = dyncfgs::all_dyncfgs(ConfigSet::default());
        let ctx = TransformCtx::new(&stats, &config);
        let optimized = Fixpoint::new(empty_rules()).optimize(expr.clone(), ctx).unwrap();
        prop_assert_eq!(names(&expr), names(&optimized));
        let equivalent = catalog.check_equivalent(&expr, &optimized);
        prop_assert!(equivalent.is_ok(), "{}", equivalent.unwrap_err());
    }

    #[relopt_ore::test]
    #[cfg_attr(miri, ignore)] // too slow
    fn bushy_join_order_joins_every_factor_once(
        catalog in arb_catalog(),
        tables in prop::collection::vec(0..TABLES.len(), 3..6),
        choices in prop::collection::vec(any::<u8>(), 16),
    ) {
        let factors: Vec<RelExpr> = tables
            .iter()
            .map(|t| catalog.get(TABLES[*t].0).unwrap())
            .collect();
        let mut offsets = vec![0];
        for factor in &factors {
            offsets.push(offsets.last().unwrap() + factor.arity());
        }
        // Connect each factor to an earlier one.
        let mut choices = choices.into_iter().map(usize::from).cycle();
        let mut predicates = Vec::new();
        for i in 1..factors.len() {
            let j = choices.next().unwrap() % i;
            let left = offsets[j] + choices.next().unwrap() % factors[j].arity();
            let right = offsets[i] + choices.next().unwrap() % factors[i].arity();
            predicates.push(
                ScalarExpr::column(left).call_binary(ScalarExpr::column(right), BinaryFunc::Eq),
            );
        }

        let stats = stats_for(&catalog);
        let config = dyncfgs::all_dyncfgs(ConfigSet::default());
        let ctx = TransformCtx::new(&stats, &config);
        let tree = optimize_bushy_join_order(factors.clone(), predicates.clone(), ctx).unwrap();

        let mut joins = 0;
        let mut scans = 0;
        tree.visit_pre(&mut |e| match e.kind() {
            RelKind::Join { condition, .. } => {
                joins += 1;
                // The predicates connect every factor.
                assert!(!condition.is_literal_true(), "cross product in\n{}", tree);
            }
            RelKind::Get { .. } => scans += 1,
            _ => {}
        });
        prop_assert_eq!(joins, factors.len() - 1);
        prop_assert_eq!(scans, factors.len());

        let mut b = RelBuilder::new();
        b.push(factors[0].clone());
        for factor in &factors[1..] {
            b.push(factor.clone())
                .join(JoinKind::Inner, ScalarExpr::literal_true())
                .unwrap();
        }
        b.filter(predicates).unwrap();
        let original = b.build().unwrap();
        prop_assert_eq!(names(&original), names(&tree));
        prop_assert!(original.desc().accepts(tree.desc()));
        let equivalent = catalog.check_equivalent(&original, &tree);
        prop_assert!(equivalent.is_ok(), "{}", equivalent.unwrap_err());
    }
}
