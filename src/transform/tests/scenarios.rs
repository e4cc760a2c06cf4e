// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! End-to-end rewrites of small queries over `emp` and `dept`.

use relopt_dyncfg::ConfigSet;
use relopt_expr::{
    AggregateCall, AggregateFunc, BinaryFunc, ColumnSet, JoinKind, RelBuilder, RelExpr, RelKind,
    ScalarExpr,
};
use relopt_expr_test_util::emp_dept;
use relopt_expr_test_util::generators::int_desc;
use relopt_expr_test_util::TestCatalog;
use relopt_ore::collections::CollectionExt;
use relopt_repr::{Datum, Row, ScalarType};
use relopt_transform::aggregate_pushdown::AggregateJoinTranspose;
use relopt_transform::column_pruning::ProjectJoinTranspose;
use relopt_transform::empty_propagation::{empty_rules, UnionEmpty};
use relopt_transform::fusion::filter::FilterMerge;
use relopt_transform::fusion::project::{ProjectMerge, ProjectRemove};
use relopt_transform::join_order::optimize_bushy_join_order;
use relopt_transform::predicate_pushdown::{
    FilterIntoJoin, FilterProjectTranspose, JoinConditionPush,
};
use relopt_transform::{apply_rule, dyncfgs, DefaultStatistics, Fixpoint, Rule, TransformCtx};

fn int(i: i64) -> ScalarExpr {
    ScalarExpr::literal(Datum::Int64(i), ScalarType::Int64)
}

fn eq(a: ScalarExpr, b: ScalarExpr) -> ScalarExpr {
    a.call_binary(b, BinaryFunc::Eq)
}

fn config() -> ConfigSet {
    dyncfgs::all_dyncfgs(ConfigSet::default())
}

fn fire(rule: &dyn Rule, expr: &RelExpr) -> Vec<RelExpr> {
    let stats = DefaultStatistics::default();
    let config = config();
    apply_rule(rule, expr, TransformCtx::new(&stats, &config)).unwrap()
}

fn emp_join_dept(catalog: &TestCatalog, kind: JoinKind) -> RelExpr {
    let mut b = RelBuilder::new();
    b.push(catalog.get("emp").unwrap())
        .push(catalog.get("dept").unwrap())
        .join(kind, eq(ScalarExpr::column(2), ScalarExpr::column(4)))
        .unwrap();
    b.build().unwrap()
}

fn filter_of(expr: &RelExpr) -> Option<String> {
    match expr.kind() {
        RelKind::Filter { predicate, .. } => Some(predicate.to_string()),
        _ => None,
    }
}

#[relopt_ore::test]
fn test_filter_splits_over_inner_join() {
    let catalog = emp_dept();
    // where emp.salary = 100 and dept.dept_name = 'eng'
    let mut b = RelBuilder::new();
    b.push(emp_join_dept(&catalog, JoinKind::Inner))
        .filter([
            eq(ScalarExpr::column(3), int(100)),
            eq(
                ScalarExpr::column(5),
                ScalarExpr::literal(Datum::from("eng"), ScalarType::String),
            ),
        ])
        .unwrap();
    let original = b.build().unwrap();

    let result = fire(&FilterIntoJoin, &original).into_element();
    let RelKind::Join {
        left,
        right,
        condition,
        kind,
        ..
    } = result.kind()
    else {
        panic!("expected no filter above the join, got\n{}", result);
    };
    assert_eq!(*kind, JoinKind::Inner);
    assert_eq!(condition.to_string(), "(#2 = #4)");
    assert_eq!(filter_of(left).as_deref(), Some("(#3 = 100)"));
    assert_eq!(filter_of(right).as_deref(), Some("(#1 = \"eng\")"));
    catalog.check_equivalent(&original, &result).unwrap();
}

#[relopt_ore::test]
fn test_left_filter_pushes_below_left_join() {
    let catalog = emp_dept();
    let original =
        RelExpr::filter(emp_join_dept(&catalog, JoinKind::Left), eq(ScalarExpr::column(3), int(100)))
            .unwrap();

    let result = fire(&FilterIntoJoin, &original).into_element();
    let RelKind::Join { left, kind, .. } = result.kind() else {
        panic!("expected no filter above the join, got\n{}", result);
    };
    assert_eq!(*kind, JoinKind::Left);
    assert_eq!(filter_of(left).as_deref(), Some("(#3 = 100)"));
    catalog.check_equivalent(&original, &result).unwrap();
}

#[relopt_ore::test]
fn test_count_per_department_splits_over_join() {
    let catalog = emp_dept();
    // select dept.dept_id, count(*) from emp join dept using (dept_id)
    // group by dept.dept_id
    let mut b = RelBuilder::new();
    b.push(emp_join_dept(&catalog, JoinKind::Inner))
        .aggregate(
            ColumnSet::range(4, 5),
            None,
            vec![AggregateCall::count_star("c")],
        )
        .unwrap();
    let original = b.build().unwrap();

    let result = fire(&AggregateJoinTranspose, &original).into_element();
    let RelKind::Aggregate { aggregates, .. } = result.kind() else {
        panic!("expected a top aggregate, got\n{}", result);
    };
    assert_eq!(aggregates[0].func, AggregateFunc::Sum0);
    let (emp, dept) = (catalog.get("emp").unwrap(), catalog.get("dept").unwrap());
    let mut emp_groups = Vec::new();
    let mut dept_projected = false;
    result.visit_pre(&mut |e| match e.kind() {
        RelKind::Aggregate {
            input, group_set, ..
        } if *input == emp => emp_groups.push(group_set.clone()),
        RelKind::Aggregate { input, .. } if *input == dept => {
            panic!("dept is unique on dept_id and needs no aggregate")
        }
        RelKind::Project { input, .. } if *input == dept => dept_projected = true,
        _ => {}
    });
    assert_eq!(emp_groups, vec![ColumnSet::range(2, 3)]);
    assert!(dept_projected);
    catalog.check_equivalent(&original, &result).unwrap();
}

#[relopt_ore::test]
fn test_bushy_order_consumes_every_predicate() {
    let mut catalog = TestCatalog::default();
    let mut stats = DefaultStatistics::new();
    let mut factors = Vec::new();
    for (name, count) in [("t1", 1000.0), ("t2", 10.0), ("t3", 5.0)] {
        let rows = (0..3)
            .map(|i| Row::pack([Datum::Int64(i), Datum::Int64(i % 2)]))
            .collect();
        let id = catalog.insert(name, int_desc(2), rows).unwrap();
        stats = stats.with_row_count(id, count);
        factors.push(catalog.get(name).unwrap());
    }
    let config = config();
    let ctx = TransformCtx::new(&stats, &config);
    // t1.a = t2.a and t2.b = t3.b
    let predicates = vec![
        eq(ScalarExpr::column(0), ScalarExpr::column(2)),
        eq(ScalarExpr::column(3), ScalarExpr::column(5)),
    ];

    let tree = optimize_bushy_join_order(factors.clone(), predicates.clone(), ctx).unwrap();

    let mut conditions = Vec::new();
    let mut scans = 0;
    tree.visit_pre(&mut |e| match e.kind() {
        RelKind::Join { condition, .. } => conditions.push(condition.clone()),
        RelKind::Get { .. } => scans += 1,
        _ => {}
    });
    assert_eq!(scans, 3);
    assert_eq!(conditions.len(), 2);
    assert!(conditions.iter().all(|c| !c.is_literal_true()));
    // The largest difference in size is between t1 and t2.
    let RelKind::Project { input, .. } = tree.kind() else {
        panic!("expected a projection, got\n{}", tree);
    };
    let RelKind::Join { left, right, .. } = input.kind() else {
        panic!("expected a join, got\n{}", input);
    };
    assert_eq!(*left, factors[2]);
    assert!(matches!(right.kind(), RelKind::Join { .. }));

    let mut b = RelBuilder::new();
    b.push(factors[0].clone())
        .push(factors[1].clone())
        .join(JoinKind::Inner, ScalarExpr::literal_true())
        .unwrap()
        .push(factors[2].clone())
        .join(JoinKind::Inner, ScalarExpr::literal_true())
        .unwrap()
        .filter(predicates)
        .unwrap();
    let original = b.build().unwrap();
    assert_eq!(
        original.desc().iter_names().collect::<Vec<_>>(),
        tree.desc().iter_names().collect::<Vec<_>>()
    );
    catalog.check_equivalent(&original, &tree).unwrap();
}

#[relopt_ore::test]
fn test_union_with_empty_is_its_other_input() {
    let catalog = emp_dept();
    let emp = catalog.get("emp").unwrap();
    let mut b = RelBuilder::new();
    b.push(emp.clone())
        .empty()
        .unwrap()
        .push(emp.clone())
        .union(true, 2)
        .unwrap();
    let original = b.build().unwrap();

    let results = fire(&UnionEmpty, &original);
    assert_eq!(results, vec![emp]);
}

#[relopt_ore::test]
fn test_project_over_join_prunes_inputs() {
    let catalog = emp_dept();
    // select emp.name, dept.dept_name from emp join dept using (dept_id)
    let mut b = RelBuilder::new();
    b.push(emp_join_dept(&catalog, JoinKind::Inner))
        .project(ScalarExpr::columns(&[1, 5]))
        .unwrap();
    let original = b.build().unwrap();

    let result = fire(&ProjectJoinTranspose, &original).into_element();
    let RelKind::Project { input, exprs } = result.kind() else {
        panic!("expected a projection, got\n{}", result);
    };
    assert_eq!(*exprs, ScalarExpr::columns(&[0, 3]));
    let RelKind::Join {
        left,
        right,
        condition,
        ..
    } = input.kind()
    else {
        panic!("expected a join below the projection");
    };
    assert_eq!((left.arity(), right.arity()), (2, 2));
    assert_eq!(condition.to_string(), "(#1 = #2)");
    catalog.check_equivalent(&original, &result).unwrap();
}

#[relopt_ore::test]
fn test_fixpoint_pushes_filters_to_scans() {
    let catalog = emp_dept();
    let stats = DefaultStatistics::default();
    let config = config();
    let ctx = TransformCtx::new(&stats, &config);
    // select name from (select * from emp join dept using (dept_id)
    // where dept_name = 'ops') where salary > 100
    let mut b = RelBuilder::new();
    b.push(emp_join_dept(&catalog, JoinKind::Left))
        .filter([eq(
            ScalarExpr::column(5),
            ScalarExpr::literal(Datum::from("ops"), ScalarType::String),
        )])
        .unwrap()
        .project(ScalarExpr::columns(&[1, 3]))
        .unwrap()
        .filter([ScalarExpr::column(1).call_binary(int(100), BinaryFunc::Gt)])
        .unwrap()
        .project(ScalarExpr::columns(&[0]))
        .unwrap();
    let original = b.build().unwrap();

    let mut rules: Vec<Box<dyn Rule>> = vec![
        Box::new(FilterMerge),
        Box::new(FilterProjectTranspose),
        Box::new(FilterIntoJoin),
        Box::new(JoinConditionPush),
        Box::new(ProjectMerge),
        Box::new(ProjectRemove),
    ];
    rules.extend(empty_rules());
    let optimized = Fixpoint::new(rules).optimize(original.clone(), ctx).unwrap();

    // Every filter ends up directly on a scan, and the dept_name filter
    // turned the left join into an inner join.
    optimized.visit_pre(&mut |e| match e.kind() {
        RelKind::Filter { input, .. } => {
            assert!(matches!(input.kind(), RelKind::Get { .. }), "{}", optimized)
        }
        RelKind::Join { kind, .. } => assert_eq!(*kind, JoinKind::Inner),
        _ => {}
    });
    catalog.check_equivalent(&original, &optimized).unwrap();
}
