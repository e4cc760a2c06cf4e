// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A greedy heuristic that orders a multi-way inner join into a bushy tree.
//!
//! The factors of the join are the vertices of a graph whose edges are the
//! join predicates. The heuristic repeatedly picks the edge whose endpoints
//! differ the most in estimated size and joins its endpoints into a new
//! vertex, so that small inputs meet large ones early. Predicates whose
//! factors all end up in the new vertex become its join condition; the rest
//! now point at the new vertex. Once no edges remain, leftover vertices are
//! joined by cross products.
//!
//! Ties are broken by a canonical order of factors and predicates, so the
//! result depends on the factors and predicates but not on their order.

use ordered_float::OrderedFloat;
use relopt_expr::{ColumnSet, JoinKind, Mapping, RelBuilder, RelExpr, ScalarExpr};
use relopt_ore::soft_assert_or_log;
use tracing::debug;

use crate::{TransformCtx, TransformError};

/// A join tree over some of the factors.
#[derive(Debug)]
struct Vertex {
    /// The factors this tree joins.
    factors: ColumnSet,
    expr: RelExpr,
    /// Estimated number of rows.
    cost: f64,
    /// Sends the combined columns of `factors` to the columns of `expr`.
    mapping: Mapping,
}

/// A join predicate and the factors it references.
#[derive(Debug)]
struct Edge {
    predicate: ScalarExpr,
    factors: ColumnSet,
}

/// Joins `factors` into a single tree using `predicates`.
///
/// Each predicate is expressed over the concatenation of the columns of
/// `factors`, and must reference exactly two factors. The result has the
/// columns of that concatenation, in order.
pub fn optimize_bushy_join_order(
    factors: Vec<RelExpr>,
    predicates: Vec<ScalarExpr>,
    ctx: TransformCtx,
) -> Result<RelExpr, TransformError> {
    if factors.is_empty() {
        return Err(TransformError::Internal(
            "cannot order a join without factors".into(),
        ));
    }
    let mut offsets = Vec::with_capacity(factors.len());
    let mut total = 0;
    for factor in &factors {
        offsets.push(total);
        total += factor.arity();
    }
    let factor_of = |column: usize| -> Result<usize, TransformError> {
        if column >= total {
            return Err(TransformError::Internal(format!(
                "join predicate references column #{} of {}",
                column, total
            )));
        }
        Ok(offsets.partition_point(|offset| *offset <= column) - 1)
    };

    let mut edges = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let factors = predicate
            .support()
            .iter()
            .map(factor_of)
            .collect::<Result<ColumnSet, _>>()?;
        if factors.len() != 2 {
            return Err(TransformError::Internal(format!(
                "join predicate {} references {} factors",
                predicate,
                factors.len()
            )));
        }
        edges.push(Edge { predicate, factors });
    }

    // Visit factors and edges in an order that does not depend on the order
    // of the input, so that reordering an ordered join reproduces it.
    let mut order = (0..factors.len()).collect::<Vec<_>>();
    order.sort_by_cached_key(|i| factors[*i].to_string());
    let mut canonical = Mapping::new(total, total);
    let mut offset = 0;
    for i in &order {
        for c in 0..factors[*i].arity() {
            canonical.set(offsets[*i] + c, offset + c);
        }
        offset += factors[*i].arity();
    }
    edges.sort_by_cached_key(|edge| {
        edge.predicate
            .remap(&canonical)
            .map(|p| p.to_string())
            .unwrap_or_default()
    });

    let mut vertices = Vec::with_capacity(factors.len());
    for i in order {
        let expr = &factors[i];
        vertices.push(Vertex {
            factors: ColumnSet::range(i, i + 1),
            cost: ctx.row_count(expr),
            mapping: Mapping::identity(expr.arity()).offset_source(offsets[i], total),
            expr: expr.clone(),
        });
    }

    while vertices.len() > 1 {
        let (first, second) = match best_edge(&vertices, &edges)? {
            Some((a, b)) => (a.min(b), a.max(b)),
            // Nothing connects the remaining vertices.
            None => (vertices.len() - 2, vertices.len() - 1),
        };
        let v2 = vertices.remove(second);
        let v1 = vertices.remove(first);
        let (major, minor) = if v2.cost < v1.cost { (v2, v1) } else { (v1, v2) };

        let factors = major.factors.union(&minor.factors);
        let (consumed, remaining): (Vec<Edge>, Vec<Edge>) = edges
            .into_iter()
            .partition(|edge| edge.factors.is_subset(&factors));
        edges = remaining;

        let major_arity = major.expr.arity();
        let arity = major_arity + minor.expr.arity();
        let mapping = major
            .mapping
            .merge(&minor.mapping.offset_target(major_arity, arity));
        let condition = ScalarExpr::and_all(
            consumed
                .iter()
                .map(|edge| edge.predicate.remap(&mapping))
                .collect::<Result<Vec<_>, _>>()?,
        );
        let mut b = RelBuilder::new();
        b.push(major.expr)
            .push(minor.expr)
            .join(JoinKind::Inner, condition.clone())?;
        let expr = b.build()?;
        // The condition is numbered against the joined columns.
        let selectivity = if consumed.is_empty() {
            1.0
        } else {
            ctx.selectivity(&expr, &condition)
        };
        let cost = major.cost * minor.cost * selectivity;
        debug!(
            major = ?major.factors,
            minor = ?minor.factors,
            %condition,
            cost,
            "merged join factors"
        );
        vertices.push(Vertex {
            factors,
            expr,
            cost,
            mapping,
        });
    }

    soft_assert_or_log!(
        edges.is_empty(),
        "{} join predicates were never consumed",
        edges.len()
    );
    let Some(root) = vertices.pop() else {
        return Err(TransformError::Internal("join order lost its root".into()));
    };
    let columns = root.mapping.targets_in_source_order()?;
    let mut b = RelBuilder::new();
    b.push(root.expr).project(ScalarExpr::columns(&columns))?;
    Ok(b.build()?)
}

/// The positions of the two vertices connected by the edge whose endpoints
/// differ the most in cost. Ties go to the earliest edge.
fn best_edge(
    vertices: &[Vertex],
    edges: &[Edge],
) -> Result<Option<(usize, usize)>, TransformError> {
    let vertex_of = |factor: usize| {
        vertices
            .iter()
            .position(|v| v.factors.contains(factor))
            .ok_or_else(|| TransformError::Internal(format!("factor {} has no vertex", factor)))
    };
    let mut best: Option<(usize, usize, OrderedFloat<f64>)> = None;
    for edge in edges {
        let ends = edge
            .factors
            .iter()
            .map(vertex_of)
            .collect::<Result<Vec<_>, _>>()?;
        let [a, b] = ends[..] else {
            continue;
        };
        let weight = OrderedFloat((vertices[a].cost - vertices[b].cost).abs());
        if best.map_or(true, |(_, _, w)| weight > w) {
            best = Some((a, b, weight));
        }
    }
    Ok(best.map(|(a, b, _)| (a, b)))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use relopt_dyncfg::ConfigSet;
    use relopt_expr::{BinaryFunc, RelKind};
    use relopt_expr_test_util::generators::int_desc;
    use relopt_expr_test_util::TestCatalog;
    use relopt_repr::{Datum, Row};

    use super::*;
    use crate::{dyncfgs, DefaultStatistics, Statistics};

    fn eq(a: usize, b: usize) -> ScalarExpr {
        ScalarExpr::column(a).call_binary(ScalarExpr::column(b), BinaryFunc::Eq)
    }

    fn rows(pairs: &[(i64, i64)]) -> Vec<Row> {
        pairs
            .iter()
            .map(|(a, b)| Row::pack([Datum::Int64(*a), Datum::Int64(*b)]))
            .collect()
    }

    /// Three two-column tables claimed to hold 1000, 10 and 5 rows.
    fn chain() -> (TestCatalog, DefaultStatistics) {
        let mut catalog = TestCatalog::default();
        let mut stats = DefaultStatistics::new();
        for (name, contents, count) in [
            ("t1", rows(&[(1, 1), (2, 2), (3, 3)]), 1000.0),
            ("t2", rows(&[(1, 7), (2, 8), (3, 7)]), 10.0),
            ("t3", rows(&[(7, 1), (8, 2), (9, 7)]), 5.0),
        ] {
            let id = catalog.insert(name, int_desc(2), contents).unwrap();
            stats = stats.with_row_count(id, count);
        }
        (catalog, stats)
    }

    fn factors(catalog: &TestCatalog, names: &[&str]) -> Vec<RelExpr> {
        names.iter().map(|n| catalog.get(n).unwrap()).collect()
    }

    fn left_deep(factors: &[RelExpr], predicates: &[ScalarExpr]) -> RelExpr {
        let mut b = RelBuilder::new();
        b.push(factors[0].clone());
        for factor in &factors[1..] {
            b.push(factor.clone())
                .join(JoinKind::Inner, ScalarExpr::literal_true())
                .unwrap();
        }
        b.filter(predicates.iter().cloned()).unwrap();
        b.build().unwrap()
    }

    #[relopt_ore::test]
    fn test_largest_difference_merges_first() {
        let (catalog, stats) = chain();
        let config = dyncfgs::all_dyncfgs(ConfigSet::default());
        let ctx = TransformCtx::new(&stats, &config);
        let factors = factors(&catalog, &["t1", "t2", "t3"]);
        // t1.c0 = t2.c0 and t2.c1 = t3.c1
        let predicates = vec![eq(0, 2), eq(3, 5)];

        let tree =
            optimize_bushy_join_order(factors.clone(), predicates.clone(), ctx).unwrap();

        let RelKind::Project { input, exprs } = tree.kind() else {
            panic!("expected a projection, got\n{}", tree);
        };
        assert_eq!(*exprs, ScalarExpr::columns(&[4, 5, 2, 3, 0, 1]));
        let RelKind::Join {
            left,
            right,
            condition,
            ..
        } = input.kind()
        else {
            panic!("expected a join below the projection");
        };
        assert_eq!(*left, factors[2]);
        assert_eq!(condition.to_string(), "(#3 = #1)");
        let RelKind::Join {
            left,
            right,
            condition,
            ..
        } = right.kind()
        else {
            panic!("expected t1 and t2 to be joined first");
        };
        assert_eq!(*left, factors[1]);
        assert_eq!(*right, factors[0]);
        assert_eq!(condition.to_string(), "(#2 = #0)");

        assert_eq!(
            tree.desc().iter_names().map(|n| n.as_str()).collect::<Vec<_>>(),
            vec!["c0", "c1", "c0", "c1", "c0", "c1"]
        );
        catalog
            .check_equivalent(&left_deep(&factors, &predicates), &tree)
            .unwrap();
    }

    /// Records the arity of each node and the columns of each predicate it
    /// is asked to estimate.
    #[derive(Debug)]
    struct RecordingStats {
        inner: DefaultStatistics,
        selectivity_calls: RefCell<Vec<(usize, Vec<usize>)>>,
    }

    impl Statistics for RecordingStats {
        fn row_count(&self, expr: &RelExpr) -> Option<f64> {
            self.inner.row_count(expr)
        }

        fn selectivity(&self, expr: &RelExpr, predicate: &ScalarExpr) -> Option<f64> {
            self.selectivity_calls
                .borrow_mut()
                .push((expr.arity(), predicate.support().to_vec()));
            self.inner.selectivity(expr, predicate)
        }

        fn is_unique(&self, expr: &RelExpr, columns: &ColumnSet) -> Option<bool> {
            self.inner.is_unique(expr, columns)
        }

        fn pulled_up_predicates(&self, expr: &RelExpr) -> Vec<ScalarExpr> {
            self.inner.pulled_up_predicates(expr)
        }
    }

    #[relopt_ore::test]
    fn test_selectivity_reads_columns_of_the_join() {
        let (catalog, stats) = chain();
        let stats = RecordingStats {
            inner: stats,
            selectivity_calls: RefCell::new(vec![]),
        };
        let config = dyncfgs::all_dyncfgs(ConfigSet::default());
        let ctx = TransformCtx::new(&stats, &config);
        let factors = factors(&catalog, &["t1", "t2", "t3"]);

        optimize_bushy_join_order(factors, vec![eq(0, 2), eq(3, 5)], ctx).unwrap();

        let calls = stats.selectivity_calls.into_inner();
        assert_eq!(calls.len(), 2);
        for (arity, columns) in calls {
            assert!(
                columns.iter().all(|c| *c < arity),
                "predicate reads {:?} of a node with {} columns",
                columns,
                arity
            );
        }
    }

    #[relopt_ore::test]
    fn test_disconnected_factors_are_crossed() {
        let (catalog, stats) = chain();
        let config = dyncfgs::all_dyncfgs(ConfigSet::default());
        let ctx = TransformCtx::new(&stats, &config);
        let factors = factors(&catalog, &["t1", "t2", "t3"]);
        let predicates = vec![eq(0, 4)];

        let tree =
            optimize_bushy_join_order(factors.clone(), predicates.clone(), ctx).unwrap();
        let mut joins = 0;
        tree.visit_pre(&mut |e| {
            if let RelKind::Join { condition, .. } = e.kind() {
                joins += 1;
                if joins == 1 {
                    // The cross product is the last merge.
                    assert!(condition.is_literal_true());
                }
            }
        });
        assert_eq!(joins, 2);
        catalog
            .check_equivalent(&left_deep(&factors, &predicates), &tree)
            .unwrap();
    }

    #[relopt_ore::test]
    fn test_single_factor() {
        let (catalog, stats) = chain();
        let config = dyncfgs::all_dyncfgs(ConfigSet::default());
        let ctx = TransformCtx::new(&stats, &config);
        let t1 = catalog.get("t1").unwrap();
        assert_eq!(
            optimize_bushy_join_order(vec![t1.clone()], vec![], ctx).unwrap(),
            t1
        );
    }

    #[relopt_ore::test]
    fn test_rejects_predicates_not_between_two_factors() {
        let (catalog, stats) = chain();
        let config = dyncfgs::all_dyncfgs(ConfigSet::default());
        let ctx = TransformCtx::new(&stats, &config);
        let factors = factors(&catalog, &["t1", "t2", "t3"]);
        let local = eq(0, 1);
        assert!(matches!(
            optimize_bushy_join_order(factors.clone(), vec![local], ctx),
            Err(TransformError::Internal(_))
        ));
        assert!(optimize_bushy_join_order(vec![], vec![], ctx).is_err());
    }
}
