// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Utilities for testing relational expressions.
//!
//! [`evaluate`] computes the rows of a [`RelExpr`] by brute force over the
//! contents of a [`TestCatalog`]. Rewrites are checked by comparing the rows
//! of the original and the rewritten expression with [`check_equivalent`].
//! The strategies in [`generators`] produce random catalogs and expressions.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use itertools::Itertools;
use relopt_expr::{
    AggregateCall, AggregateFunc, BinaryFunc, ColumnOrder, JoinKind, RelExpr, RelKind,
    ScalarExpr, SetOpKind,
};
use relopt_ore::cast::{CastFrom, CastLossy};
use relopt_repr::{ColumnType, Datum, GlobalId, RelationDesc, Row, ScalarType};

pub mod generators;

/// A catalog of named collections and their contents.
#[derive(Debug, Default, Clone)]
pub struct TestCatalog {
    objects: BTreeMap<String, (GlobalId, RelationDesc)>,
    names: BTreeMap<GlobalId, String>,
    contents: BTreeMap<GlobalId, Vec<Row>>,
}

impl TestCatalog {
    /// Registers a collection with the given rows.
    ///
    /// Returns the GlobalId assigned by the catalog to the object.
    ///
    /// Errors if an object of the same name is already in the catalog, or if
    /// a row does not fit `desc`.
    pub fn insert(
        &mut self,
        name: &str,
        desc: RelationDesc,
        rows: Vec<Row>,
    ) -> Result<GlobalId, String> {
        if self.objects.contains_key(name) {
            return Err(format!("Object {} already exists in catalog", name));
        }
        RelExpr::values(rows.clone(), desc.clone()).map_err(|e| e.to_string())?;
        let id = GlobalId::User(u64::cast_from(self.objects.len()));
        self.objects.insert(name.to_string(), (id, desc));
        self.names.insert(id, name.to_string());
        self.contents.insert(id, rows);
        Ok(id)
    }

    /// A scan of the collection called `name`.
    pub fn get(&self, name: &str) -> Result<RelExpr, String> {
        let (id, desc) = self
            .objects
            .get(name)
            .ok_or_else(|| format!("no object named {}", name))?;
        Ok(RelExpr::get(*id, desc.clone()))
    }

    pub fn id(&self, name: &str) -> Option<GlobalId> {
        self.objects.get(name).map(|(id, _)| *id)
    }

    /// Looks up the name of the object referred to as `id`.
    pub fn get_source_name(&self, id: &GlobalId) -> Option<&String> {
        self.names.get(id)
    }

    pub fn contents(&self) -> &BTreeMap<GlobalId, Vec<Row>> {
        &self.contents
    }

    /// The number of rows stored for each collection.
    pub fn row_counts(&self) -> impl Iterator<Item = (GlobalId, usize)> + '_ {
        self.contents.iter().map(|(id, rows)| (*id, rows.len()))
    }

    pub fn evaluate(&self, expr: &RelExpr) -> Result<Vec<Row>, String> {
        evaluate(expr, &self.contents)
    }

    /// See [`check_equivalent`].
    pub fn check_equivalent(&self, original: &RelExpr, replacement: &RelExpr) -> Result<(), String> {
        check_equivalent(original, replacement, &self.contents)
    }
}

/// A catalog with an `emp` table and a `dept` table keyed by `dept_id`.
///
/// `emp` has an employee without a department and `dept` has a department
/// without employees.
pub fn emp_dept() -> TestCatalog {
    let emp = RelationDesc::empty()
        .with_column("emp_id", ScalarType::Int64.nullable(false))
        .with_column("name", ScalarType::String.nullable(false))
        .with_column("dept_id", ScalarType::Int64.nullable(true))
        .with_column("salary", ScalarType::Int64.nullable(true))
        .with_key(vec![0]);
    let dept = RelationDesc::empty()
        .with_column("dept_id", ScalarType::Int64.nullable(false))
        .with_column("dept_name", ScalarType::String.nullable(false))
        .with_key(vec![0]);
    let emp_rows = vec![
        Row::pack([Datum::Int64(1), "alice".into(), Datum::Int64(10), Datum::Int64(100)]),
        Row::pack([Datum::Int64(2), "bob".into(), Datum::Int64(10), Datum::Int64(200)]),
        Row::pack([Datum::Int64(3), "carol".into(), Datum::Int64(20), Datum::Null]),
        Row::pack([Datum::Int64(4), "dave".into(), Datum::Null, Datum::Int64(50)]),
        Row::pack([Datum::Int64(5), "erin".into(), Datum::Int64(20), Datum::Int64(300)]),
        Row::pack([Datum::Int64(6), "frank".into(), Datum::Int64(10), Datum::Int64(100)]),
    ];
    let dept_rows = vec![
        Row::pack([Datum::Int64(10), "eng".into()]),
        Row::pack([Datum::Int64(20), "ops".into()]),
        Row::pack([Datum::Int64(30), "hr".into()]),
    ];
    let mut catalog = TestCatalog::default();
    catalog
        .insert("emp", emp, emp_rows)
        .expect("emp rows fit their schema");
    catalog
        .insert("dept", dept, dept_rows)
        .expect("dept rows fit their schema");
    catalog
}

/// Compares two expressions by the multisets of rows they produce.
///
/// On a mismatch, the error shows both expressions and their rows.
pub fn check_equivalent(
    original: &RelExpr,
    replacement: &RelExpr,
    sources: &BTreeMap<GlobalId, Vec<Row>>,
) -> Result<(), String> {
    let expected = sorted(evaluate(original, sources)?);
    let actual = sorted(evaluate(replacement, sources)?);
    if expected == actual {
        return Ok(());
    }
    Err(format!(
        "rows differ\noriginal:\n{}rows:\n{}\nreplacement:\n{}rows:\n{}",
        original,
        expected.iter().join("\n"),
        replacement,
        actual.iter().join("\n")
    ))
}

pub fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort();
    rows
}

/// Computes the rows of `expr`, reading collections from `sources`.
///
/// Nested-loop joins and full re-scans per group make this quadratic in
/// most operators. Sorting is stable, so a `Sort` with a limit only has a
/// well-defined result when its keys are unique.
pub fn evaluate(
    expr: &RelExpr,
    sources: &BTreeMap<GlobalId, Vec<Row>>,
) -> Result<Vec<Row>, String> {
    match expr.kind() {
        RelKind::Get { id } => sources
            .get(id)
            .cloned()
            .ok_or_else(|| format!("no contents for {}", id)),
        RelKind::Values { rows } => Ok(rows.clone()),
        RelKind::Filter { input, predicate } => {
            let rows = evaluate(input, sources)?;
            Ok(rows
                .into_iter()
                .filter(|row| predicate.eval(row) == Datum::True)
                .collect())
        }
        RelKind::Project { input, exprs } => {
            let rows = evaluate(input, sources)?;
            let types = &input.typ().column_types;
            Ok(rows
                .iter()
                .map(|row| {
                    exprs
                        .iter()
                        .map(|e| eval_projected(e, row, &rows, types))
                        .collect::<Row>()
                })
                .collect())
        }
        RelKind::Join {
            left,
            right,
            condition,
            kind,
            ..
        } => {
            let left_rows = evaluate(left, sources)?;
            let right_rows = evaluate(right, sources)?;
            Ok(join(
                &left_rows,
                &right_rows,
                condition,
                *kind,
                left.arity(),
                right.arity(),
            ))
        }
        RelKind::Aggregate {
            input,
            group_set,
            grouping_sets,
            aggregates,
        } => {
            let rows = evaluate(input, sources)?;
            let types = &input.typ().column_types;
            let sets = match grouping_sets {
                Some(sets) => sets.clone(),
                None => vec![group_set.clone()],
            };
            let mut out: Vec<Row> = Vec::new();
            for set in &sets {
                let mut groups: BTreeMap<Row, Vec<&Row>> = BTreeMap::new();
                for row in &rows {
                    let key = group_set
                        .iter()
                        .map(|c| {
                            if set.contains(c) {
                                row[c].clone()
                            } else {
                                Datum::Null
                            }
                        })
                        .collect();
                    groups.entry(key).or_default().push(row);
                }
                // A grand total has a row even over no input.
                if set.is_empty() && groups.is_empty() {
                    groups.insert(Row::pack(group_set.iter().map(|_| Datum::Null)), vec![]);
                }
                for (key, members) in groups {
                    let values = aggregates
                        .iter()
                        .map(|call| aggregate(call, &members, types));
                    out.push(key.iter().cloned().chain(values).collect());
                }
            }
            Ok(out)
        }
        RelKind::Window { input, groups } => {
            let rows = evaluate(input, sources)?;
            let types = &input.typ().column_types;
            let mut appended: Vec<Vec<Datum>> = vec![Vec::new(); rows.len()];
            for group in groups {
                for (row, extra) in rows.iter().zip_eq(appended.iter_mut()) {
                    let frame: Vec<&Row> = rows
                        .iter()
                        .filter(|other| {
                            group.partition_by.iter().all(|c| other[c] == row[c])
                                && compare_rows(&group.order_by, other, row) != Ordering::Greater
                        })
                        .collect();
                    extra.extend(group.aggregates.iter().map(|call| aggregate(call, &frame, types)));
                }
            }
            Ok(rows
                .iter()
                .zip_eq(appended)
                .map(|(row, extra)| row.iter().cloned().chain(extra).collect::<Row>())
                .collect())
        }
        RelKind::Sort {
            input,
            order_by,
            offset,
            fetch,
        } => {
            let mut rows = evaluate(input, sources)?;
            rows.sort_by(|a, b| compare_rows(order_by, a, b));
            Ok(rows
                .into_iter()
                .skip(*offset)
                .take(fetch.unwrap_or(usize::MAX))
                .collect())
        }
        RelKind::SetOp { kind, all, inputs } => {
            let results = inputs
                .iter()
                .map(|input| evaluate(input, sources))
                .collect::<Result<Vec<_>, _>>()?;
            let mut results = results.into_iter();
            let Some(mut acc) = results.next() else {
                return Err(format!("{} without inputs", kind));
            };
            for rows in results {
                acc = set_op(*kind, *all, acc, rows);
            }
            if !*all {
                acc.sort();
                acc.dedup();
            }
            Ok(acc)
        }
        RelKind::Subset { alternatives } => match alternatives.first() {
            Some(first) => evaluate(first, sources),
            None => Err("subset without alternatives".into()),
        },
    }
}

/// Orders rows by `order_by`. Rows that tie on every key compare equal.
pub fn compare_rows(order_by: &[ColumnOrder], a: &Row, b: &Row) -> Ordering {
    for order in order_by {
        let (x, y) = (&a[order.column], &b[order.column]);
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if order.nulls_last => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, true) if order.nulls_last => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) if order.desc => y.cmp(x),
            (false, false) => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Computes `call` over `rows`, whose columns have types `input_types`.
pub fn aggregate(call: &AggregateCall, rows: &[&Row], input_types: &[ColumnType]) -> Datum {
    let mut values: Vec<Datum> = match call.args.first() {
        None => rows.iter().map(|_| Datum::True).collect(),
        Some(arg) => rows
            .iter()
            .map(|row| row.get(*arg).cloned().unwrap_or(Datum::Null))
            .collect(),
    };
    if call.distinct {
        values.sort();
        values.dedup();
    }
    values.retain(|d| !d.is_null());
    let arg_type = call
        .args
        .first()
        .and_then(|a| input_types.get(*a))
        .map(|t| t.scalar_type);
    match call.func {
        AggregateFunc::Count => Datum::Int64(i64::try_from(values.len()).unwrap_or(i64::MAX)),
        AggregateFunc::Sum => sum(values).unwrap_or(Datum::Null),
        AggregateFunc::Sum0 => sum(values).unwrap_or(match arg_type {
            Some(ScalarType::Float64) => Datum::from(0.0),
            _ => Datum::Int64(0),
        }),
        AggregateFunc::Min | AggregateFunc::AnyValue => {
            values.into_iter().min().unwrap_or(Datum::Null)
        }
        AggregateFunc::Max => values.into_iter().max().unwrap_or(Datum::Null),
        AggregateFunc::Avg => {
            let count = values.len();
            let total: f64 = values
                .iter()
                .map(|d| match d {
                    Datum::Int64(i) => f64::cast_lossy(*i),
                    Datum::Float64(f) => f.into_inner(),
                    _ => 0.0,
                })
                .sum();
            if count == 0 {
                Datum::Null
            } else {
                Datum::from(total / f64::cast_lossy(count))
            }
        }
    }
}

fn sum(values: Vec<Datum>) -> Option<Datum> {
    values
        .into_iter()
        .reduce(|a, b| BinaryFunc::Add.eval(a, b))
}

/// Evaluates a projection item, computing windowed aggregates over the
/// partition of `rows` that `row` belongs to.
fn eval_projected(expr: &ScalarExpr, row: &Row, rows: &[Row], types: &[ColumnType]) -> Datum {
    if !expr.contains_windowed() {
        return expr.eval(row);
    }
    let mut expr = expr.clone();
    expr.visit_mut(&mut |e| {
        if let ScalarExpr::Windowed(w) = e {
            let call = AggregateCall::new(w.func, w.args.clone(), "w");
            let partition: Vec<&Row> = rows
                .iter()
                .filter(|other| w.partition_by.iter().all(|c| other[*c] == row[*c]))
                .collect();
            let value = aggregate(&call, &partition, types);
            // The literal's type plays no part in evaluation.
            let scalar_type = value.scalar_type().unwrap_or(ScalarType::Int64);
            *e = ScalarExpr::literal(value, scalar_type);
        }
    });
    expr.eval(row)
}

fn nulls(arity: usize) -> Row {
    Row::pack((0..arity).map(|_| Datum::Null))
}

fn join(
    left: &[Row],
    right: &[Row],
    condition: &ScalarExpr,
    kind: JoinKind,
    left_arity: usize,
    right_arity: usize,
) -> Vec<Row> {
    let mut out = Vec::new();
    let mut right_matched = vec![false; right.len()];
    for l in left {
        let mut matched = false;
        for (r, r_matched) in right.iter().zip_eq(right_matched.iter_mut()) {
            let joined = l.concat(r);
            if condition.eval(&joined) == Datum::True {
                matched = true;
                *r_matched = true;
                if kind.projects_right() {
                    out.push(joined);
                }
            }
        }
        match kind {
            JoinKind::Semi if matched => out.push(l.clone()),
            JoinKind::Anti if !matched => out.push(l.clone()),
            JoinKind::Left | JoinKind::Full if !matched => out.push(l.concat(&nulls(right_arity))),
            _ => {}
        }
    }
    if kind.generates_nulls_on_left() {
        for (r, matched) in right.iter().zip_eq(right_matched) {
            if !matched {
                out.push(nulls(left_arity).concat(r));
            }
        }
    }
    out
}

/// Combines two inputs of a set operation with multiset semantics.
/// Duplicates are removed afterwards if the operation is not `all`.
fn set_op(kind: SetOpKind, all: bool, acc: Vec<Row>, rows: Vec<Row>) -> Vec<Row> {
    let mut counts: BTreeMap<Row, usize> = BTreeMap::new();
    for row in &rows {
        *counts.entry(row.clone()).or_default() += 1;
    }
    match kind {
        SetOpKind::Union => acc.into_iter().chain(rows).collect(),
        SetOpKind::Intersect => acc
            .into_iter()
            .filter(|row| match counts.get_mut(row) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            })
            .collect(),
        SetOpKind::Minus if !all => acc
            .into_iter()
            .filter(|row| !counts.contains_key(row))
            .collect(),
        SetOpKind::Minus => acc
            .into_iter()
            .filter(|row| match counts.get_mut(row) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    false
                }
                _ => true,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use relopt_expr::{ColumnSet, RelBuilder, WindowGroup};

    use super::*;

    fn int(i: i64) -> ScalarExpr {
        ScalarExpr::literal(Datum::Int64(i), ScalarType::Int64)
    }

    #[relopt_ore::test]
    fn test_left_join_pads_unmatched_rows() {
        let catalog = emp_dept();
        let mut b = RelBuilder::new();
        b.push(catalog.get("dept").unwrap())
            .push(catalog.get("emp").unwrap())
            .join(
                JoinKind::Left,
                ScalarExpr::column(0).call_binary(ScalarExpr::column(4), BinaryFunc::Eq),
            )
            .unwrap();
        let rows = catalog.evaluate(&b.build().unwrap()).unwrap();
        // Five employees with a department, plus the empty "hr".
        assert_eq!(rows.len(), 6);
        assert!(rows
            .iter()
            .any(|r| r[1] == Datum::from("hr") && r[2].is_null()));
    }

    #[relopt_ore::test]
    fn test_anti_join_keeps_unmatched_left_rows() {
        let catalog = emp_dept();
        let mut b = RelBuilder::new();
        b.push(catalog.get("dept").unwrap())
            .push(catalog.get("emp").unwrap())
            .join(
                JoinKind::Anti,
                ScalarExpr::column(0).call_binary(ScalarExpr::column(4), BinaryFunc::Eq),
            )
            .unwrap();
        let rows = catalog.evaluate(&b.build().unwrap()).unwrap();
        assert_eq!(rows, vec![Row::pack([Datum::Int64(30), "hr".into()])]);
    }

    #[relopt_ore::test]
    fn test_aggregate_with_grouping_sets() {
        let catalog = emp_dept();
        let group_set = ColumnSet::range(2, 3);
        let mut b = RelBuilder::new();
        b.push(catalog.get("emp").unwrap())
            .aggregate(
                group_set.clone(),
                Some(vec![group_set, ColumnSet::new()]),
                vec![
                    AggregateCall::count_star("c"),
                    AggregateCall::new(AggregateFunc::Sum, vec![3], "s"),
                ],
            )
            .unwrap();
        let rows = sorted(catalog.evaluate(&b.build().unwrap()).unwrap());
        assert_eq!(
            rows,
            vec![
                // The null department and the grand total both have a null
                // key.
                Row::pack([Datum::Null, Datum::Int64(1), Datum::Int64(50)]),
                Row::pack([Datum::Null, Datum::Int64(6), Datum::Int64(750)]),
                Row::pack([Datum::Int64(10), Datum::Int64(3), Datum::Int64(400)]),
                Row::pack([Datum::Int64(20), Datum::Int64(2), Datum::Int64(300)]),
            ]
        );
    }

    #[relopt_ore::test]
    fn test_grand_total_over_empty_input() {
        let catalog = emp_dept();
        let mut b = RelBuilder::new();
        b.push(catalog.get("emp").unwrap())
            .empty()
            .unwrap()
            .aggregate(
                ColumnSet::new(),
                None,
                vec![
                    AggregateCall::count_star("c"),
                    AggregateCall::new(AggregateFunc::Sum, vec![3], "s"),
                    AggregateCall::new(AggregateFunc::Sum0, vec![3], "z"),
                ],
            )
            .unwrap();
        let rows = catalog.evaluate(&b.build().unwrap()).unwrap();
        assert_eq!(
            rows,
            vec![Row::pack([Datum::Int64(0), Datum::Null, Datum::Int64(0)])]
        );
    }

    #[relopt_ore::test]
    fn test_running_window_includes_peers() {
        let catalog = emp_dept();
        let group = WindowGroup::new(
            ColumnSet::new(),
            vec![ColumnOrder::asc(3)],
            vec![AggregateCall::new(AggregateFunc::Sum, vec![3], "running")],
        );
        let window = RelExpr::window(catalog.get("emp").unwrap(), vec![group]).unwrap();
        let rows = catalog.evaluate(&window).unwrap();
        let running = |emp_id: i64| {
            rows.iter()
                .find(|r| r[0] == Datum::Int64(emp_id))
                .map(|r| r[4].clone())
        };
        // Salaries in ascending order: 50, 100, 100, 200, 300, then null.
        assert_eq!(running(4), Some(Datum::Int64(50)));
        assert_eq!(running(1), Some(Datum::Int64(250)));
        assert_eq!(running(6), Some(Datum::Int64(250)));
        assert_eq!(running(3), Some(Datum::Int64(750)));
    }

    #[relopt_ore::test]
    fn test_set_operations() {
        let desc = RelationDesc::empty().with_column("a", ScalarType::Int64.nullable(false));
        let values = |xs: &[i64]| {
            RelExpr::values(xs.iter().map(|x| Row::pack([*x])).collect(), desc.clone()).unwrap()
        };
        let sources = BTreeMap::new();
        let eval = |kind, all| {
            let expr = RelExpr::set_op(kind, all, vec![values(&[1, 1, 2, 3]), values(&[1, 3, 3])])
                .unwrap();
            sorted(evaluate(&expr, &sources).unwrap())
                .into_iter()
                .map(|r| r[0].unwrap_int64())
                .collect::<Vec<_>>()
        };
        assert_eq!(eval(SetOpKind::Union, true), vec![1, 1, 1, 2, 3, 3, 3]);
        assert_eq!(eval(SetOpKind::Union, false), vec![1, 2, 3]);
        assert_eq!(eval(SetOpKind::Intersect, true), vec![1, 3]);
        assert_eq!(eval(SetOpKind::Minus, true), vec![1, 2]);
        assert_eq!(eval(SetOpKind::Minus, false), vec![2]);
    }

    #[relopt_ore::test]
    fn test_windowed_projection() {
        let catalog = emp_dept();
        let mut b = RelBuilder::new();
        b.push(catalog.get("emp").unwrap())
            .project(vec![
                ScalarExpr::column(0),
                ScalarExpr::windowed(AggregateFunc::Count, vec![0], vec![2]),
                ScalarExpr::column(3).call_binary(int(1), BinaryFunc::Add),
            ])
            .unwrap();
        let rows = sorted(catalog.evaluate(&b.build().unwrap()).unwrap());
        assert_eq!(
            rows[0],
            Row::pack([Datum::Int64(1), Datum::Int64(3), Datum::Int64(101)])
        );
        assert_eq!(
            rows[3],
            Row::pack([Datum::Int64(4), Datum::Int64(1), Datum::Int64(51)])
        );
    }
}
