// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! `proptest` strategies for catalogs and expressions.
//!
//! Generated catalogs hold the tables in [`TABLES`]. Every column is a
//! `bigint`, so any column may feed any comparison or aggregate; column `c0`
//! of each table is a non-null key. Generated expressions keep every column
//! a `bigint`.
//!
//! Expressions are built from a vector of random choices rather than a
//! recursive strategy: the parameters of a node depend on the arity of its
//! inputs, which is only known once they are built.

use itertools::Itertools;
use proptest::prelude::*;
use relopt_expr::{
    AggregateCall, AggregateFunc, BinaryFunc, ColumnOrder, ColumnSet, JoinKind, NodeType,
    PlanError, RelBuilder, RelExpr, ScalarExpr, SetOpKind, UnaryFunc, WindowGroup,
};
use relopt_ore::cast::CastFrom;
use relopt_repr::{Datum, RelationDesc, Row, ScalarType};

use crate::TestCatalog;

/// The name and arity of each table in a generated catalog.
pub const TABLES: [(&str, usize); 3] = [("t0", 3), ("t1", 2), ("t2", 3)];

/// A table of `arity` `bigint` columns named `c0`, `c1`, and so on, keyed by
/// the non-null `c0`.
pub fn int_desc(arity: usize) -> RelationDesc {
    let mut desc = RelationDesc::empty();
    for i in 0..arity {
        desc = desc.with_column(format!("c{}", i), ScalarType::Int64.nullable(i > 0));
    }
    desc.with_key(vec![0])
}

/// Small integers and the occasional null, so that joins and groups collide.
pub fn arb_datum() -> impl Strategy<Value = Datum> {
    prop_oneof![
        1 => Just(Datum::Null),
        4 => (0i64..4).prop_map(Datum::Int64),
    ]
}

/// Up to four rows for [`int_desc`]`(arity)`.
pub fn arb_rows(arity: usize) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(
        prop::collection::vec(arb_datum(), arity.saturating_sub(1)),
        0..5,
    )
    .prop_map(|rows| {
        (0i64..)
            .zip(rows)
            .map(|(key, rest)| Row::pack(std::iter::once(Datum::Int64(key)).chain(rest)))
            .collect()
    })
}

pub fn arb_catalog() -> impl Strategy<Value = TestCatalog> {
    (
        arb_rows(TABLES[0].1),
        arb_rows(TABLES[1].1),
        arb_rows(TABLES[2].1),
    )
        .prop_map(|(r0, r1, r2)| {
            let mut catalog = TestCatalog::default();
            for ((name, arity), rows) in TABLES.iter().zip_eq([r0, r1, r2]) {
                catalog
                    .insert(name, int_desc(*arity), rows)
                    .expect("generated rows fit their schema");
            }
            catalog
        })
}

/// A catalog and an expression over it.
///
/// `shape` forces the kinds of the root and of its first input, its first
/// input's first input, and so on; the rest of the tree is random up to
/// `depth` levels.
pub fn arb_plan(
    shape: Vec<NodeType>,
    depth: usize,
) -> impl Strategy<Value = (TestCatalog, RelExpr)> {
    (arb_catalog(), prop::collection::vec(any::<u32>(), 128)).prop_filter_map(
        "expression could not be built",
        move |(catalog, choices)| {
            let mut generator = PlanGenerator {
                catalog: &catalog,
                choices: &choices,
                position: 0,
            };
            let expr = generator.rel_shaped(&shape, depth).ok()?;
            Some((catalog, expr))
        },
    )
}

struct PlanGenerator<'a> {
    catalog: &'a TestCatalog,
    choices: &'a [u32],
    position: usize,
}

impl PlanGenerator<'_> {
    /// A number in `0..n`, or `0` if `n` is zero.
    fn choose(&mut self, n: usize) -> usize {
        let choice = self.choices.get(self.position).copied().unwrap_or(0);
        self.position += 1;
        if n == 0 {
            0
        } else {
            usize::cast_from(choice) % n
        }
    }

    fn one_in(&mut self, n: usize) -> bool {
        self.choose(n) == 0
    }

    fn pick<T: Copy>(&mut self, options: &[T]) -> T {
        options[self.choose(options.len())]
    }

    fn rel_shaped(&mut self, shape: &[NodeType], depth: usize) -> Result<RelExpr, PlanError> {
        match shape.split_first() {
            Some((kind, rest)) => self.rel_of(*kind, depth, rest),
            None => self.rel(depth),
        }
    }

    fn rel(&mut self, depth: usize) -> Result<RelExpr, PlanError> {
        if depth == 0 {
            return self.leaf();
        }
        let kind = self.pick(&[
            NodeType::Get,
            NodeType::Filter,
            NodeType::Project,
            NodeType::Join,
            NodeType::Join,
            NodeType::Aggregate,
            NodeType::Window,
            NodeType::Sort,
            NodeType::SetOp,
            NodeType::Values,
        ]);
        self.rel_of(kind, depth, &[])
    }

    fn leaf(&mut self) -> Result<RelExpr, PlanError> {
        let (name, _) = self.pick(&TABLES);
        let scan = self.catalog.get(name).map_err(PlanError::Invalid)?;
        if self.one_in(8) {
            Ok(RelExpr::empty(scan.desc().clone()))
        } else {
            Ok(scan)
        }
    }

    /// A node of type `kind` whose first input has the shape `rest`.
    fn rel_of(
        &mut self,
        kind: NodeType,
        depth: usize,
        rest: &[NodeType],
    ) -> Result<RelExpr, PlanError> {
        let depth = depth.saturating_sub(1);
        match kind {
            NodeType::Get | NodeType::Subset => self.leaf(),
            NodeType::Values => {
                let input = self.rel_shaped(rest, depth)?;
                Ok(RelExpr::empty(input.desc().clone()))
            }
            NodeType::Filter => {
                let input = self.rel_shaped(rest, depth)?;
                let predicate = self.predicate(input.arity());
                RelExpr::filter(input, predicate)
            }
            NodeType::Project => {
                let input = self.rel_shaped(rest, depth)?;
                let arity = input.arity();
                let count = 1 + self.choose(4);
                let exprs = (0..count).map(|_| self.projection_item(arity)).collect();
                let mut b = RelBuilder::new();
                b.push(input).project(exprs)?;
                b.build()
            }
            NodeType::Join => {
                let left = self.rel_shaped(rest, depth)?;
                let right = self.rel(depth)?;
                let kind = self.pick(&[
                    JoinKind::Inner,
                    JoinKind::Inner,
                    JoinKind::Left,
                    JoinKind::Right,
                    JoinKind::Full,
                    JoinKind::Semi,
                    JoinKind::Anti,
                ]);
                let condition = self.join_condition(left.arity(), right.arity());
                RelExpr::join(left, right, condition, kind)
            }
            NodeType::Aggregate => {
                let input = self.rel_shaped(rest, depth)?;
                let arity = input.arity();
                let group_set: ColumnSet = (0..arity).filter(|_| self.one_in(2)).collect();
                let grouping_sets = match group_set.first() {
                    Some(first) if self.one_in(5) => Some(vec![
                        group_set.clone(),
                        ColumnSet::range(first, first + 1),
                        ColumnSet::new(),
                    ]),
                    _ => None,
                };
                let count = self.choose(3);
                let aggregates = (0..count)
                    .map(|i| self.aggregate_call(arity, i, true))
                    .collect();
                RelExpr::aggregate(input, group_set, grouping_sets, aggregates)
            }
            NodeType::Window => {
                let input = self.rel_shaped(rest, depth)?;
                let arity = input.arity();
                let partition_by = (0..arity).filter(|_| self.one_in(3)).collect();
                let order_by = if self.one_in(2) {
                    vec![]
                } else {
                    vec![ColumnOrder {
                        column: self.choose(arity),
                        desc: self.one_in(2),
                        nulls_last: self.one_in(2),
                    }]
                };
                let count = 1 + self.choose(2);
                let aggregates = (0..count)
                    .map(|i| self.aggregate_call(arity, i, false))
                    .collect();
                RelExpr::window(input, vec![WindowGroup::new(partition_by, order_by, aggregates)])
            }
            NodeType::Sort => {
                let input = self.rel_shaped(rest, depth)?;
                let order_by = vec![ColumnOrder::asc(self.choose(input.arity()))];
                // Only a zero limit is deterministic over ties.
                let fetch = self.one_in(4).then_some(0);
                RelExpr::sort(input, order_by, 0, fetch)
            }
            NodeType::SetOp => {
                let left = self.rel_shaped(rest, depth)?;
                let right = self.rel(depth)?;
                let arity = left.arity().min(right.arity());
                let kind = self.pick(&[
                    SetOpKind::Union,
                    SetOpKind::Union,
                    SetOpKind::Intersect,
                    SetOpKind::Minus,
                ]);
                let all = self.one_in(2);
                let mut b = RelBuilder::new();
                for input in [left, right] {
                    b.push(input)
                        .project(ScalarExpr::columns(&(0..arity).collect_vec()))?;
                }
                match kind {
                    SetOpKind::Union => b.union(all, 2)?,
                    SetOpKind::Intersect => b.intersect(all, 2)?,
                    SetOpKind::Minus => b.minus(all, 2)?,
                };
                b.build()
            }
        }
    }

    fn literal(&mut self) -> ScalarExpr {
        if self.one_in(10) {
            ScalarExpr::literal_null(ScalarType::Int64)
        } else {
            let value = self.pick(&[0, 1, 2, 3]);
            ScalarExpr::literal(Datum::Int64(value), ScalarType::Int64)
        }
    }

    fn comparison(&mut self, column: ScalarExpr) -> ScalarExpr {
        let func = self.pick(&[
            BinaryFunc::Eq,
            BinaryFunc::NotEq,
            BinaryFunc::Lt,
            BinaryFunc::Lte,
            BinaryFunc::Gt,
            BinaryFunc::Gte,
        ]);
        let literal = self.literal();
        column.call_binary(literal, func)
    }

    fn atom(&mut self, arity: usize) -> ScalarExpr {
        let column = ScalarExpr::column(self.choose(arity));
        match self.choose(7) {
            0 => column.call_is_null(),
            1 => column.call_unary(UnaryFunc::IsNotNull),
            2 => {
                let other = ScalarExpr::column(self.choose(arity));
                column.call_binary(other, BinaryFunc::Eq)
            }
            3 => {
                let first = self.comparison(column.clone());
                let second = self.comparison(column);
                ScalarExpr::or_all([first, second])
            }
            4 => self.comparison(column).call_unary(UnaryFunc::Not),
            _ => self.comparison(column),
        }
    }

    fn predicate(&mut self, arity: usize) -> ScalarExpr {
        let count = 1 + self.choose(3);
        let atoms: Vec<_> = (0..count).map(|_| self.atom(arity)).collect();
        ScalarExpr::and_all(atoms)
    }

    fn join_condition(&mut self, left_arity: usize, right_arity: usize) -> ScalarExpr {
        let mut conjuncts = Vec::new();
        for _ in 0..self.choose(3) {
            let left = ScalarExpr::column(self.choose(left_arity));
            let right = ScalarExpr::column(left_arity + self.choose(right_arity));
            conjuncts.push(left.call_binary(right, BinaryFunc::Eq));
        }
        if self.one_in(3) {
            conjuncts.push(self.atom(left_arity + right_arity));
        }
        ScalarExpr::and_all(conjuncts)
    }

    fn projection_item(&mut self, arity: usize) -> ScalarExpr {
        match self.choose(8) {
            0 => {
                let column = ScalarExpr::column(self.choose(arity));
                let literal = self.literal();
                column.call_binary(literal, BinaryFunc::Add)
            }
            1 => {
                let func = self.pick(&[
                    AggregateFunc::Count,
                    AggregateFunc::Sum,
                    AggregateFunc::Min,
                    AggregateFunc::Max,
                ]);
                let arg = self.choose(arity);
                let partition_by = (0..arity).filter(|_| self.one_in(2)).collect();
                ScalarExpr::windowed(func, vec![arg], partition_by)
            }
            _ => ScalarExpr::column(self.choose(arity)),
        }
    }

    fn aggregate_call(&mut self, arity: usize, i: usize, allow_distinct: bool) -> AggregateCall {
        let func = self.pick(&[
            AggregateFunc::Count,
            AggregateFunc::Count,
            AggregateFunc::Sum,
            AggregateFunc::Sum0,
            AggregateFunc::Min,
            AggregateFunc::Max,
            AggregateFunc::AnyValue,
        ]);
        let name = format!("a{}", i);
        if func == AggregateFunc::Count && self.one_in(2) {
            return AggregateCall::count_star(name);
        }
        let arg = self.choose(arity);
        let distinct = allow_distinct && self.one_in(6);
        AggregateCall::new(func, vec![arg], name).distinct(distinct)
    }
}
