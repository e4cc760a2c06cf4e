// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Rules that replace operators over provably empty inputs.

use relopt_expr::{
    JoinInfo, JoinKind, NodeType, RelBuilder, RelExpr, RelKind, ScalarExpr, SetOpKind,
};
use relopt_repr::RelationDesc;

use crate::{Operand, Rule, RuleCall, TransformError};

/// Reports whether `expr` has no rows no matter what its sources contain.
///
/// That is the case for a literal collection without rows, and for a set of
/// alternatives any of which is provably empty.
pub fn is_provably_empty(expr: &RelExpr) -> bool {
    match expr.kind() {
        RelKind::Values { rows } => rows.is_empty(),
        RelKind::Subset { alternatives } => alternatives.iter().any(is_provably_empty),
        _ => false,
    }
}

fn empty() -> Operand {
    Operand::any().with_predicate(is_provably_empty)
}

/// Every rule in this module.
pub fn empty_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(UnionEmpty),
        Box::new(MinusEmpty),
        Box::new(IntersectEmpty),
        Box::new(PRUNE_EMPTY_PROJECT),
        Box::new(PRUNE_EMPTY_FILTER),
        Box::new(PRUNE_EMPTY_SORT),
        Box::new(PRUNE_EMPTY_AGGREGATE),
        Box::new(SortFetchZero),
        Box::new(JoinLeftEmpty),
        Box::new(JoinRightEmpty),
    ]
}

/// Restores the column names of `desc` on top of the builder's stack.
fn rename(b: &mut RelBuilder, desc: &RelationDesc) -> Result<(), TransformError> {
    let exprs = ScalarExpr::columns(&(0..desc.arity()).collect::<Vec<_>>());
    b.project_named(exprs, desc.iter_names().cloned().collect())?;
    Ok(())
}

/// Removes empty inputs from a union.
#[derive(Debug)]
pub struct UnionEmpty;

impl Rule for UnionEmpty {
    fn name(&self) -> &'static str {
        "UnionEmpty"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::SetOp)
            .with_predicate(|e| {
                matches!(
                    e.kind(),
                    RelKind::SetOp {
                        kind: SetOpKind::Union,
                        ..
                    }
                )
            })
            .with_some_input(empty())
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let union = call.rel(0);
        let RelKind::SetOp { all, inputs, .. } = union.kind() else {
            return Ok(());
        };
        let remaining: Vec<RelExpr> = inputs
            .iter()
            .filter(|i| !is_provably_empty(i))
            .cloned()
            .collect();
        let mut b = call.builder();
        match remaining.len() {
            0 => {
                b.empty_of(union.desc().clone());
            }
            1 => {
                b.push(remaining[0].clone());
                if !all {
                    b.distinct()?;
                }
            }
            n => {
                for input in remaining {
                    b.push(input);
                }
                b.union(*all, n)?;
            }
        }
        rename(&mut b, union.desc())?;
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}

/// Empties a difference whose first input is empty, and removes the empty
/// inputs it subtracts.
#[derive(Debug)]
pub struct MinusEmpty;

impl Rule for MinusEmpty {
    fn name(&self) -> &'static str {
        "MinusEmpty"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::SetOp)
            .with_predicate(|e| {
                matches!(
                    e.kind(),
                    RelKind::SetOp {
                        kind: SetOpKind::Minus,
                        ..
                    }
                )
            })
            .with_some_input(empty())
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let minus = call.rel(0);
        let RelKind::SetOp { all, inputs, .. } = minus.kind() else {
            return Ok(());
        };
        let mut b = call.builder();
        let Some((first, rest)) = inputs.split_first() else {
            return Ok(());
        };
        if is_provably_empty(first) {
            b.empty_of(minus.desc().clone());
        } else {
            let rest: Vec<RelExpr> = rest
                .iter()
                .filter(|i| !is_provably_empty(i))
                .cloned()
                .collect();
            b.push(first.clone());
            if rest.is_empty() {
                if !all {
                    b.distinct()?;
                }
            } else {
                let n = rest.len() + 1;
                for input in rest {
                    b.push(input);
                }
                b.minus(*all, n)?;
            }
        }
        rename(&mut b, minus.desc())?;
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}

/// Empties an intersection with an empty input.
#[derive(Debug)]
pub struct IntersectEmpty;

impl Rule for IntersectEmpty {
    fn name(&self) -> &'static str {
        "IntersectEmpty"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::SetOp)
            .with_predicate(|e| {
                matches!(
                    e.kind(),
                    RelKind::SetOp {
                        kind: SetOpKind::Intersect,
                        ..
                    }
                )
            })
            .with_some_input(empty())
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let replacement = RelExpr::empty(call.rel(0).desc().clone());
        call.transform_to(replacement)
    }
}

/// Empties a single-input operator over an empty input.
#[derive(Debug)]
pub struct PruneEmptySingle {
    name: &'static str,
    node_type: NodeType,
}

pub const PRUNE_EMPTY_PROJECT: PruneEmptySingle = PruneEmptySingle {
    name: "PruneEmptyProject",
    node_type: NodeType::Project,
};

pub const PRUNE_EMPTY_FILTER: PruneEmptySingle = PruneEmptySingle {
    name: "PruneEmptyFilter",
    node_type: NodeType::Filter,
};

pub const PRUNE_EMPTY_SORT: PruneEmptySingle = PruneEmptySingle {
    name: "PruneEmptySort",
    node_type: NodeType::Sort,
};

/// Only applies to aggregates without an empty grouping set, which would
/// produce a row even for no input.
pub const PRUNE_EMPTY_AGGREGATE: PruneEmptySingle = PruneEmptySingle {
    name: "PruneEmptyAggregate",
    node_type: NodeType::Aggregate,
};

impl Rule for PruneEmptySingle {
    fn name(&self) -> &'static str {
        self.name
    }

    fn operand(&self) -> Operand {
        Operand::of(self.node_type).with_inputs(vec![empty()])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        if let RelKind::Aggregate {
            group_set,
            grouping_sets,
            ..
        } = call.rel(0).kind()
        {
            let empty_group = match grouping_sets {
                Some(sets) => sets.iter().any(|s| s.is_empty()),
                None => group_set.is_empty(),
            };
            if empty_group {
                call.decline("aggregate has an empty grouping set");
                return Ok(());
            }
        }
        let replacement = RelExpr::empty(call.rel(0).desc().clone());
        call.transform_to(replacement)
    }
}

/// Empties a sort that fetches no rows.
#[derive(Debug)]
pub struct SortFetchZero;

impl Rule for SortFetchZero {
    fn name(&self) -> &'static str {
        "SortFetchZero"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Sort)
            .with_predicate(|e| matches!(e.kind(), RelKind::Sort { fetch: Some(0), .. }))
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let replacement = RelExpr::empty(call.rel(0).desc().clone());
        call.transform_to(replacement)
    }
}

/// Empties a join whose left input is empty, unless the join pads
/// unmatched right rows.
#[derive(Debug)]
pub struct JoinLeftEmpty;

impl Rule for JoinLeftEmpty {
    fn name(&self) -> &'static str {
        "JoinLeftEmpty"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Join).with_inputs(vec![empty(), Operand::any()])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let RelKind::Join { kind, .. } = call.rel(0).kind() else {
            return Ok(());
        };
        if kind.generates_nulls_on_left() {
            call.decline("join pads unmatched right rows");
            return Ok(());
        }
        let replacement = RelExpr::empty(call.rel(0).desc().clone());
        call.transform_to(replacement)
    }
}

/// Empties a join whose right input is empty, unless the join pads
/// unmatched left rows. An anti equi-join with an empty right input is its
/// left input.
#[derive(Debug)]
pub struct JoinRightEmpty;

impl Rule for JoinRightEmpty {
    fn name(&self) -> &'static str {
        "JoinRightEmpty"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Join).with_inputs(vec![Operand::any(), empty()])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let RelKind::Join {
            left,
            condition,
            kind,
            ..
        } = call.rel(0).kind()
        else {
            return Ok(());
        };
        if kind.generates_nulls_on_right() {
            call.decline("join pads unmatched left rows");
            return Ok(());
        }
        let replacement = if *kind == JoinKind::Anti {
            if !JoinInfo::of(condition, left.arity()).is_equi() {
                call.decline("anti join condition is not an equi-join");
                return Ok(());
            }
            left.clone()
        } else {
            RelExpr::empty(call.rel(0).desc().clone())
        };
        call.transform_to(replacement)
    }
}
