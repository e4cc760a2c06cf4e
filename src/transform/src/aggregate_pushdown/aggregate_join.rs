// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeMap;

use relopt_expr::{
    AggregateCall, ColumnSet, JoinInfo, JoinKind, Mapping, NodeType, RelExpr, RelKind, ScalarExpr,
    Splitter,
};
use tracing::debug;

use crate::statistics::column_equality;
use crate::{dyncfgs, Operand, Rule, RuleCall, TransformError};

/// Pushes an aggregate below an equi-join.
///
/// Each input of the join is either aggregated on the columns the join and
/// the group key need from it, or, if it is already unique on those columns,
/// merely projected. The aggregate above the rebuilt join combines the
/// per-input subtotals.
///
/// Joins other than inner joins are only rewritten for aggregates without
/// calls, where the rewrite amounts to eliminating duplicates early.
#[derive(Debug)]
pub struct AggregateJoinTranspose;

/// One input of the join after the rewrite.
#[derive(Debug)]
struct Side {
    input: RelExpr,
    /// For each aggregate call with a subtotal on this side, the column of
    /// `input` holding it.
    subtotals: BTreeMap<usize, usize>,
}

/// Extends `group_set` with the columns the join's predicates equate to its
/// members.
fn key_columns(group_set: &ColumnSet, predicates: &[ScalarExpr]) -> ColumnSet {
    let mut keys = group_set.clone();
    for (a, b) in predicates.iter().filter_map(column_equality) {
        if group_set.contains(a) {
            keys.insert(b);
        }
        if group_set.contains(b) {
            keys.insert(a);
        }
    }
    keys
}

/// Returns the position of `expr` in `exprs`, appending it if absent.
fn register(exprs: &mut Vec<ScalarExpr>, expr: ScalarExpr) -> usize {
    match exprs.iter().position(|e| *e == expr) {
        Some(i) => i,
        None => {
            exprs.push(expr);
            exprs.len() - 1
        }
    }
}

impl Rule for AggregateJoinTranspose {
    fn name(&self) -> &'static str {
        "AggregateJoinTranspose"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Aggregate).with_inputs(vec![Operand::of(NodeType::Join)])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let (
            RelKind::Aggregate {
                group_set,
                grouping_sets,
                aggregates,
                ..
            },
            RelKind::Join {
                left,
                right,
                condition,
                kind,
                correlation_ids,
            },
        ) = (call.rel(0).kind(), call.rel(1).kind())
        else {
            return Ok(());
        };
        if grouping_sets.is_some() {
            call.decline("aggregate has grouping sets");
            return Ok(());
        }
        if !kind.projects_right() {
            call.decline("join does not output its right input");
            return Ok(());
        }
        if *kind != JoinKind::Inner && !aggregates.is_empty() {
            call.decline("aggregate calls over an outer join");
            return Ok(());
        }
        if !correlation_ids.is_empty() {
            call.decline("join is correlated");
            return Ok(());
        }
        let mut splitters: Vec<&'static dyn Splitter> = Vec::with_capacity(aggregates.len());
        for aggregate in aggregates {
            if aggregate.distinct {
                call.decline("distinct aggregate");
                return Ok(());
            }
            match aggregate.func.splitter() {
                Some(splitter) => splitters.push(splitter),
                None => {
                    call.decline("aggregate cannot be split");
                    return Ok(());
                }
            }
        }
        let left_arity = left.arity();
        let arity = left_arity + right.arity();
        if !JoinInfo::of(condition, left_arity).is_equi() {
            call.decline("join condition is not an equi-join");
            return Ok(());
        }

        let join_columns = condition.support();
        let keys = key_columns(group_set, &call.stats().pulled_up_predicates(call.rel(1)));
        let all_columns_in_aggregate = join_columns.is_subset(&keys);
        let below_columns = group_set.union(&join_columns);

        // Where each column the join condition or group key reads ends up.
        let mut targets = Vec::new();
        let mut sides = Vec::with_capacity(2);
        let mut unique_count = 0;
        let mut below_offset = 0;
        for (offset, input) in [(0, left), (left_arity, right)] {
            let fields = ColumnSet::range(offset, offset + input.arity());
            let below_unshifted = below_columns.intersection(&fields);
            for (i, c) in below_unshifted.iter().enumerate() {
                targets.push((c, below_offset + i));
            }
            let key = below_unshifted.shift_down(offset);
            let side_mapping = Mapping::identity(input.arity()).offset_source(offset, arity);
            let mut subtotals = BTreeMap::new();
            let mut b = call.builder();
            if call.ctx().is_unique(input, &key) {
                unique_count += 1;
                let mut projects = ScalarExpr::columns(&key.to_vec());
                for (i, (aggregate, splitter)) in aggregates.iter().zip(&splitters).enumerate() {
                    if aggregate.args.is_empty()
                        || !aggregate.args.iter().all(|a| fields.contains(*a))
                    {
                        continue;
                    }
                    let singleton = splitter
                        .singleton(&input.typ().column_types, &aggregate.remap(&side_mapping)?)?;
                    let position = match singleton.as_column().and_then(|c| key.index_of(c)) {
                        Some(position) => position,
                        None => register(&mut projects, singleton),
                    };
                    subtotals.insert(i, position);
                }
                b.push(input.clone()).project(projects)?;
            } else {
                if key.is_empty() {
                    call.decline("input would be aggregated without a group key");
                    return Ok(());
                }
                let mut calls: Vec<AggregateCall> = Vec::new();
                for (i, (aggregate, splitter)) in aggregates.iter().zip(&splitters).enumerate() {
                    let below = if aggregate.args.iter().all(|a| fields.contains(*a)) {
                        Some(splitter.split(aggregate, &side_mapping)?)
                    } else {
                        splitter.other(aggregate)
                    };
                    let Some(below) = below else {
                        continue;
                    };
                    let position = calls
                        .iter()
                        .position(|c| {
                            c.func == below.func && c.args == below.args && c.distinct == below.distinct
                        })
                        .unwrap_or_else(|| {
                            calls.push(below);
                            calls.len() - 1
                        });
                    subtotals.insert(i, key.len() + position);
                }
                b.push(input.clone()).aggregate(key, None, calls)?;
            }
            let input = b.build()?;
            below_offset += input.arity();
            sides.push(Side { input, subtotals });
        }
        if unique_count == 2 {
            call.decline("both inputs are already unique");
            return Ok(());
        }

        let mut mapping = Mapping::new(arity, below_offset);
        for (source, target) in targets {
            mapping.set(source, target);
        }
        let condition = condition.remap(&mapping)?;
        let [left_side, right_side]: [Side; 2] = sides
            .try_into()
            .map_err(|_| TransformError::Internal("expected two join inputs".into()))?;
        let left_width = left_side.input.arity();

        let mut b = call.builder();
        b.push(left_side.input)
            .push(right_side.input)
            .join(*kind, condition)?;
        let joined_arity = b.peek()?.arity();
        let mut projects = ScalarExpr::columns(&(0..joined_arity).collect::<Vec<_>>());
        let mut top_calls = Vec::with_capacity(aggregates.len());
        for (i, (aggregate, splitter)) in aggregates.iter().zip(&splitters).enumerate() {
            let left_subtotal = left_side.subtotals.get(&i).copied();
            let right_subtotal = right_side.subtotals.get(&i).map(|c| c + left_width);
            top_calls.push(splitter.top_split(
                &mut projects,
                aggregate,
                left_subtotal,
                right_subtotal,
            )?);
        }
        b.project(projects)?;
        let top_group_set = mapping.apply_set(group_set)?;

        if all_columns_in_aggregate
            && *kind != JoinKind::Full
            && dyncfgs::OPTIMIZER_AGGREGATE_JOIN_ELIDE_TOP_AGGREGATE.get(call.config())
        {
            // Each group is a single row of the join, so every recombined
            // call reduces to its value on that row.
            let input_types = b.peek()?.typ().column_types.clone();
            let mut exprs = ScalarExpr::columns(&top_group_set.to_vec());
            for top_call in &top_calls {
                match top_call.func.splitter() {
                    Some(splitter) => exprs.push(splitter.singleton(&input_types, top_call)?),
                    None => {
                        return Err(TransformError::Internal(format!(
                            "top aggregate {} cannot be split",
                            top_call
                        )))
                    }
                }
            }
            debug!(rule = self.name(), "eliding top aggregate");
            let names = call.rel(0).desc().iter_names().cloned().collect();
            b.project_named(exprs, names)?;
        } else {
            b.aggregate(top_group_set, None, top_calls)?;
        }
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}
