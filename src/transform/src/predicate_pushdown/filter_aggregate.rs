// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use relopt_expr::{ColumnSet, NodeType, RelKind};

use crate::{Operand, Rule, RuleCall, TransformError};

/// Pushes the conjuncts of a filter that only read grouping columns below the
/// aggregate.
///
/// Such a conjunct keeps or drops whole groups, so it may as well drop their
/// rows before they are aggregated. With grouping sets, a conjunct moves only
/// if every grouping set contains the columns it reads. Conjuncts without
/// column references stay above an aggregate with an empty grouping set, which
/// produces a row even for no input.
#[derive(Debug)]
pub struct FilterAggregateTranspose;

impl Rule for FilterAggregateTranspose {
    fn name(&self) -> &'static str {
        "FilterAggregateTranspose"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Filter).with_inputs(vec![Operand::of(NodeType::Aggregate)])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let (
            RelKind::Filter { predicate, .. },
            RelKind::Aggregate {
                input,
                group_set,
                grouping_sets,
                aggregates,
            },
        ) = (call.rel(0).kind(), call.rel(1).kind())
        else {
            return Ok(());
        };
        let group_columns = group_set.to_vec();
        let sets = grouping_sets
            .clone()
            .unwrap_or_else(|| vec![group_set.clone()]);
        let has_empty_set = sets.iter().any(ColumnSet::is_empty);
        let group_output = ColumnSet::range(0, group_columns.len());

        let mut pushed = Vec::new();
        let mut remaining = Vec::new();
        for conjunct in predicate.conjuncts() {
            let support = conjunct.support();
            if !support.is_subset(&group_output) {
                remaining.push(conjunct);
                continue;
            }
            let mut below = conjunct.clone();
            below.permute(&group_columns)?;
            let read = below.support();
            let pushable = if read.is_empty() {
                !has_empty_set
            } else {
                sets.iter().all(|set| read.is_subset(set))
            };
            if pushable {
                pushed.push(below);
            } else {
                remaining.push(conjunct);
            }
        }
        if pushed.is_empty() {
            call.decline("no conjunct reads only grouping columns");
            return Ok(());
        }

        let mut b = call.builder();
        b.push(input.clone())
            .filter(pushed)?
            .aggregate(group_set.clone(), grouping_sets.clone(), aggregates.clone())?
            .filter(remaining)?;
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}
