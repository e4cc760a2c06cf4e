// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use relopt_expr::{ColumnSet, Mapping, NodeType, RelKind, ScalarExpr};

use crate::{Operand, Rule, RuleCall, TransformError};

/// Prunes the inputs of a join to the columns read by the projection above
/// it and by the join condition.
///
/// Each input gets a projection of its referenced columns, and the condition
/// and the top projection are renumbered to the narrower join. An input none
/// of whose columns are read keeps its first column.
#[derive(Debug)]
pub struct ProjectJoinTranspose;

impl Rule for ProjectJoinTranspose {
    fn name(&self) -> &'static str {
        "ProjectJoinTranspose"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Project).with_inputs(vec![Operand::of(NodeType::Join)])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let (
            RelKind::Project { exprs, .. },
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
        if !kind.projects_right() {
            call.decline("join does not output its right input");
            return Ok(());
        }
        // Windowed aggregates read their partitions from the join output.
        if exprs.iter().any(|e| e.contains_windowed()) {
            call.decline("projection computes windowed aggregates");
            return Ok(());
        }

        let (left_arity, right_arity) = (left.arity(), right.arity());
        let mut refs = condition.support();
        for expr in exprs {
            refs.extend(expr.support().iter());
        }
        let mut left_refs = refs.intersection(&ColumnSet::range(0, left_arity));
        let mut right_refs = refs
            .intersection(&ColumnSet::range(left_arity, left_arity + right_arity))
            .shift_down(left_arity);
        for (side, arity) in [(&mut left_refs, left_arity), (&mut right_refs, right_arity)] {
            if side.is_empty() && arity > 0 {
                side.insert(0);
            }
        }
        if left_refs.len() == left_arity && right_refs.len() == right_arity {
            call.decline("every column is referenced");
            return Ok(());
        }

        let mut kept = left_refs.clone();
        kept.extend(right_refs.shift_up(left_arity).iter());
        let mapping = Mapping::from_kept(&kept, left_arity + right_arity);
        let condition = condition.remap(&mapping)?;
        let exprs = exprs
            .iter()
            .map(|e| e.remap(&mapping))
            .collect::<Result<Vec<ScalarExpr>, _>>()?;
        let names = call.rel(0).desc().iter_names().cloned().collect();

        let mut b = call.builder();
        b.push(left.clone())
            .project(ScalarExpr::columns(&left_refs.to_vec()))?
            .push(right.clone())
            .project(ScalarExpr::columns(&right_refs.to_vec()))?
            .join_correlated(*kind, condition, correlation_ids.clone())?
            .project_named(exprs, names)?;
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}
