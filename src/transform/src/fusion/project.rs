// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fuses stacked projections and removes trivial ones.

use relopt_expr::{NodeType, RelExpr, RelKind, ScalarExpr};
use relopt_ore::collections::IndexSliceExt;

use crate::{Operand, Rule, RuleCall, TransformError};

/// Composes a projection over a projection into a single projection.
#[derive(Debug)]
pub struct ProjectMerge;

impl Rule for ProjectMerge {
    fn name(&self) -> &'static str {
        "ProjectMerge"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Project).with_inputs(vec![Operand::of(NodeType::Project)])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let (RelKind::Project { exprs: outer, .. }, RelKind::Project { input, exprs: inner }) =
            (call.rel(0).kind(), call.rel(1).kind())
        else {
            return Ok(());
        };
        let mut exprs = Vec::with_capacity(outer.len());
        for expr in outer {
            match expr.substitute(inner) {
                Ok(expr) => exprs.push(expr),
                Err(err) => {
                    call.decline(&format!("cannot compose projections: {}", err));
                    return Ok(());
                }
            }
        }
        let names = call.rel(0).desc().iter_names().cloned().collect();
        let mut b = call.builder();
        b.push(input.clone()).project_named(exprs, names)?;
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}

/// Replaces a projection that passes its input through unchanged by its
/// input.
#[derive(Debug)]
pub struct ProjectRemove;

impl ProjectRemove {
    fn is_trivial(expr: &RelExpr) -> bool {
        let RelKind::Project { input, exprs } = expr.kind() else {
            return false;
        };
        exprs.len() == input.arity()
            && is_identity(exprs)
            && expr.desc().iter_names().eq(input.desc().iter_names())
    }
}

impl Rule for ProjectRemove {
    fn name(&self) -> &'static str {
        "ProjectRemove"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Project).with_predicate(ProjectRemove::is_trivial)
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let RelKind::Project { input, .. } = call.rel(0).kind() else {
            return Ok(());
        };
        let replacement = input.clone();
        call.transform_to(replacement)
    }
}

/// Whether `exprs` passes columns `0..exprs.len()` through in order.
fn is_identity(exprs: &[ScalarExpr]) -> bool {
    exprs
        .iter()
        .map(ScalarExpr::as_column)
        .collect::<Option<Vec<_>>>()
        .is_some_and(|columns| columns.is_identity())
}
