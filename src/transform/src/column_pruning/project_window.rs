// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use relopt_expr::{ColumnSet, Mapping, NodeType, RelExpr, RelKind, ScalarExpr, WindowGroup};

use crate::{Operand, Rule, RuleCall, TransformError};

/// Prunes the input of a window to the columns read by its groups and by the
/// projection above it.
#[derive(Debug)]
pub struct ProjectWindowTranspose;

impl Rule for ProjectWindowTranspose {
    fn name(&self) -> &'static str {
        "ProjectWindowTranspose"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Project).with_inputs(vec![Operand::of(NodeType::Window)])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let (RelKind::Project { exprs, .. }, RelKind::Window { input, groups }) =
            (call.rel(0).kind(), call.rel(1).kind())
        else {
            return Ok(());
        };
        let input_arity = input.arity();
        let window_arity = call.rel(1).arity();

        let mut below = ColumnSet::new();
        for expr in exprs {
            below.extend(expr.support().iter().filter(|c| *c < input_arity));
        }
        for group in groups {
            below.extend(group.support().iter());
        }
        if below.is_empty() && input_arity > 0 {
            below.insert(0);
        }
        if below.len() == input_arity {
            call.decline("every input column is referenced");
            return Ok(());
        }

        let below_mapping = Mapping::from_kept(&below, input_arity);
        let groups = groups
            .iter()
            .map(|g| g.remap(&below_mapping))
            .collect::<Result<Vec<WindowGroup>, _>>()?;
        // Window outputs follow the input columns and keep their order.
        let mut kept = below.clone();
        kept.extend(input_arity..window_arity);
        let mapping = Mapping::from_kept(&kept, window_arity);
        let exprs = exprs
            .iter()
            .map(|e| e.remap(&mapping))
            .collect::<Result<Vec<ScalarExpr>, _>>()?;
        let names = call.rel(0).desc().iter_names().cloned().collect();

        let mut b = call.builder();
        b.push(input.clone())
            .project(ScalarExpr::columns(&below.to_vec()))?;
        let window = RelExpr::window(b.build()?, groups)?;
        b.push(window).project_named(exprs, names)?;
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}
