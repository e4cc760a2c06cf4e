// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use relopt_expr::{NodeType, RelExpr, RelKind};

use crate::{Operand, Rule, RuleCall, TransformError};

/// Copies a filter onto every input of a set operation.
///
/// The inputs of a set operation share the column numbering of its output,
/// so the predicate applies to each of them unchanged.
#[derive(Debug)]
pub struct FilterSetOpTranspose;

impl Rule for FilterSetOpTranspose {
    fn name(&self) -> &'static str {
        "FilterSetOpTranspose"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Filter).with_inputs(vec![Operand::of(NodeType::SetOp)])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let (RelKind::Filter { predicate, .. }, RelKind::SetOp { kind, all, inputs }) =
            (call.rel(0).kind(), call.rel(1).kind())
        else {
            return Ok(());
        };
        let inputs = inputs
            .iter()
            .map(|input| {
                let mut b = call.builder();
                b.push(input.clone()).filter([predicate.clone()])?;
                b.build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let replacement = RelExpr::set_op(*kind, *all, inputs)?;
        call.transform_to(replacement)
    }
}

#[cfg(test)]
mod tests {
    use relopt_expr::{BinaryFunc, RelBuilder, ScalarExpr, SetOpKind};
    use relopt_expr_test_util::emp_dept;
    use relopt_repr::{Datum, ScalarType};

    use super::*;
    use crate::tests::fire;

    #[relopt_ore::test]
    fn test_filter_is_copied_to_each_input() {
        let catalog = emp_dept();
        let mut b = RelBuilder::new();
        b.push(catalog.get("emp").unwrap())
            .project(ScalarExpr::columns(&[2]))
            .unwrap();
        let all_depts = b.build().unwrap();
        b.push(catalog.get("emp").unwrap())
            .filter([ScalarExpr::column(3).call_is_null()])
            .unwrap()
            .project(ScalarExpr::columns(&[2]))
            .unwrap();
        let unpaid_depts = b.build().unwrap();
        let ten = ScalarExpr::literal(Datum::Int64(10), ScalarType::Int64);
        let predicate = ScalarExpr::column(0).call_binary(ten, BinaryFunc::Eq);

        for kind in [SetOpKind::Union, SetOpKind::Intersect, SetOpKind::Minus] {
            let set_op =
                RelExpr::set_op(kind, false, vec![all_depts.clone(), unpaid_depts.clone()])
                    .unwrap();
            let original = RelExpr::filter(set_op, predicate.clone()).unwrap();

            let results = fire(&FilterSetOpTranspose, &original);
            assert_eq!(results.len(), 1);
            let RelKind::SetOp { inputs, .. } = results[0].kind() else {
                panic!("expected a set operation, got\n{}", results[0]);
            };
            assert!(inputs
                .iter()
                .all(|input| matches!(input.kind(), RelKind::Filter { .. })));
            catalog.check_equivalent(&original, &results[0]).unwrap();
        }
    }
}
