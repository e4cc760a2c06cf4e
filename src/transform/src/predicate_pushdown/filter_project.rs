// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use relopt_expr::{NodeType, RelKind};

use crate::{Operand, Rule, RuleCall, TransformError};

/// Pushes a filter below a projection by substituting the projection's
/// expressions into the predicate.
///
/// Projections that compute windowed aggregates are left alone: filtering
/// their input would change the partitions the aggregates see.
#[derive(Debug)]
pub struct FilterProjectTranspose;

impl Rule for FilterProjectTranspose {
    fn name(&self) -> &'static str {
        "FilterProjectTranspose"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Filter).with_inputs(vec![Operand::of(NodeType::Project)])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let (RelKind::Filter { predicate, .. }, RelKind::Project { input, exprs }) =
            (call.rel(0).kind(), call.rel(1).kind())
        else {
            return Ok(());
        };
        if exprs.iter().any(|e| e.contains_windowed()) {
            call.decline("projection computes windowed aggregates");
            return Ok(());
        }
        let pushed = predicate.substitute(exprs)?;
        let names = call.rel(1).desc().iter_names().cloned().collect();

        let mut b = call.builder();
        b.push(input.clone())
            .filter([pushed])?
            .project_named(exprs.clone(), names)?;
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}

#[cfg(test)]
mod tests {
    use relopt_expr::{BinaryFunc, RelBuilder, RelExpr, ScalarExpr};
    use relopt_expr_test_util::emp_dept;
    use relopt_repr::{Datum, ScalarType};

    use super::*;
    use crate::tests::fire;

    fn int(i: i64) -> ScalarExpr {
        ScalarExpr::literal(Datum::Int64(i), ScalarType::Int64)
    }

    #[relopt_ore::test]
    fn test_substitutes_computed_columns() {
        let catalog = emp_dept();
        // Filter (#1 > 150) over Project (#0, #3 + 1).
        let mut b = RelBuilder::new();
        b.push(catalog.get("emp").unwrap())
            .project(vec![
                ScalarExpr::column(0),
                ScalarExpr::column(3).call_binary(int(1), BinaryFunc::Add),
            ])
            .unwrap()
            .filter([ScalarExpr::column(1).call_binary(int(150), BinaryFunc::Gt)])
            .unwrap();
        let original = b.build().unwrap();

        let results = fire(&FilterProjectTranspose, &original);
        assert_eq!(results.len(), 1);
        let RelKind::Project { input, .. } = results[0].kind() else {
            panic!("expected a projection, got\n{}", results[0]);
        };
        let RelKind::Filter { predicate, .. } = input.kind() else {
            panic!("expected a filter below the projection");
        };
        assert_eq!(predicate.to_string(), "((#3 + 1) > 150)");
        catalog.check_equivalent(&original, &results[0]).unwrap();
    }

    #[relopt_ore::test]
    fn test_declines_over_windowed_aggregates() {
        let catalog = emp_dept();
        let project = RelExpr::project(
            catalog.get("emp").unwrap(),
            vec![
                ScalarExpr::column(0),
                ScalarExpr::windowed(relopt_expr::AggregateFunc::Count, vec![0], vec![2]),
            ],
            vec!["emp_id".into(), "peers".into()],
        )
        .unwrap();
        let filter = RelExpr::filter(
            project,
            ScalarExpr::column(1).call_binary(int(1), BinaryFunc::Gt),
        )
        .unwrap();
        assert!(fire(&FilterProjectTranspose, &filter).is_empty());
    }
}
