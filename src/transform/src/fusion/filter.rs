// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fuses stacked filters.

use relopt_expr::{NodeType, RelKind};

use crate::{Operand, Rule, RuleCall, TransformError};

/// Replaces a filter over a filter by one filter on the conjunction of their
/// predicates.
#[derive(Debug)]
pub struct FilterMerge;

impl Rule for FilterMerge {
    fn name(&self) -> &'static str {
        "FilterMerge"
    }

    fn operand(&self) -> Operand {
        Operand::of(NodeType::Filter).with_inputs(vec![Operand::of(NodeType::Filter)])
    }

    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError> {
        let (RelKind::Filter { predicate: outer, .. }, RelKind::Filter { input, predicate: inner }) =
            (call.rel(0).kind(), call.rel(1).kind())
        else {
            return Ok(());
        };
        let mut b = call.builder();
        b.push(input.clone())
            .filter(inner.conjuncts().into_iter().chain(outer.conjuncts()))?;
        let replacement = b.build()?;
        call.transform_to(replacement)
    }
}
