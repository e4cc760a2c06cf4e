// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Null-rejection analysis.
//!
//! Answers questions of the form "if every column in this set is null, can
//! the expression still be true?". Outer-join strengthening relies on this to
//! prove that a filter above the join discards every null-padded row.

use crate::scalar::func::{UnaryFunc, VariadicFunc};
use crate::{ColumnSet, ScalarExpr};

/// Reports whether `expr` is definitely not true (i.e. false or null) when all
/// of `null_columns` are null.
///
/// A `false` answer means "unknown", not "true".
pub fn is_not_true(expr: &ScalarExpr, null_columns: &ColumnSet) -> bool {
    match expr {
        ScalarExpr::CallUnary {
            func: UnaryFunc::IsNotNull,
            expr,
        } => is_null(expr, null_columns),
        ScalarExpr::CallUnary {
            func: UnaryFunc::IsTrue,
            expr,
        } => is_not_true(expr, null_columns),
        ScalarExpr::CallVariadic {
            func: VariadicFunc::And,
            exprs,
        } => exprs.iter().any(|e| is_not_true(e, null_columns)),
        ScalarExpr::CallVariadic {
            func: VariadicFunc::Or,
            exprs,
        } => exprs.iter().all(|e| is_not_true(e, null_columns)),
        _ => is_null(expr, null_columns),
    }
}

/// Reports whether `expr` definitely evaluates to null when all of
/// `null_columns` are null.
pub fn is_null(expr: &ScalarExpr, null_columns: &ColumnSet) -> bool {
    match expr {
        ScalarExpr::Column(c) => null_columns.contains(*c),
        ScalarExpr::Literal(datum, _) => datum.is_null(),
        ScalarExpr::CallUnary { func, expr } => {
            func.propagates_nulls() && is_null(expr, null_columns)
        }
        // Every binary function is strict in both arguments.
        ScalarExpr::CallBinary { expr1, expr2, .. } => {
            is_null(expr1, null_columns) || is_null(expr2, null_columns)
        }
        // AND(null, false) is false, so only an all-null AND is null. Ditto
        // for OR and COALESCE.
        ScalarExpr::CallVariadic { exprs, .. } => {
            !exprs.is_empty() && exprs.iter().all(|e| is_null(e, null_columns))
        }
        ScalarExpr::If { cond, then, els } => {
            is_null(then, null_columns) && is_null(els, null_columns)
                || (is_not_true(cond, null_columns) && is_null(els, null_columns))
        }
        ScalarExpr::Windowed(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use relopt_repr::{Datum, ScalarType};

    use super::*;
    use crate::BinaryFunc;

    fn right_side() -> ColumnSet {
        ColumnSet::range(2, 4)
    }

    fn eq(l: usize, r: usize) -> ScalarExpr {
        ScalarExpr::column(l).call_binary(ScalarExpr::column(r), BinaryFunc::Eq)
    }

    #[relopt_ore::test]
    fn test_comparisons_reject_nulls() {
        assert!(is_not_true(&eq(0, 2), &right_side()));
        assert!(!is_not_true(&eq(0, 1), &right_side()));
        let lit = ScalarExpr::column(3)
            .call_binary(ScalarExpr::literal(Datum::Int64(1), ScalarType::Int64), BinaryFunc::Gt);
        assert!(is_not_true(&lit, &right_side()));
    }

    #[relopt_ore::test]
    fn test_null_tests() {
        let is_null = ScalarExpr::column(2).call_is_null();
        assert!(!is_not_true(&is_null, &right_side()));
        let is_not_null = ScalarExpr::column(2).call_unary(UnaryFunc::IsNotNull);
        assert!(is_not_true(&is_not_null, &right_side()));
    }

    #[relopt_ore::test]
    fn test_connectives() {
        let and = ScalarExpr::and_all(vec![eq(0, 1), eq(0, 2)]);
        assert!(is_not_true(&and, &right_side()));
        let or = ScalarExpr::or_all(vec![eq(0, 1), eq(0, 2)]);
        assert!(!is_not_true(&or, &right_side()));
        let or_both = ScalarExpr::or_all(vec![eq(0, 3), eq(1, 2)]);
        assert!(is_not_true(&or_both, &right_side()));
    }

    #[relopt_ore::test]
    fn test_coalesce_is_not_strong() {
        let coalesce = ScalarExpr::CallVariadic {
            func: VariadicFunc::Coalesce,
            exprs: vec![
                ScalarExpr::column(2),
                ScalarExpr::literal(Datum::Int64(0), ScalarType::Int64),
            ],
        }
        .call_binary(ScalarExpr::literal(Datum::Int64(0), ScalarType::Int64), BinaryFunc::Eq);
        assert!(!is_not_true(&coalesce, &right_side()));
    }
}
