// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use relopt_repr::{ColumnType, ScalarType};

/// An invariant violation detected while constructing a plan node.
///
/// Every [`RelExpr`](crate::RelExpr) constructor validates its payload against
/// its inputs and reports problems as a `PlanError`. Seeing one of these out of
/// a rewrite means the rewrite is wrong, not that the query is.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// A scalar expression references a column its input does not have.
    #[error("column #{column} out of range for input of arity {arity}")]
    ColumnOutOfRange {
        /// The offending column reference.
        column: usize,
        /// The arity of the input.
        arity: usize,
    },
    /// A column reference could not be carried through an index mapping.
    #[error("column #{0} has no image under mapping")]
    UnmappedColumn(usize),
    /// A predicate did not have boolean type.
    #[error("predicate must be boolean, found {0}")]
    NonBooleanPredicate(ColumnType),
    /// Two types that must agree do not.
    #[error("incompatible types in {context}: {left} vs {right}")]
    IncompatibleTypes {
        /// Where the mismatch was found.
        context: &'static str,
        /// The first type.
        left: ScalarType,
        /// The second type.
        right: ScalarType,
    },
    /// A scalar function was applied to an argument of the wrong type.
    #[error("function {func} cannot be applied to {arg}")]
    InvalidArgument {
        /// The name of the function.
        func: String,
        /// The argument type.
        arg: ScalarType,
    },
    /// Inputs that must have the same number of columns do not.
    #[error("arity mismatch in {context}: expected {expected}, found {actual}")]
    ArityMismatch {
        /// Where the mismatch was found.
        context: &'static str,
        /// The expected arity.
        expected: usize,
        /// The actual arity.
        actual: usize,
    },
    /// An aggregate call is malformed.
    #[error("invalid aggregate: {0}")]
    InvalidAggregate(String),
    /// A literal row does not match the declared schema.
    #[error("invalid literal row: {0}")]
    InvalidRow(String),
    /// The builder was asked to operate on more relations than it holds.
    #[error("builder stack has {available} relations, {requested} requested")]
    BuilderUnderflow {
        /// Relations on the stack.
        available: usize,
        /// Relations required by the operation.
        requested: usize,
    },
    /// Any other malformed node.
    #[error("{0}")]
    Invalid(String),
}
