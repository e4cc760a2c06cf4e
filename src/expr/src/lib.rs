// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Core expression language.
//!
//! Relational plans are trees of immutable [`RelExpr`] nodes whose scalar
//! payloads are [`ScalarExpr`] trees over the node's input columns. Nodes are
//! reference counted and shared freely between candidate plans; rewrites
//! always build new nodes.

#![warn(missing_debug_implementations)]

mod column_set;
mod error;
mod explain;
mod mapping;
mod relation;
mod scalar;

pub use column_set::ColumnSet;
pub use error::PlanError;
pub use mapping::Mapping;
pub use relation::aggregate::{AggregateCall, AggregateFunc, Splitter};
pub use relation::builder::RelBuilder;
pub use relation::join::{equi_columns, JoinInfo, JoinKind};
pub use relation::window::WindowGroup;
pub use relation::{
    ColumnOrder, CorrelationId, NodeType, RelExpr, RelKind, SetOpKind, TraitSet,
};
pub use scalar::func::{BinaryFunc, UnaryFunc, VariadicFunc};
pub use scalar::strong;
pub use scalar::{ScalarExpr, WindowedExpr};
