// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fundamental data representation.
//!
//! This module contains the types for representing data in the optimizer.
//! The core types are [`Datum`], which represents a single value, [`Row`],
//! which bundles several datums, and [`RelationDesc`], which names and types
//! the columns of a relation.

#![warn(missing_debug_implementations)]

mod global_id;
mod relation;
mod row;
mod scalar;

pub use crate::global_id::GlobalId;
pub use crate::relation::{ColumnName, ColumnType, RelationDesc, RelationType};
pub use crate::row::Row;
pub use crate::scalar::{Datum, ScalarType};
