// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use ordered_float::OrderedFloat;
use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

use crate::ColumnType;

/// A literal value.
///
/// Datums order `Null` first, then booleans, then the numeric and string
/// variants. The ordering is total so that rows can be sorted for multiset
/// comparison.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    /// An unknown value.
    Null,
    /// The `false` boolean value.
    False,
    /// The `true` boolean value.
    True,
    /// A 64-bit signed integer.
    Int64(i64),
    /// A 64-bit floating point number.
    Float64(OrderedFloat<f64>),
    /// A sequence of Unicode codepoints encoded as UTF-8.
    String(String),
}

impl Datum {
    /// Reports whether this datum is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Unwraps the boolean value within this datum.
    ///
    /// # Panics
    ///
    /// Panics if the datum is not [`Datum::False`] or [`Datum::True`].
    pub fn unwrap_bool(&self) -> bool {
        match self {
            Datum::False => false,
            Datum::True => true,
            _ => panic!("Datum::unwrap_bool called on {:?}", self),
        }
    }

    /// Unwraps the 64-bit integer value within this datum.
    ///
    /// # Panics
    ///
    /// Panics if the datum is not [`Datum::Int64`].
    pub fn unwrap_int64(&self) -> i64 {
        match self {
            Datum::Int64(i) => *i,
            _ => panic!("Datum::unwrap_int64 called on {:?}", self),
        }
    }

    /// Unwraps the 64-bit float value within this datum.
    ///
    /// # Panics
    ///
    /// Panics if the datum is not [`Datum::Float64`].
    pub fn unwrap_float64(&self) -> f64 {
        match self {
            Datum::Float64(f) => f.into_inner(),
            _ => panic!("Datum::unwrap_float64 called on {:?}", self),
        }
    }

    /// Unwraps the string value within this datum.
    ///
    /// # Panics
    ///
    /// Panics if the datum is not [`Datum::String`].
    pub fn unwrap_str(&self) -> &str {
        match self {
            Datum::String(s) => s,
            _ => panic!("Datum::unwrap_str called on {:?}", self),
        }
    }

    /// Reports whether this datum is an instance of the specified column type.
    pub fn is_instance_of(&self, column_type: &ColumnType) -> bool {
        match (self, &column_type.scalar_type) {
            (Datum::Null, _) => column_type.nullable,
            (Datum::False | Datum::True, ScalarType::Bool) => true,
            (Datum::Int64(_), ScalarType::Int64) => true,
            (Datum::Float64(_), ScalarType::Float64) => true,
            (Datum::String(_), ScalarType::String) => true,
            _ => false,
        }
    }

    /// The scalar type of this datum, if it is not null.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Datum::Null => None,
            Datum::False | Datum::True => Some(ScalarType::Bool),
            Datum::Int64(_) => Some(ScalarType::Int64),
            Datum::Float64(_) => Some(ScalarType::Float64),
            Datum::String(_) => Some(ScalarType::String),
        }
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Datum {
        if b {
            Datum::True
        } else {
            Datum::False
        }
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Datum {
        Datum::Int64(i)
    }
}

impl From<f64> for Datum {
    fn from(f: f64) -> Datum {
        Datum::Float64(OrderedFloat(f))
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Datum {
        Datum::String(s.to_owned())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Datum {
        Datum::String(s)
    }
}

impl<T> From<Option<T>> for Datum
where
    Datum: From<T>,
{
    fn from(o: Option<T>) -> Datum {
        match o {
            Some(d) => d.into(),
            None => Datum::Null,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("null"),
            Datum::True => f.write_str("true"),
            Datum::False => f.write_str("false"),
            Datum::Int64(num) => write!(f, "{}", num),
            Datum::Float64(num) => write!(f, "{}", num),
            Datum::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// The type of a [`Datum`].
///
/// There is a direct correspondence between `Datum` variants and `ScalarType`
/// variants, with the exception of `Datum::Null`, which may inhabit any type.
#[derive(
    Arbitrary, Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub enum ScalarType {
    /// The type of [`Datum::True`] and [`Datum::False`].
    Bool,
    /// The type of [`Datum::Int64`].
    Int64,
    /// The type of [`Datum::Float64`].
    Float64,
    /// The type of [`Datum::String`].
    String,
}

impl ScalarType {
    /// Derives a column type from this scalar type with the specified
    /// nullability.
    pub fn nullable(self, nullable: bool) -> ColumnType {
        ColumnType {
            nullable,
            scalar_type: self,
        }
    }

    /// Reports whether this type supports arithmetic.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Int64 | ScalarType::Float64)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ScalarType::Bool => "boolean",
            ScalarType::Int64 => "bigint",
            ScalarType::Float64 => "double precision",
            ScalarType::String => "text",
        })
    }
}
