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
use relopt_ore::cast::CastLossy;
use relopt_repr::{ColumnType, Datum, ScalarType};
use serde::{Deserialize, Serialize};

use crate::PlanError;

#[derive(Ord, PartialOrd, Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub enum UnaryFunc {
    Not,
    IsNull,
    IsNotNull,
    /// `x IS TRUE`: true exactly when `x` is true, never null.
    IsTrue,
    Neg,
}

impl UnaryFunc {
    pub fn eval(&self, a: Datum) -> Datum {
        match self {
            UnaryFunc::IsNull => a.is_null().into(),
            UnaryFunc::IsNotNull => (!a.is_null()).into(),
            UnaryFunc::IsTrue => (a == Datum::True).into(),
            UnaryFunc::Not => match a {
                Datum::Null => Datum::Null,
                Datum::True => Datum::False,
                Datum::False => Datum::True,
                _ => Datum::Null,
            },
            UnaryFunc::Neg => match a {
                Datum::Int64(i) => Datum::Int64(i.wrapping_neg()),
                Datum::Float64(f) => Datum::Float64(-f),
                _ => Datum::Null,
            },
        }
    }

    pub fn output_type(&self, input: ColumnType) -> Result<ColumnType, PlanError> {
        match self {
            UnaryFunc::IsNull | UnaryFunc::IsNotNull => Ok(ScalarType::Bool.nullable(false)),
            UnaryFunc::IsTrue | UnaryFunc::Not => {
                if input.scalar_type != ScalarType::Bool {
                    return Err(self.invalid(input.scalar_type));
                }
                Ok(match self {
                    UnaryFunc::IsTrue => input.nullable(false),
                    _ => input,
                })
            }
            UnaryFunc::Neg => {
                if !input.scalar_type.is_numeric() {
                    return Err(self.invalid(input.scalar_type));
                }
                Ok(input)
            }
        }
    }

    /// Reports whether the function returns null whenever its input is null.
    pub fn propagates_nulls(&self) -> bool {
        matches!(self, UnaryFunc::Not | UnaryFunc::Neg)
    }

    fn invalid(&self, arg: ScalarType) -> PlanError {
        PlanError::InvalidArgument {
            func: self.to_string(),
            arg,
        }
    }
}

impl fmt::Display for UnaryFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryFunc::Not => f.write_str("NOT"),
            UnaryFunc::IsNull => f.write_str("isnull"),
            UnaryFunc::IsNotNull => f.write_str("isnotnull"),
            UnaryFunc::IsTrue => f.write_str("istrue"),
            UnaryFunc::Neg => f.write_str("-"),
        }
    }
}

#[derive(Ord, PartialOrd, Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub enum BinaryFunc {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
}

impl BinaryFunc {
    pub fn eval(&self, a: Datum, b: Datum) -> Datum {
        if a.is_null() || b.is_null() {
            return Datum::Null;
        }
        match self {
            BinaryFunc::Eq => (a == b).into(),
            BinaryFunc::NotEq => (a != b).into(),
            BinaryFunc::Lt => (a < b).into(),
            BinaryFunc::Lte => (a <= b).into(),
            BinaryFunc::Gt => (a > b).into(),
            BinaryFunc::Gte => (a >= b).into(),
            BinaryFunc::Add | BinaryFunc::Sub | BinaryFunc::Mul => self.eval_arith(a, b),
        }
    }

    fn eval_arith(&self, a: Datum, b: Datum) -> Datum {
        match (a, b) {
            (Datum::Int64(a), Datum::Int64(b)) => Datum::Int64(match self {
                BinaryFunc::Add => a.wrapping_add(b),
                BinaryFunc::Sub => a.wrapping_sub(b),
                _ => a.wrapping_mul(b),
            }),
            (a, b) => match (as_float(&a), as_float(&b)) {
                (Some(a), Some(b)) => Datum::Float64(OrderedFloat(match self {
                    BinaryFunc::Add => a + b,
                    BinaryFunc::Sub => a - b,
                    _ => a * b,
                })),
                _ => Datum::Null,
            },
        }
    }

    pub fn output_type(&self, a: ColumnType, b: ColumnType) -> Result<ColumnType, PlanError> {
        let nullable = a.nullable || b.nullable;
        if self.is_arithmetic() {
            let scalar_type = match (a.scalar_type, b.scalar_type) {
                (ScalarType::Int64, ScalarType::Int64) => ScalarType::Int64,
                (x, y) if x.is_numeric() && y.is_numeric() => ScalarType::Float64,
                (x, y) if x.is_numeric() => return Err(self.invalid(y)),
                (x, _) => return Err(self.invalid(x)),
            };
            Ok(scalar_type.nullable(nullable))
        } else if a.scalar_type != b.scalar_type {
            Err(PlanError::IncompatibleTypes {
                context: "comparison",
                left: a.scalar_type,
                right: b.scalar_type,
            })
        } else {
            Ok(ScalarType::Bool.nullable(nullable))
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinaryFunc::Add | BinaryFunc::Sub | BinaryFunc::Mul)
    }

    /// Returns the function with its arguments swapped, if one exists.
    pub fn commute(&self) -> Option<BinaryFunc> {
        Some(match self {
            BinaryFunc::Eq => BinaryFunc::Eq,
            BinaryFunc::NotEq => BinaryFunc::NotEq,
            BinaryFunc::Lt => BinaryFunc::Gt,
            BinaryFunc::Lte => BinaryFunc::Gte,
            BinaryFunc::Gt => BinaryFunc::Lt,
            BinaryFunc::Gte => BinaryFunc::Lte,
            BinaryFunc::Add => BinaryFunc::Add,
            BinaryFunc::Mul => BinaryFunc::Mul,
            BinaryFunc::Sub => return None,
        })
    }

    fn invalid(&self, arg: ScalarType) -> PlanError {
        PlanError::InvalidArgument {
            func: self.to_string(),
            arg,
        }
    }
}

fn as_float(d: &Datum) -> Option<f64> {
    match d {
        Datum::Int64(i) => Some(f64::cast_lossy(*i)),
        Datum::Float64(f) => Some(f.into_inner()),
        _ => None,
    }
}

impl fmt::Display for BinaryFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            BinaryFunc::Eq => "=",
            BinaryFunc::NotEq => "!=",
            BinaryFunc::Lt => "<",
            BinaryFunc::Lte => "<=",
            BinaryFunc::Gt => ">",
            BinaryFunc::Gte => ">=",
            BinaryFunc::Add => "+",
            BinaryFunc::Sub => "-",
            BinaryFunc::Mul => "*",
        })
    }
}

#[derive(Ord, PartialOrd, Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub enum VariadicFunc {
    And,
    Or,
    Coalesce,
}

impl VariadicFunc {
    pub fn eval(&self, datums: Vec<Datum>) -> Datum {
        match self {
            VariadicFunc::And => {
                if datums.iter().any(|d| *d == Datum::False) {
                    Datum::False
                } else if datums.iter().any(Datum::is_null) {
                    Datum::Null
                } else {
                    Datum::True
                }
            }
            VariadicFunc::Or => {
                if datums.iter().any(|d| *d == Datum::True) {
                    Datum::True
                } else if datums.iter().any(Datum::is_null) {
                    Datum::Null
                } else {
                    Datum::False
                }
            }
            VariadicFunc::Coalesce => datums
                .into_iter()
                .find(|d| !d.is_null())
                .unwrap_or(Datum::Null),
        }
    }

    pub fn output_type(&self, inputs: Vec<ColumnType>) -> Result<ColumnType, PlanError> {
        match self {
            VariadicFunc::And | VariadicFunc::Or => {
                let mut nullable = false;
                for input in inputs {
                    if input.scalar_type != ScalarType::Bool {
                        return Err(PlanError::InvalidArgument {
                            func: self.to_string(),
                            arg: input.scalar_type,
                        });
                    }
                    nullable |= input.nullable;
                }
                Ok(ScalarType::Bool.nullable(nullable))
            }
            VariadicFunc::Coalesce => {
                let mut inputs = inputs.into_iter();
                let Some(first) = inputs.next() else {
                    return Err(PlanError::Invalid("coalesce requires arguments".into()));
                };
                let mut scalar_type = first.scalar_type;
                let mut nullable = first.nullable;
                for input in inputs {
                    scalar_type = match (scalar_type, input.scalar_type) {
                        (x, y) if x == y => x,
                        (x, y) if x.is_numeric() && y.is_numeric() => ScalarType::Float64,
                        (x, y) => {
                            return Err(PlanError::IncompatibleTypes {
                                context: "coalesce",
                                left: x,
                                right: y,
                            })
                        }
                    };
                    nullable &= input.nullable;
                }
                Ok(scalar_type.nullable(nullable))
            }
        }
    }
}

impl fmt::Display for VariadicFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            VariadicFunc::And => "AND",
            VariadicFunc::Or => "OR",
            VariadicFunc::Coalesce => "coalesce",
        })
    }
}
