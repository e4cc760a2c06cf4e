// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Aggregate functions and their decomposition capabilities.

use std::fmt;

use relopt_repr::{ColumnName, ColumnType, Datum, ScalarType};
use serde::{Deserialize, Serialize};

use crate::scalar::func::{BinaryFunc, UnaryFunc, VariadicFunc};
use crate::{Mapping, PlanError, ScalarExpr};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum AggregateFunc {
    /// Counts rows, or with one argument, rows where the argument is not null.
    Count,
    /// Sums non-null values; null when there are none.
    Sum,
    /// Sums non-null values; zero when there are none.
    Sum0,
    Min,
    Max,
    /// Some non-null value of the group.
    AnyValue,
    Avg,
}

impl AggregateFunc {
    /// Derives the output type for the given argument types.
    ///
    /// `empty_group` is set when the aggregate may be evaluated over zero rows,
    /// i.e. when it has no group key.
    pub fn output_type(
        &self,
        args: &[ColumnType],
        empty_group: bool,
    ) -> Result<ColumnType, PlanError> {
        let arg = match (self, args) {
            (AggregateFunc::Count, [] | [_]) => return Ok(ScalarType::Int64.nullable(false)),
            (_, [arg]) => arg,
            _ => {
                return Err(PlanError::InvalidAggregate(format!(
                    "{} expects {} arguments, got {}",
                    self,
                    if *self == AggregateFunc::Count {
                        "0 or 1"
                    } else {
                        "1"
                    },
                    args.len()
                )))
            }
        };
        let numeric = || {
            if arg.scalar_type.is_numeric() {
                Ok(())
            } else {
                Err(PlanError::InvalidArgument {
                    func: self.to_string(),
                    arg: arg.scalar_type,
                })
            }
        };
        let nullable = arg.nullable || empty_group;
        match self {
            AggregateFunc::Count => unreachable!("handled above"),
            AggregateFunc::Sum => {
                numeric()?;
                Ok(arg.clone().nullable(nullable))
            }
            AggregateFunc::Sum0 => {
                numeric()?;
                Ok(arg.clone().nullable(false))
            }
            AggregateFunc::Avg => {
                numeric()?;
                Ok(ScalarType::Float64.nullable(nullable))
            }
            AggregateFunc::Min | AggregateFunc::Max | AggregateFunc::AnyValue => {
                Ok(arg.clone().nullable(nullable))
            }
        }
    }

    /// The function that combines partial results of this function computed
    /// over a finer grouping.
    pub fn rollup(&self) -> Option<AggregateFunc> {
        match self {
            AggregateFunc::Count | AggregateFunc::Sum0 => Some(AggregateFunc::Sum0),
            AggregateFunc::Sum => Some(AggregateFunc::Sum),
            AggregateFunc::Min => Some(AggregateFunc::Min),
            AggregateFunc::Max => Some(AggregateFunc::Max),
            AggregateFunc::AnyValue => Some(AggregateFunc::AnyValue),
            AggregateFunc::Avg => None,
        }
    }

    /// Looks up how to split this function across the inputs of a join.
    pub fn splitter(&self) -> Option<&'static dyn Splitter> {
        match self {
            AggregateFunc::Count => Some(&CountSplitter),
            AggregateFunc::Sum => Some(&SumSplitter { zero: false }),
            AggregateFunc::Sum0 => Some(&SumSplitter { zero: true }),
            AggregateFunc::Min | AggregateFunc::Max | AggregateFunc::AnyValue => {
                Some(&SelfSplitter)
            }
            AggregateFunc::Avg => None,
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Sum0 => "sum0",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
            AggregateFunc::AnyValue => "any_value",
            AggregateFunc::Avg => "avg",
        })
    }
}

/// One aggregate computed by an aggregate or window operator.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct AggregateCall {
    pub func: AggregateFunc,
    /// Input columns passed to the function.
    pub args: Vec<usize>,
    /// Whether duplicate argument values are eliminated first.
    pub distinct: bool,
    /// The name of the output column.
    pub name: ColumnName,
}

impl AggregateCall {
    pub fn new<N>(func: AggregateFunc, args: Vec<usize>, name: N) -> AggregateCall
    where
        N: Into<ColumnName>,
    {
        AggregateCall {
            func,
            args,
            distinct: false,
            name: name.into(),
        }
    }

    /// `COUNT(*)`.
    pub fn count_star<N>(name: N) -> AggregateCall
    where
        N: Into<ColumnName>,
    {
        AggregateCall::new(AggregateFunc::Count, vec![], name)
    }

    pub fn distinct(mut self, distinct: bool) -> AggregateCall {
        self.distinct = distinct;
        self
    }

    /// Derives the output type of this call over input columns of the given
    /// types.
    pub fn output_type(
        &self,
        input_types: &[ColumnType],
        empty_group: bool,
    ) -> Result<ColumnType, PlanError> {
        let args = self
            .args
            .iter()
            .map(|a| {
                input_types
                    .get(*a)
                    .cloned()
                    .ok_or(PlanError::ColumnOutOfRange {
                        column: *a,
                        arity: input_types.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.func.output_type(&args, empty_group)
    }

    /// Returns a copy of this call with its arguments carried through
    /// `mapping`.
    pub fn remap(&self, mapping: &Mapping) -> Result<AggregateCall, PlanError> {
        let mut call = self.clone();
        for arg in call.args.iter_mut() {
            *arg = mapping.try_target(*arg)?;
        }
        Ok(call)
    }

    /// Returns a copy of this call with different arguments.
    pub fn with_args(&self, args: Vec<usize>) -> AggregateCall {
        AggregateCall {
            args,
            ..self.clone()
        }
    }
}

impl fmt::Display for AggregateCall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.func)?;
        if self.distinct {
            f.write_str("distinct ")?;
        }
        if self.args.is_empty() && self.func == AggregateFunc::Count {
            f.write_str("*")?;
        }
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "#{}", arg)?;
        }
        write!(f, ") as {}", self.name)
    }
}

/// Splits an aggregate across the two inputs of a join.
///
/// For a join `L ⋈ R`, the aggregate over the join is recombined from
/// partial results: a per-side subtotal for each side that is aggregated, or
/// a per-row [`Splitter::singleton`] value for a side that is already unique
/// on the grouping key.
pub trait Splitter: fmt::Debug + Sync {
    /// The partial call computed on the side that holds all of `call`'s
    /// arguments. `mapping` carries argument columns into that side's
    /// numbering.
    fn split(&self, call: &AggregateCall, mapping: &Mapping) -> Result<AggregateCall, PlanError> {
        call.remap(mapping)
    }

    /// The partial call computed on a side that holds none of `call`'s
    /// arguments, or `None` if that side contributes nothing.
    fn other(&self, call: &AggregateCall) -> Option<AggregateCall>;

    /// The contribution of a single row, for a side that is not aggregated.
    /// `call`'s arguments are numbered within `input_types`.
    fn singleton(
        &self,
        input_types: &[ColumnType],
        call: &AggregateCall,
    ) -> Result<ScalarExpr, PlanError>;

    /// The call that recombines the subtotals found at columns `left` and
    /// `right` of the rebuilt join. Helper expressions are appended to
    /// `projects` (or reused if already present) and referenced by position.
    fn top_split(
        &self,
        projects: &mut Vec<ScalarExpr>,
        call: &AggregateCall,
        left: Option<usize>,
        right: Option<usize>,
    ) -> Result<AggregateCall, PlanError>;
}

/// Returns the position of `expr` in `projects`, appending it if absent.
fn register(projects: &mut Vec<ScalarExpr>, expr: ScalarExpr) -> usize {
    match projects.iter().position(|e| *e == expr) {
        Some(i) => i,
        None => {
            projects.push(expr);
            projects.len() - 1
        }
    }
}

fn product(left: Option<usize>, right: Option<usize>) -> Result<ScalarExpr, PlanError> {
    match (left, right) {
        (Some(l), Some(r)) => Ok(ScalarExpr::column(l).call_binary(ScalarExpr::column(r), BinaryFunc::Mul)),
        (Some(c), None) | (None, Some(c)) => Ok(ScalarExpr::column(c)),
        (None, None) => Err(PlanError::InvalidAggregate(
            "no subtotal to recombine".into(),
        )),
    }
}

#[derive(Debug)]
struct CountSplitter;

impl Splitter for CountSplitter {
    fn other(&self, call: &AggregateCall) -> Option<AggregateCall> {
        Some(AggregateCall::count_star(format!("{}$other", call.name)))
    }

    fn singleton(
        &self,
        input_types: &[ColumnType],
        call: &AggregateCall,
    ) -> Result<ScalarExpr, PlanError> {
        let one = ScalarExpr::literal(Datum::Int64(1), ScalarType::Int64);
        let mut not_null = Vec::new();
        for arg in &call.args {
            let typ = input_types.get(*arg).ok_or(PlanError::ColumnOutOfRange {
                column: *arg,
                arity: input_types.len(),
            })?;
            if typ.nullable {
                not_null.push(ScalarExpr::column(*arg).call_unary(UnaryFunc::IsNotNull));
            }
        }
        if not_null.is_empty() {
            Ok(one)
        } else {
            Ok(ScalarExpr::and_all(not_null).if_then_else(
                one,
                ScalarExpr::literal(Datum::Int64(0), ScalarType::Int64),
            ))
        }
    }

    fn top_split(
        &self,
        projects: &mut Vec<ScalarExpr>,
        call: &AggregateCall,
        left: Option<usize>,
        right: Option<usize>,
    ) -> Result<AggregateCall, PlanError> {
        let ordinal = register(projects, product(left, right)?);
        Ok(AggregateCall::new(
            AggregateFunc::Sum0,
            vec![ordinal],
            call.name.clone(),
        ))
    }
}

/// Splitting for functions whose value over a union of groups is the same
/// function over the per-group values (`MIN`, `MAX`, `ANY_VALUE`).
#[derive(Debug)]
struct SelfSplitter;

impl Splitter for SelfSplitter {
    fn other(&self, _call: &AggregateCall) -> Option<AggregateCall> {
        None
    }

    fn singleton(
        &self,
        _input_types: &[ColumnType],
        call: &AggregateCall,
    ) -> Result<ScalarExpr, PlanError> {
        match call.args[..] {
            [arg] => Ok(ScalarExpr::column(arg)),
            _ => Err(PlanError::InvalidAggregate(format!(
                "{} expects one argument",
                call.func
            ))),
        }
    }

    fn top_split(
        &self,
        _projects: &mut Vec<ScalarExpr>,
        call: &AggregateCall,
        left: Option<usize>,
        right: Option<usize>,
    ) -> Result<AggregateCall, PlanError> {
        match (left, right) {
            (Some(c), None) | (None, Some(c)) => Ok(call.with_args(vec![c])),
            _ => Err(PlanError::InvalidAggregate(format!(
                "{} must have exactly one subtotal",
                call
            ))),
        }
    }
}

/// Splitting for `SUM` and `SUM0`: a subtotal on one side is scaled by the
/// row count of the other.
#[derive(Debug)]
struct SumSplitter {
    zero: bool,
}

impl Splitter for SumSplitter {
    fn other(&self, call: &AggregateCall) -> Option<AggregateCall> {
        Some(AggregateCall::count_star(format!("{}$other", call.name)))
    }

    fn singleton(
        &self,
        input_types: &[ColumnType],
        call: &AggregateCall,
    ) -> Result<ScalarExpr, PlanError> {
        let arg = match call.args[..] {
            [arg] => arg,
            _ => {
                return Err(PlanError::InvalidAggregate(format!(
                    "{} expects one argument",
                    call.func
                )))
            }
        };
        if !self.zero {
            return Ok(ScalarExpr::column(arg));
        }
        let typ = input_types.get(arg).ok_or(PlanError::ColumnOutOfRange {
            column: arg,
            arity: input_types.len(),
        })?;
        if !typ.nullable {
            return Ok(ScalarExpr::column(arg));
        }
        let zero = match typ.scalar_type {
            ScalarType::Float64 => Datum::from(0.0),
            _ => Datum::Int64(0),
        };
        Ok(ScalarExpr::CallVariadic {
            func: VariadicFunc::Coalesce,
            exprs: vec![
                ScalarExpr::column(arg),
                ScalarExpr::literal(zero, typ.scalar_type),
            ],
        })
    }

    fn top_split(
        &self,
        projects: &mut Vec<ScalarExpr>,
        call: &AggregateCall,
        left: Option<usize>,
        right: Option<usize>,
    ) -> Result<AggregateCall, PlanError> {
        let ordinal = register(projects, product(left, right)?);
        let func = if self.zero {
            AggregateFunc::Sum0
        } else {
            AggregateFunc::Sum
        };
        Ok(AggregateCall::new(func, vec![ordinal], call.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[relopt_ore::test]
    fn test_capabilities() {
        assert!(AggregateFunc::Avg.splitter().is_none());
        assert!(AggregateFunc::Avg.rollup().is_none());
        assert_eq!(AggregateFunc::Count.rollup(), Some(AggregateFunc::Sum0));
        assert!(AggregateFunc::Max.splitter().is_some());
    }

    #[relopt_ore::test]
    fn test_count_singleton() {
        let types = vec![
            ScalarType::Int64.nullable(false),
            ScalarType::String.nullable(true),
        ];
        let splitter = AggregateFunc::Count.splitter().unwrap();
        let star = splitter
            .singleton(&types, &AggregateCall::count_star("c"))
            .unwrap();
        assert_eq!(star.to_string(), "1");
        let nullable = splitter
            .singleton(&types, &AggregateCall::new(AggregateFunc::Count, vec![1], "c"))
            .unwrap();
        assert_eq!(nullable.to_string(), "if isnotnull(#1) then {1} else {0}");
    }

    #[relopt_ore::test]
    fn test_top_split_registers_products() {
        let mut projects = ScalarExpr::columns(&[0, 1, 2]);
        let splitter = AggregateFunc::Count.splitter().unwrap();
        let call = AggregateCall::count_star("c");
        let top = splitter
            .top_split(&mut projects, &call, Some(1), Some(2))
            .unwrap();
        assert_eq!(top.func, AggregateFunc::Sum0);
        assert_eq!(top.args, vec![3]);
        assert_eq!(projects[3].to_string(), "(#1 * #2)");
        // A lone subtotal is already projected.
        let top = splitter.top_split(&mut projects, &call, None, Some(2)).unwrap();
        assert_eq!(top.args, vec![2]);

        let min = AggregateCall::new(AggregateFunc::Min, vec![0], "m");
        let self_splitter = AggregateFunc::Min.splitter().unwrap();
        assert!(self_splitter
            .top_split(&mut projects, &min, Some(1), Some(2))
            .is_err());
    }

    #[relopt_ore::test]
    fn test_output_types() {
        let int = ScalarType::Int64.nullable(false);
        assert_eq!(
            AggregateFunc::Sum.output_type(&[int.clone()], true),
            Ok(ScalarType::Int64.nullable(true))
        );
        assert_eq!(
            AggregateFunc::Sum0.output_type(&[int.clone()], true),
            Ok(ScalarType::Int64.nullable(false))
        );
        assert!(AggregateFunc::Sum
            .output_type(&[ScalarType::String.nullable(false)], false)
            .is_err());
        assert!(AggregateFunc::Min.output_type(&[int.clone(), int], false).is_err());
    }
}
