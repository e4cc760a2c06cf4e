// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::mem;

use itertools::Itertools;
use relopt_ore::soft_panic_or_log;
use relopt_repr::{ColumnType, Datum, ScalarType};
use serde::{Deserialize, Serialize};

use crate::relation::aggregate::AggregateFunc;
use crate::{ColumnSet, Mapping, PlanError};

use self::func::{BinaryFunc, UnaryFunc, VariadicFunc};

pub mod func;
pub mod strong;

#[derive(Ord, PartialOrd, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub enum ScalarExpr {
    /// A column of the input row
    Column(usize),
    /// A literal value.
    Literal(Datum, ColumnType),
    /// A function call that takes one expression as an argument.
    CallUnary {
        func: UnaryFunc,
        expr: Box<ScalarExpr>,
    },
    /// A function call that takes two expressions as arguments.
    CallBinary {
        func: BinaryFunc,
        expr1: Box<ScalarExpr>,
        expr2: Box<ScalarExpr>,
    },
    /// A function call that takes an arbitrary number of arguments.
    CallVariadic {
        func: VariadicFunc,
        exprs: Vec<ScalarExpr>,
    },
    If {
        cond: Box<ScalarExpr>,
        then: Box<ScalarExpr>,
        els: Box<ScalarExpr>,
    },
    /// An aggregate evaluated over the partition of the input that the
    /// current row belongs to.
    ///
    /// Only meaningful as a projection item: its value depends on rows other
    /// than the current one.
    Windowed(Box<WindowedExpr>),
}

/// The payload of [`ScalarExpr::Windowed`].
#[derive(Ord, PartialOrd, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct WindowedExpr {
    /// The aggregate to compute.
    pub func: AggregateFunc,
    /// Input columns the aggregate consumes.
    pub args: Vec<usize>,
    /// Input columns that determine the partition.
    pub partition_by: Vec<usize>,
}

impl ScalarExpr {
    pub fn columns(is: &[usize]) -> Vec<ScalarExpr> {
        is.iter().map(|i| ScalarExpr::Column(*i)).collect()
    }

    pub fn column(column: usize) -> Self {
        ScalarExpr::Column(column)
    }

    /// A literal of the given scalar type. Null literals are nullable.
    pub fn literal(datum: Datum, scalar_type: ScalarType) -> Self {
        let typ = scalar_type.nullable(datum.is_null());
        ScalarExpr::Literal(datum, typ)
    }

    pub fn literal_null(scalar_type: ScalarType) -> Self {
        ScalarExpr::literal(Datum::Null, scalar_type)
    }

    pub fn literal_true() -> Self {
        ScalarExpr::literal(Datum::True, ScalarType::Bool)
    }

    pub fn literal_false() -> Self {
        ScalarExpr::literal(Datum::False, ScalarType::Bool)
    }

    pub fn call_unary(self, func: UnaryFunc) -> Self {
        ScalarExpr::CallUnary {
            func,
            expr: Box::new(self),
        }
    }

    pub fn call_binary(self, other: Self, func: BinaryFunc) -> Self {
        ScalarExpr::CallBinary {
            func,
            expr1: Box::new(self),
            expr2: Box::new(other),
        }
    }

    pub fn call_is_null(self) -> Self {
        self.call_unary(UnaryFunc::IsNull)
    }

    pub fn if_then_else(self, t: Self, f: Self) -> Self {
        ScalarExpr::If {
            cond: Box::new(self),
            then: Box::new(t),
            els: Box::new(f),
        }
    }

    pub fn windowed(func: AggregateFunc, args: Vec<usize>, partition_by: Vec<usize>) -> Self {
        ScalarExpr::Windowed(Box::new(WindowedExpr {
            func,
            args,
            partition_by,
        }))
    }

    /// Forms the conjunction of the given predicates.
    ///
    /// Nested conjunctions are flattened and literal `true`s dropped. A
    /// literal `false` absorbs everything. The empty conjunction is `true`.
    pub fn and_all<I>(predicates: I) -> Self
    where
        I: IntoIterator<Item = ScalarExpr>,
    {
        let mut conjuncts = Vec::new();
        for predicate in predicates {
            for conjunct in predicate.into_conjuncts() {
                if conjunct.is_literal_false() {
                    return ScalarExpr::literal_false();
                }
                if !conjuncts.contains(&conjunct) {
                    conjuncts.push(conjunct);
                }
            }
        }
        match conjuncts.len() {
            0 => ScalarExpr::literal_true(),
            1 => conjuncts.remove(0),
            _ => ScalarExpr::CallVariadic {
                func: VariadicFunc::And,
                exprs: conjuncts,
            },
        }
    }

    /// Forms the disjunction of the given predicates.
    ///
    /// The empty disjunction is `false`.
    pub fn or_all<I>(predicates: I) -> Self
    where
        I: IntoIterator<Item = ScalarExpr>,
    {
        let mut disjuncts: Vec<ScalarExpr> = Vec::new();
        for predicate in predicates {
            if predicate.is_literal_true() {
                return ScalarExpr::literal_true();
            }
            if predicate.is_literal_false() || disjuncts.contains(&predicate) {
                continue;
            }
            disjuncts.push(predicate);
        }
        match disjuncts.len() {
            0 => ScalarExpr::literal_false(),
            1 => disjuncts.remove(0),
            _ => ScalarExpr::CallVariadic {
                func: VariadicFunc::Or,
                exprs: disjuncts,
            },
        }
    }

    /// Splits a predicate into its top-level conjuncts.
    ///
    /// Literal `true` conjuncts are dropped, so `true` splits into nothing.
    pub fn into_conjuncts(self) -> Vec<ScalarExpr> {
        let mut out = Vec::new();
        let mut todo = vec![self];
        while let Some(expr) = todo.pop() {
            match expr {
                ScalarExpr::CallVariadic {
                    func: VariadicFunc::And,
                    exprs,
                } => todo.extend(exprs.into_iter().rev()),
                e if e.is_literal_true() => {}
                e => out.push(e),
            }
        }
        out
    }

    /// Like [`ScalarExpr::into_conjuncts`], but borrowing.
    pub fn conjuncts(&self) -> Vec<ScalarExpr> {
        self.clone().into_conjuncts()
    }

    pub fn visit1<'a, F>(&'a self, mut f: F)
    where
        F: FnMut(&'a Self),
    {
        match self {
            ScalarExpr::Column(_) | ScalarExpr::Literal(_, _) | ScalarExpr::Windowed(_) => (),
            ScalarExpr::CallUnary { expr, .. } => {
                f(expr);
            }
            ScalarExpr::CallBinary { expr1, expr2, .. } => {
                f(expr1);
                f(expr2);
            }
            ScalarExpr::CallVariadic { exprs, .. } => {
                for expr in exprs {
                    f(expr);
                }
            }
            ScalarExpr::If { cond, then, els } => {
                f(cond);
                f(then);
                f(els);
            }
        }
    }

    /// Visits every node in post-order.
    pub fn visit<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Self),
    {
        self.visit1(|e| e.visit(f));
        f(self);
    }

    pub fn visit1_mut<'a, F>(&'a mut self, mut f: F)
    where
        F: FnMut(&'a mut Self),
    {
        match self {
            ScalarExpr::Column(_) | ScalarExpr::Literal(_, _) | ScalarExpr::Windowed(_) => (),
            ScalarExpr::CallUnary { expr, .. } => {
                f(expr);
            }
            ScalarExpr::CallBinary { expr1, expr2, .. } => {
                f(expr1);
                f(expr2);
            }
            ScalarExpr::CallVariadic { exprs, .. } => {
                for expr in exprs {
                    f(expr);
                }
            }
            ScalarExpr::If { cond, then, els } => {
                f(cond);
                f(then);
                f(els);
            }
        }
    }

    /// Visits every node mutably in post-order.
    pub fn visit_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Self),
    {
        self.visit1_mut(|e| e.visit_mut(f));
        f(self);
    }

    /// Rewrites every column reference, including those held by windowed
    /// aggregates, through `f`.
    pub fn try_map_columns<F>(&mut self, f: &mut F) -> Result<(), PlanError>
    where
        F: FnMut(usize) -> Result<usize, PlanError>,
    {
        let mut result = Ok(());
        self.visit_mut(&mut |e| {
            if result.is_err() {
                return;
            }
            match e {
                ScalarExpr::Column(c) => match f(*c) {
                    Ok(n) => *c = n,
                    Err(err) => result = Err(err),
                },
                ScalarExpr::Windowed(w) => {
                    for c in w.args.iter_mut().chain(w.partition_by.iter_mut()) {
                        match f(*c) {
                            Ok(n) => *c = n,
                            Err(err) => {
                                result = Err(err);
                                return;
                            }
                        }
                    }
                }
                _ => {}
            }
        });
        result
    }

    /// Rewrites column indices with their value in `permutation`.
    ///
    /// This method is applicable even when `permutation` is not a
    /// strict permutation, and it only needs to have entries for
    /// each column referenced in `self`.
    pub fn permute(&mut self, permutation: &[usize]) -> Result<(), PlanError> {
        self.try_map_columns(&mut |c| {
            permutation
                .get(c)
                .copied()
                .ok_or(PlanError::UnmappedColumn(c))
        })
    }

    /// Returns a copy of this expression with its column references carried
    /// through `mapping`.
    pub fn remap(&self, mapping: &Mapping) -> Result<ScalarExpr, PlanError> {
        let mut expr = self.clone();
        expr.try_map_columns(&mut |c| mapping.try_target(c))?;
        Ok(expr)
    }

    /// Returns a copy of this expression with every column reference
    /// increased by `by`.
    pub fn shift_up(&self, by: usize) -> ScalarExpr {
        let mut expr = self.clone();
        // Adding never fails.
        let _ = expr.try_map_columns(&mut |c| Ok(c + by));
        expr
    }

    /// Returns a copy of this expression with every column reference
    /// decreased by `by`.
    pub fn shift_down(&self, by: usize) -> Result<ScalarExpr, PlanError> {
        let mut expr = self.clone();
        expr.try_map_columns(&mut |c| c.checked_sub(by).ok_or(PlanError::UnmappedColumn(c)))?;
        Ok(expr)
    }

    /// Replaces each reference to column `i` with `exprs[i]`.
    ///
    /// This composes `self` with a projection whose items are `exprs`.
    /// Windowed aggregates can only be composed with projections that pass
    /// their columns through unchanged.
    pub fn substitute(&self, exprs: &[ScalarExpr]) -> Result<ScalarExpr, PlanError> {
        let arity = exprs.len();
        let lookup = |c: usize| -> Result<&ScalarExpr, PlanError> {
            exprs
                .get(c)
                .ok_or(PlanError::ColumnOutOfRange { column: c, arity })
        };
        let column_of = |c: usize| -> Result<usize, PlanError> {
            lookup(c)?.as_column().ok_or_else(|| {
                PlanError::Invalid(format!(
                    "windowed aggregate references computed column #{}",
                    c
                ))
            })
        };
        let mut result = Ok(());
        let mut expr = self.clone();
        expr.visit_mut(&mut |e| {
            if result.is_err() {
                return;
            }
            match e {
                ScalarExpr::Column(c) => match lookup(*c) {
                    Ok(s) => *e = s.clone(),
                    Err(err) => result = Err(err),
                },
                ScalarExpr::Windowed(w) => {
                    for c in w.args.iter_mut().chain(w.partition_by.iter_mut()) {
                        match column_of(*c) {
                            Ok(n) => *c = n,
                            Err(err) => {
                                result = Err(err);
                                return;
                            }
                        }
                    }
                }
                _ => {}
            }
        });
        result.map(|()| expr)
    }

    /// The set of columns this expression references.
    pub fn support(&self) -> ColumnSet {
        let mut support = ColumnSet::new();
        self.visit(&mut |e| match e {
            ScalarExpr::Column(i) => {
                support.insert(*i);
            }
            ScalarExpr::Windowed(w) => {
                support.extend(w.args.iter().copied());
                support.extend(w.partition_by.iter().copied());
            }
            _ => {}
        });
        support
    }

    pub fn take(&mut self) -> Self {
        mem::replace(self, ScalarExpr::literal_null(ScalarType::Bool))
    }

    pub fn as_column(&self) -> Option<usize> {
        match self {
            ScalarExpr::Column(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Datum> {
        match self {
            ScalarExpr::Literal(datum, _) => Some(datum),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, ScalarExpr::Literal(_, _))
    }

    pub fn is_literal_true(&self) -> bool {
        Some(&Datum::True) == self.as_literal()
    }

    pub fn is_literal_false(&self) -> bool {
        Some(&Datum::False) == self.as_literal()
    }

    pub fn is_literal_null(&self) -> bool {
        Some(&Datum::Null) == self.as_literal()
    }

    /// Reports whether a windowed aggregate occurs anywhere in this
    /// expression.
    pub fn contains_windowed(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, ScalarExpr::Windowed(_)));
        found
    }

    /// Derives the type of this expression over input columns of the given
    /// types.
    pub fn typ(&self, column_types: &[ColumnType]) -> Result<ColumnType, PlanError> {
        match self {
            ScalarExpr::Column(i) => {
                column_types
                    .get(*i)
                    .cloned()
                    .ok_or(PlanError::ColumnOutOfRange {
                        column: *i,
                        arity: column_types.len(),
                    })
            }
            ScalarExpr::Literal(_, typ) => Ok(typ.clone()),
            ScalarExpr::CallUnary { expr, func } => func.output_type(expr.typ(column_types)?),
            ScalarExpr::CallBinary { expr1, expr2, func } => {
                func.output_type(expr1.typ(column_types)?, expr2.typ(column_types)?)
            }
            ScalarExpr::CallVariadic { exprs, func } => func.output_type(
                exprs
                    .iter()
                    .map(|e| e.typ(column_types))
                    .collect::<Result<_, _>>()?,
            ),
            ScalarExpr::If { cond, then, els } => {
                let cond_type = cond.typ(column_types)?;
                if cond_type.scalar_type != ScalarType::Bool {
                    return Err(PlanError::NonBooleanPredicate(cond_type));
                }
                let then_type = then.typ(column_types)?;
                let else_type = els.typ(column_types)?;
                then_type
                    .union(&else_type)
                    .ok_or(PlanError::IncompatibleTypes {
                        context: "if",
                        left: then_type.scalar_type,
                        right: else_type.scalar_type,
                    })
            }
            ScalarExpr::Windowed(w) => {
                let arg_types = w
                    .args
                    .iter()
                    .chain(&w.partition_by)
                    .map(|c| ScalarExpr::Column(*c).typ(column_types))
                    .collect::<Result<Vec<_>, _>>()?;
                // A partition is never empty, so the aggregate behaves as if
                // it had a group key.
                w.func.output_type(&arg_types[..w.args.len()], false)
            }
        }
    }

    /// Evaluates this expression over a single input row.
    ///
    /// Windowed aggregates cannot be evaluated row by row and yield null.
    pub fn eval(&self, datums: &[Datum]) -> Datum {
        match self {
            ScalarExpr::Column(index) => datums.get(*index).cloned().unwrap_or(Datum::Null),
            ScalarExpr::Literal(datum, _) => datum.clone(),
            ScalarExpr::CallUnary { func, expr } => func.eval(expr.eval(datums)),
            ScalarExpr::CallBinary { func, expr1, expr2 } => {
                func.eval(expr1.eval(datums), expr2.eval(datums))
            }
            ScalarExpr::CallVariadic { func, exprs } => {
                func.eval(exprs.iter().map(|e| e.eval(datums)).collect())
            }
            ScalarExpr::If { cond, then, els } => match cond.eval(datums) {
                Datum::True => then.eval(datums),
                _ => els.eval(datums),
            },
            ScalarExpr::Windowed(_) => {
                soft_panic_or_log!("windowed aggregate evaluated row by row: {}", self);
                Datum::Null
            }
        }
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ScalarExpr::*;
        match self {
            Column(i) => write!(f, "#{}", i),
            Literal(datum, _) => write!(f, "{}", datum),
            CallUnary {
                func: UnaryFunc::Neg,
                expr,
            } => write!(f, "-{}", expr),
            CallUnary { func, expr } => write!(f, "{}({})", func, expr),
            CallBinary { func, expr1, expr2 } => write!(f, "({} {} {})", expr1, func, expr2),
            CallVariadic {
                func: func @ (VariadicFunc::And | VariadicFunc::Or),
                exprs,
            } => write!(f, "({})", exprs.iter().join(&format!(" {} ", func))),
            CallVariadic { func, exprs } => write!(f, "{}({})", func, exprs.iter().join(", ")),
            If { cond, then, els } => write!(f, "if {} then {{{}}} else {{{}}}", cond, then, els),
            Windowed(w) => {
                write!(
                    f,
                    "{}({}) over (partition by {})",
                    w.func,
                    w.args.iter().map(|c| format!("#{}", c)).join(", "),
                    w.partition_by.iter().map(|c| format!("#{}", c)).join(", ")
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> ScalarExpr {
        ScalarExpr::literal(Datum::Int64(i), ScalarType::Int64)
    }

    #[relopt_ore::test]
    fn test_and_all_flattens() {
        let a = ScalarExpr::column(0).call_binary(int(1), BinaryFunc::Eq);
        let b = ScalarExpr::column(1).call_binary(int(2), BinaryFunc::Eq);
        let nested = ScalarExpr::and_all(vec![
            a.clone(),
            ScalarExpr::and_all(vec![b.clone(), ScalarExpr::literal_true()]),
        ]);
        assert_eq!(nested.conjuncts(), vec![a.clone(), b]);
        assert!(ScalarExpr::and_all(Vec::new()).is_literal_true());
        assert!(ScalarExpr::and_all(vec![a, ScalarExpr::literal_false()]).is_literal_false());
        assert!(ScalarExpr::literal_true().conjuncts().is_empty());
    }

    #[relopt_ore::test]
    fn test_substitute() {
        // #0 + #1 over a projection (#2, #0 * 3).
        let expr = ScalarExpr::column(0).call_binary(ScalarExpr::column(1), BinaryFunc::Add);
        let project = vec![
            ScalarExpr::column(2),
            ScalarExpr::column(0).call_binary(int(3), BinaryFunc::Mul),
        ];
        let composed = expr.substitute(&project).unwrap();
        assert_eq!(composed.to_string(), "(#2 + (#0 * 3))");
        assert_eq!(composed.support().to_vec(), vec![0, 2]);
        assert!(ScalarExpr::column(5).substitute(&project).is_err());
    }

    #[relopt_ore::test]
    fn test_remap_windowed() {
        let w = ScalarExpr::windowed(AggregateFunc::Sum, vec![3], vec![1]);
        assert_eq!(w.support().to_vec(), vec![1, 3]);
        let kept: ColumnSet = [1, 3].into_iter().collect();
        let mapped = w.remap(&Mapping::from_kept(&kept, 4)).unwrap();
        assert_eq!(mapped, ScalarExpr::windowed(AggregateFunc::Sum, vec![1], vec![0]));
        assert!(w.contains_windowed());
        assert!(w.remap(&Mapping::identity(2)).is_err());
    }

    #[relopt_ore::test]
    fn test_typ() {
        let types = vec![
            ScalarType::Int64.nullable(true),
            ScalarType::Int64.nullable(false),
        ];
        let eq = ScalarExpr::column(0).call_binary(ScalarExpr::column(1), BinaryFunc::Eq);
        assert_eq!(eq.typ(&types), Ok(ScalarType::Bool.nullable(true)));
        assert_eq!(
            ScalarExpr::column(2).typ(&types),
            Err(PlanError::ColumnOutOfRange {
                column: 2,
                arity: 2
            })
        );
        assert_eq!(
            ScalarExpr::column(0).call_is_null().typ(&types),
            Ok(ScalarType::Bool.nullable(false))
        );
    }

    #[relopt_ore::test]
    fn test_eval() {
        let row = vec![Datum::Int64(4), Datum::Null];
        let expr = ScalarExpr::column(0)
            .call_binary(int(4), BinaryFunc::Eq)
            .if_then_else(int(1), int(0));
        assert_eq!(expr.eval(&row), Datum::Int64(1));
        let null_cmp = ScalarExpr::column(1).call_binary(int(4), BinaryFunc::Eq);
        assert_eq!(null_cmp.eval(&row), Datum::Null);
    }
}
