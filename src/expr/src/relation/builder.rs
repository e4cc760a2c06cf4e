// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A stack-based facade for assembling relational expressions.
//!
//! Operators pop their inputs from the stack and push their result, so a
//! plan is written bottom-up:
//!
//! ```ignore
//! let mut b = RelBuilder::new();
//! b.push(emp).push(dept).join(JoinKind::Inner, cond)?.filter(pred)?;
//! let plan = b.build()?;
//! ```
//!
//! Trivial operators are elided: a filter on `true` pushes nothing, a filter
//! on `false` becomes an empty relation, and a projection that reproduces
//! its input unchanged is skipped.

use std::collections::BTreeSet;

use relopt_repr::{ColumnName, RelationDesc, Row};

use crate::relation::{ColumnOrder, CorrelationId, RelExpr, SetOpKind};
use crate::{AggregateCall, ColumnSet, JoinKind, PlanError, ScalarExpr};

#[derive(Debug, Default)]
pub struct RelBuilder {
    stack: Vec<RelExpr>,
}

impl RelBuilder {
    pub fn new() -> RelBuilder {
        RelBuilder::default()
    }

    pub fn push(&mut self, expr: RelExpr) -> &mut Self {
        self.stack.push(expr);
        self
    }

    /// The expression on top of the stack.
    pub fn peek(&self) -> Result<&RelExpr, PlanError> {
        self.stack.last().ok_or(PlanError::BuilderUnderflow {
            available: 0,
            requested: 1,
        })
    }

    /// The number of expressions on the stack.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    fn pop(&mut self) -> Result<RelExpr, PlanError> {
        self.stack.pop().ok_or(PlanError::BuilderUnderflow {
            available: 0,
            requested: 1,
        })
    }

    /// Pops the top `n` expressions, returning them in the order they were
    /// pushed.
    fn pop_n(&mut self, n: usize) -> Result<Vec<RelExpr>, PlanError> {
        if self.stack.len() < n {
            return Err(PlanError::BuilderUnderflow {
                available: self.stack.len(),
                requested: n,
            });
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    /// Pops the finished expression. The stack must hold exactly one.
    pub fn build(&mut self) -> Result<RelExpr, PlanError> {
        match self.stack.len() {
            1 => self.pop(),
            n => Err(PlanError::Invalid(format!(
                "builder holds {} expressions, expected 1",
                n
            ))),
        }
    }

    pub fn values(&mut self, rows: Vec<Row>, desc: RelationDesc) -> Result<&mut Self, PlanError> {
        let values = RelExpr::values(rows, desc)?;
        Ok(self.push(values))
    }

    /// Pushes an empty relation with the schema of `desc`.
    pub fn empty_of(&mut self, desc: RelationDesc) -> &mut Self {
        self.push(RelExpr::empty(desc))
    }

    /// Replaces the top of the stack with an empty relation of the same
    /// schema.
    pub fn empty(&mut self) -> Result<&mut Self, PlanError> {
        let input = self.pop()?;
        Ok(self.empty_of(input.desc().clone()))
    }

    /// Filters the top of the stack by the conjunction of `predicates`.
    pub fn filter<I>(&mut self, predicates: I) -> Result<&mut Self, PlanError>
    where
        I: IntoIterator<Item = ScalarExpr>,
    {
        let predicate = ScalarExpr::and_all(predicates);
        if predicate.is_literal_true() {
            self.peek()?;
            return Ok(self);
        }
        if predicate.is_literal_false() || predicate.is_literal_null() {
            return self.empty();
        }
        let input = self.pop()?;
        let filter = RelExpr::filter(input, predicate)?;
        Ok(self.push(filter))
    }

    /// Projects the top of the stack. Column references keep their input
    /// name; other expressions are named `$f{position}`.
    pub fn project(&mut self, exprs: Vec<ScalarExpr>) -> Result<&mut Self, PlanError> {
        let input = self.peek()?;
        let names = exprs
            .iter()
            .enumerate()
            .map(|(i, e)| match e.as_column() {
                Some(c) if c < input.arity() => input.desc().get_name(c).clone(),
                _ => ColumnName::from(format!("$f{}", i)),
            })
            .collect();
        self.project_named(exprs, names)
    }

    /// Projects the top of the stack with explicit output names.
    ///
    /// A projection that passes every input column through in order under
    /// the same names is skipped.
    pub fn project_named(
        &mut self,
        exprs: Vec<ScalarExpr>,
        names: Vec<ColumnName>,
    ) -> Result<&mut Self, PlanError> {
        let input = self.pop()?;
        let identity = exprs.len() == input.arity()
            && exprs
                .iter()
                .enumerate()
                .all(|(i, e)| e.as_column() == Some(i))
            && input.desc().iter_names().eq(names.iter());
        if identity {
            return Ok(self.push(input));
        }
        let project = RelExpr::project(input, exprs, names)?;
        Ok(self.push(project))
    }

    /// Joins the two expressions on top of the stack; the lower one is the
    /// left input.
    pub fn join(&mut self, kind: JoinKind, condition: ScalarExpr) -> Result<&mut Self, PlanError> {
        self.join_correlated(kind, condition, BTreeSet::new())
    }

    /// Like [`RelBuilder::join`], for a join that sets correlation variables.
    pub fn join_correlated(
        &mut self,
        kind: JoinKind,
        condition: ScalarExpr,
        correlation_ids: BTreeSet<CorrelationId>,
    ) -> Result<&mut Self, PlanError> {
        let mut inputs = self.pop_n(2)?;
        let right = inputs.pop();
        let left = inputs.pop();
        let (Some(left), Some(right)) = (left, right) else {
            return Err(PlanError::BuilderUnderflow {
                available: 0,
                requested: 2,
            });
        };
        let join = RelExpr::join_correlated(left, right, condition, kind, correlation_ids)?;
        Ok(self.push(join))
    }

    /// Aggregates the top of the stack.
    pub fn aggregate(
        &mut self,
        group_set: ColumnSet,
        grouping_sets: Option<Vec<ColumnSet>>,
        aggregates: Vec<AggregateCall>,
    ) -> Result<&mut Self, PlanError> {
        let input = self.pop()?;
        let aggregate = RelExpr::aggregate(input, group_set, grouping_sets, aggregates)?;
        Ok(self.push(aggregate))
    }

    /// Removes duplicate rows from the top of the stack.
    pub fn distinct(&mut self) -> Result<&mut Self, PlanError> {
        let arity = self.peek()?.arity();
        self.aggregate(ColumnSet::range(0, arity), None, vec![])
    }

    fn set_op(&mut self, kind: SetOpKind, all: bool, n: usize) -> Result<&mut Self, PlanError> {
        let inputs = self.pop_n(n)?;
        let set_op = RelExpr::set_op(kind, all, inputs)?;
        Ok(self.push(set_op))
    }

    /// Unions the top `n` expressions.
    pub fn union(&mut self, all: bool, n: usize) -> Result<&mut Self, PlanError> {
        self.set_op(SetOpKind::Union, all, n)
    }

    pub fn intersect(&mut self, all: bool, n: usize) -> Result<&mut Self, PlanError> {
        self.set_op(SetOpKind::Intersect, all, n)
    }

    /// Subtracts the upper `n - 1` expressions from the lowest of the top
    /// `n`.
    pub fn minus(&mut self, all: bool, n: usize) -> Result<&mut Self, PlanError> {
        self.set_op(SetOpKind::Minus, all, n)
    }

    pub fn sort(
        &mut self,
        order_by: Vec<ColumnOrder>,
        offset: usize,
        fetch: Option<usize>,
    ) -> Result<&mut Self, PlanError> {
        let input = self.pop()?;
        let sort = RelExpr::sort(input, order_by, offset, fetch)?;
        Ok(self.push(sort))
    }
}
