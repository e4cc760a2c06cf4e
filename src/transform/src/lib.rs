// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Transformations for relational expressions.
//!
//! This crate contains the rewrite rules of the optimizer and the bushy join
//! order heuristic. Every rule implements [`Rule`]: it declares an
//! [`Operand`] pattern, and when an expression matches, its `fire` method
//! inspects the bound expressions and registers zero or more equivalent
//! replacements through a [`RuleCall`]. Rules never modify the expressions
//! they are given.
//!
//! Choosing which rules to fire where is up to the caller. [`Fixpoint`] is a
//! simple driver that applies a list of rules until none of them fires.

#![deny(missing_debug_implementations)]

use std::fmt;

use relopt_dyncfg::ConfigSet;
use relopt_expr::{PlanError, RelBuilder, RelExpr};
use relopt_repr::RelationDesc;
use tracing::{error, trace, warn};

pub mod aggregate_pushdown;
pub mod column_pruning;
pub mod dyncfgs;
pub mod empty_propagation;
pub mod fusion;
pub mod join_order;
pub mod operand;
pub mod predicate_pushdown;
pub mod statistics;

pub use operand::Operand;
pub use statistics::{DefaultStatistics, Statistics};

/// A rewrite rule.
pub trait Rule: fmt::Debug + Send + Sync {
    /// A name for the rule, used in logs and errors.
    fn name(&self) -> &'static str;

    /// The pattern of expressions this rule applies to.
    fn operand(&self) -> Operand;

    /// Proposes replacements for the expressions bound by a match of
    /// [`Rule::operand`].
    ///
    /// Declining is not an error: a rule that does not apply registers
    /// nothing and returns `Ok(())`. An `Err` means the rule attempted to
    /// build an invalid expression.
    fn fire(&self, call: &mut RuleCall) -> Result<(), TransformError>;
}

/// Read-only state shared by all rule firings.
#[derive(Debug, Clone, Copy)]
pub struct TransformCtx<'a> {
    /// Estimates about expressions.
    pub stats: &'a dyn Statistics,
    /// Optimizer configuration; see [`dyncfgs`].
    pub config: &'a ConfigSet,
}

impl<'a> TransformCtx<'a> {
    pub fn new(stats: &'a dyn Statistics, config: &'a ConfigSet) -> TransformCtx<'a> {
        TransformCtx { stats, config }
    }
}

/// A single firing of a rule on a matched expression.
#[derive(Debug)]
pub struct RuleCall<'a> {
    rule: &'static str,
    bindings: Vec<RelExpr>,
    ctx: TransformCtx<'a>,
    results: Vec<RelExpr>,
}

impl<'a> RuleCall<'a> {
    pub fn new(rule: &'static str, bindings: Vec<RelExpr>, ctx: TransformCtx<'a>) -> RuleCall<'a> {
        RuleCall {
            rule,
            bindings,
            ctx,
            results: Vec::new(),
        }
    }

    /// The `i`th bound expression, in pre-order of the rule's operand. The
    /// matched root is `rel(0)`.
    ///
    /// # Panics
    ///
    /// Panics if the operand binds fewer than `i + 1` expressions.
    pub fn rel(&self, i: usize) -> &RelExpr {
        &self.bindings[i]
    }

    pub fn ctx(&self) -> &TransformCtx<'a> {
        &self.ctx
    }

    pub fn stats(&self) -> &'a dyn Statistics {
        self.ctx.stats
    }

    pub fn config(&self) -> &'a ConfigSet {
        self.ctx.config
    }

    /// A fresh builder for assembling a replacement.
    pub fn builder(&self) -> RelBuilder {
        RelBuilder::new()
    }

    /// Registers `replacement` as equivalent to the matched root.
    ///
    /// A replacement identical to the root is dropped. A replacement with a
    /// different schema is a bug in the rule and is reported as an error.
    pub fn transform_to(&mut self, replacement: RelExpr) -> Result<(), TransformError> {
        let original = &self.bindings[0];
        if !original.desc().accepts(replacement.desc()) {
            warn!(
                rule = self.rule,
                expected = %original.desc(),
                actual = %replacement.desc(),
                "rule changed the schema of its match"
            );
            return Err(TransformError::SchemaMismatch {
                rule: self.rule,
                expected: original.desc().clone(),
                actual: replacement.desc().clone(),
            });
        }
        if replacement == *original {
            trace!(rule = self.rule, "dropping replacement identical to the match");
            return Ok(());
        }
        self.results.push(replacement);
        Ok(())
    }

    /// Records that the rule does not apply.
    pub fn decline(&self, reason: &str) {
        trace!(rule = self.rule, reason, "rule declined");
    }

    /// The replacements registered so far.
    pub fn results(&self) -> &[RelExpr] {
        &self.results
    }

    pub fn into_results(self) -> Vec<RelExpr> {
        self.results
    }
}

/// Matches `rule` against `expr` and fires it on a match, returning the
/// proposed replacements.
pub fn apply_rule(
    rule: &dyn Rule,
    expr: &RelExpr,
    ctx: TransformCtx,
) -> Result<Vec<RelExpr>, TransformError> {
    let Some(bindings) = rule.operand().matches(expr) else {
        return Ok(vec![]);
    };
    let span = tracing::trace_span!(target: "optimizer", "fire", rule = rule.name());
    let _guard = span.enter();
    let mut call = RuleCall::new(rule.name(), bindings, ctx);
    rule.fire(&mut call)?;
    let results = call.into_results();
    trace!(count = results.len(), "rule fired");
    Ok(results)
}

/// Errors that can occur during a transformation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransformError {
    /// An unstructured error.
    #[error("internal transform error: {0}")]
    Internal(String),
    /// A rule built an invalid expression.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// A rule proposed a replacement whose schema differs from its match.
    #[error("rule {rule} changed the schema from {expected} to {actual}")]
    SchemaMismatch {
        rule: &'static str,
        expected: RelationDesc,
        actual: RelationDesc,
    },
    /// A fixpoint did not converge.
    #[error("fixpoint looped too many times (limit {limit})")]
    FixpointLimit { limit: usize },
}

/// A sequence of rules applied until none of them fires.
///
/// Each step fires the first rule that produces a replacement at the
/// shallowest, leftmost expression where any rule does, and keeps the first
/// replacement.
#[derive(Debug)]
pub struct Fixpoint {
    rules: Vec<Box<dyn Rule>>,
}

impl Fixpoint {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Fixpoint {
        Fixpoint { rules }
    }

    /// Rewrites `expr` until no rule fires, or fails after
    /// [`dyncfgs::OPTIMIZER_FIXPOINT_LIMIT`] rewrites.
    #[tracing::instrument(
        target = "optimizer",
        level = "trace",
        skip_all,
        fields(path.segment = "fixpoint")
    )]
    pub fn optimize(&self, expr: RelExpr, ctx: TransformCtx) -> Result<RelExpr, TransformError> {
        let limit = dyncfgs::OPTIMIZER_FIXPOINT_LIMIT.get(ctx.config);
        let mut expr = expr;
        for _ in 0..limit {
            match self.step(&expr, ctx)? {
                Some(next) => expr = next,
                None => return Ok(expr),
            }
        }
        if self.step(&expr, ctx)?.is_none() {
            return Ok(expr);
        }
        error!(limit, "fixpoint looped too many times\n{}", expr);
        Err(TransformError::FixpointLimit { limit })
    }

    fn step(&self, expr: &RelExpr, ctx: TransformCtx) -> Result<Option<RelExpr>, TransformError> {
        for rule in &self.rules {
            if let Some(replacement) = apply_rule(rule.as_ref(), expr, ctx)?.into_iter().next() {
                return Ok(Some(replacement));
            }
        }
        let inputs = expr.inputs();
        for (i, input) in inputs.iter().enumerate() {
            if let Some(replacement) = self.step(input, ctx)? {
                let mut new_inputs: Vec<RelExpr> = inputs.iter().map(|e| (*e).clone()).collect();
                new_inputs[i] = replacement;
                return Ok(Some(expr.with_inputs(new_inputs)?));
            }
        }
        Ok(None)
    }
}
