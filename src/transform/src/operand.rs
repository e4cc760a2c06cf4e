// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Operand patterns that select the expressions a rule applies to.
//!
//! An [`Operand`] constrains the kind of a node, optionally tests it with a
//! predicate, and constrains its inputs. A successful match binds one
//! expression per operand, in pre-order: the matched root first, then the
//! bindings of each input operand in turn.

use std::fmt;

use relopt_expr::{NodeType, RelExpr};

/// How an operand constrains the inputs of the node it matches.
#[derive(Clone)]
enum Inputs {
    /// Inputs are not inspected or bound.
    Any,
    /// One operand per input, in order; the node must have exactly that many
    /// inputs.
    Exact(Vec<Operand>),
    /// Some input, whichever comes first, matches the operand.
    Unordered(Box<Operand>),
}

#[derive(Clone)]
pub struct Operand {
    node_type: Option<NodeType>,
    predicate: Option<fn(&RelExpr) -> bool>,
    inputs: Inputs,
}

impl Operand {
    /// Matches a node of the given kind with any inputs.
    pub fn of(node_type: NodeType) -> Operand {
        Operand {
            node_type: Some(node_type),
            predicate: None,
            inputs: Inputs::Any,
        }
    }

    /// Matches any node.
    pub fn any() -> Operand {
        Operand {
            node_type: None,
            predicate: None,
            inputs: Inputs::Any,
        }
    }

    /// Additionally requires `predicate` to hold of the node.
    pub fn with_predicate(mut self, predicate: fn(&RelExpr) -> bool) -> Operand {
        self.predicate = Some(predicate);
        self
    }

    /// Requires the inputs to match `inputs` one to one.
    pub fn with_inputs(mut self, inputs: Vec<Operand>) -> Operand {
        self.inputs = Inputs::Exact(inputs);
        self
    }

    /// Requires some input to match `input`.
    pub fn with_some_input(mut self, input: Operand) -> Operand {
        self.inputs = Inputs::Unordered(Box::new(input));
        self
    }

    /// Matches `expr` against this pattern, returning the bound expressions
    /// in pre-order.
    pub fn matches(&self, expr: &RelExpr) -> Option<Vec<RelExpr>> {
        let mut bindings = Vec::new();
        self.matches_into(expr, &mut bindings).then_some(bindings)
    }

    fn matches_into(&self, expr: &RelExpr, bindings: &mut Vec<RelExpr>) -> bool {
        if self.node_type.is_some_and(|t| t != expr.node_type()) {
            return false;
        }
        if self.predicate.is_some_and(|p| !p(expr)) {
            return false;
        }
        let mark = bindings.len();
        bindings.push(expr.clone());
        let matched = match &self.inputs {
            Inputs::Any => true,
            Inputs::Exact(operands) => {
                let inputs = expr.inputs();
                inputs.len() == operands.len()
                    && operands
                        .iter()
                        .zip(inputs)
                        .all(|(operand, input)| operand.matches_into(input, bindings))
            }
            Inputs::Unordered(operand) => expr.inputs().into_iter().any(|input| {
                let inner = bindings.len();
                let matched = operand.matches_into(input, bindings);
                if !matched {
                    bindings.truncate(inner);
                }
                matched
            }),
        };
        if !matched {
            bindings.truncate(mark);
        }
        matched
    }
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.node_type {
            Some(t) => write!(f, "{:?}", t)?,
            None => f.write_str("Any")?,
        }
        if self.predicate.is_some() {
            f.write_str("?")?;
        }
        match &self.inputs {
            Inputs::Any => Ok(()),
            Inputs::Exact(operands) => f.debug_list().entries(operands).finish(),
            Inputs::Unordered(operand) => write!(f, "[.., {:?}, ..]", operand),
        }
    }
}
