// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Relational expressions.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use itertools::Itertools;
use relopt_repr::{
    ColumnName, ColumnType, GlobalId, RelationDesc, RelationType, Row, ScalarType,
};
use serde::{Deserialize, Serialize};

use crate::relation::aggregate::AggregateCall;
use crate::relation::join::{JoinInfo, JoinKind};
use crate::relation::window::WindowGroup;
use crate::{ColumnSet, PlanError, ScalarExpr};

pub mod aggregate;
pub mod builder;
pub mod join;
pub mod window;

/// Identifies a correlation variable introduced by a join.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub u32);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "$cor{}", self.0)
    }
}

/// One key of an ordering.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ColumnOrder {
    /// The column to order by.
    pub column: usize,
    /// Whether to sort in descending order.
    pub desc: bool,
    /// Whether to sort nulls after all other values.
    pub nulls_last: bool,
}

impl ColumnOrder {
    pub fn asc(column: usize) -> ColumnOrder {
        ColumnOrder {
            column,
            desc: false,
            nulls_last: true,
        }
    }

    pub fn desc(column: usize) -> ColumnOrder {
        ColumnOrder {
            column,
            desc: true,
            nulls_last: false,
        }
    }
}

impl fmt::Display for ColumnOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "#{} {} nulls_{}",
            self.column,
            if self.desc { "desc" } else { "asc" },
            if self.nulls_last { "last" } else { "first" }
        )
    }
}

/// Physical properties of a relation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TraitSet {
    /// The order in which rows are produced, if any.
    pub collation: Vec<ColumnOrder>,
}

impl fmt::Display for TraitSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self.collation.iter().join(", "))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum SetOpKind {
    Union,
    Intersect,
    Minus,
}

impl fmt::Display for SetOpKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            SetOpKind::Union => "Union",
            SetOpKind::Intersect => "Intersect",
            SetOpKind::Minus => "Minus",
        })
    }
}

/// The kind of a relational operator, without its payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Get,
    Values,
    Filter,
    Project,
    Join,
    Aggregate,
    Window,
    Sort,
    SetOp,
    Subset,
}

/// The operator-specific payload of a relational expression.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum RelKind {
    /// Read a named collection.
    Get {
        /// The collection to read.
        id: GlobalId,
    },
    /// A literal collection.
    Values {
        /// The rows of the collection.
        rows: Vec<Row>,
    },
    /// Keep the rows for which a predicate is true.
    Filter {
        /// The source collection.
        input: RelExpr,
        /// The predicate, over the columns of `input`.
        predicate: ScalarExpr,
    },
    /// Compute one output column per expression.
    Project {
        /// The source collection.
        input: RelExpr,
        /// Expressions over the columns of `input`.
        exprs: Vec<ScalarExpr>,
    },
    /// Join two collections.
    ///
    /// The condition references the left columns followed by the right
    /// columns.
    Join {
        left: RelExpr,
        right: RelExpr,
        condition: ScalarExpr,
        kind: JoinKind,
        /// Correlation variables set by the left input and read by the
        /// right input.
        correlation_ids: BTreeSet<CorrelationId>,
    },
    /// Group rows and compute aggregates per group.
    ///
    /// Outputs the columns of `group_set` in ascending order followed by one
    /// column per aggregate call.
    Aggregate {
        input: RelExpr,
        group_set: ColumnSet,
        /// Subsets of `group_set` to group by, each producing its own rows.
        /// Columns absent from a grouping set are null in that set's rows.
        /// `None` means `group_set` alone.
        grouping_sets: Option<Vec<ColumnSet>>,
        aggregates: Vec<AggregateCall>,
    },
    /// Append windowed aggregates to each row.
    Window {
        input: RelExpr,
        groups: Vec<WindowGroup>,
    },
    /// Order rows, optionally skipping and limiting them.
    Sort {
        input: RelExpr,
        order_by: Vec<ColumnOrder>,
        offset: usize,
        fetch: Option<usize>,
    },
    /// A set operation over inputs of identical arity.
    ///
    /// With `all` unset, duplicates are eliminated.
    SetOp {
        kind: SetOpKind,
        all: bool,
        inputs: Vec<RelExpr>,
    },
    /// A set of equivalent alternatives, any of which may be chosen.
    Subset { alternatives: Vec<RelExpr> },
}

#[derive(Debug, Eq, PartialEq, Hash)]
struct RelNode {
    kind: RelKind,
    desc: RelationDesc,
    traits: TraitSet,
}

/// An immutable, shareable relational expression.
///
/// Cloning a `RelExpr` is cheap and yields a handle to the same node. Every
/// constructor validates its payload against its inputs and derives the
/// output schema, so a `RelExpr` always describes the rows its payload
/// produces.
#[derive(Clone)]
pub struct RelExpr(Arc<RelNode>);

impl PartialEq for RelExpr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for RelExpr {}

impl Hash for RelExpr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Debug for RelExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.0.kind, f)
    }
}

fn check_column(column: usize, arity: usize) -> Result<(), PlanError> {
    if column < arity {
        Ok(())
    } else {
        Err(PlanError::ColumnOutOfRange { column, arity })
    }
}

fn check_predicate(predicate: &ScalarExpr, types: &[ColumnType]) -> Result<(), PlanError> {
    let typ = predicate.typ(types)?;
    if typ.scalar_type == ScalarType::Bool {
        Ok(())
    } else {
        Err(PlanError::NonBooleanPredicate(typ))
    }
}

impl RelExpr {
    fn new(kind: RelKind, desc: RelationDesc, traits: TraitSet) -> RelExpr {
        RelExpr(Arc::new(RelNode { kind, desc, traits }))
    }

    /// Reads the collection `id`, whose rows are described by `desc`.
    pub fn get(id: GlobalId, desc: RelationDesc) -> RelExpr {
        RelExpr::new(RelKind::Get { id }, desc, TraitSet::default())
    }

    /// A literal collection.
    ///
    /// Keys declared in `desc` are discarded; a collection of at most one
    /// row is keyed by the empty set.
    pub fn values(rows: Vec<Row>, desc: RelationDesc) -> Result<RelExpr, PlanError> {
        for row in &rows {
            if row.len() != desc.arity() {
                return Err(PlanError::ArityMismatch {
                    context: "values",
                    expected: desc.arity(),
                    actual: row.len(),
                });
            }
            for (datum, typ) in row.iter().zip_eq(desc.iter_types()) {
                if !datum.is_instance_of(typ) {
                    return Err(PlanError::InvalidRow(format!(
                        "{} is not an instance of {}",
                        datum, typ
                    )));
                }
            }
        }
        let mut typ = RelationType::new(desc.iter_types().cloned().collect());
        if rows.len() <= 1 {
            typ = typ.with_key(vec![]);
        }
        let desc = RelationDesc::new(typ, desc.iter_names().cloned());
        Ok(RelExpr::new(
            RelKind::Values { rows },
            desc,
            TraitSet::default(),
        ))
    }

    /// The collection with no rows and the columns of `desc`.
    pub fn empty(desc: RelationDesc) -> RelExpr {
        let typ = RelationType::new(desc.iter_types().cloned().collect()).with_key(vec![]);
        let desc = RelationDesc::new(typ, desc.iter_names().cloned());
        RelExpr::new(
            RelKind::Values { rows: vec![] },
            desc,
            TraitSet::default(),
        )
    }

    pub fn filter(input: RelExpr, predicate: ScalarExpr) -> Result<RelExpr, PlanError> {
        check_predicate(&predicate, &input.typ().column_types)?;
        let desc = input.desc().clone();
        let traits = input.traits().clone();
        Ok(RelExpr::new(
            RelKind::Filter { input, predicate },
            desc,
            traits,
        ))
    }

    /// Computes `exprs` over each row of `input`, naming the outputs `names`.
    pub fn project(
        input: RelExpr,
        exprs: Vec<ScalarExpr>,
        names: Vec<ColumnName>,
    ) -> Result<RelExpr, PlanError> {
        if exprs.len() != names.len() {
            return Err(PlanError::ArityMismatch {
                context: "project names",
                expected: exprs.len(),
                actual: names.len(),
            });
        }
        let input_types = &input.typ().column_types;
        let column_types = exprs
            .iter()
            .map(|e| e.typ(input_types))
            .collect::<Result<Vec<_>, _>>()?;
        // A key survives if each of its columns is passed through unchanged.
        let keys = input
            .typ()
            .keys
            .iter()
            .filter_map(|key| {
                key.iter()
                    .map(|k| exprs.iter().position(|e| e.as_column() == Some(*k)))
                    .collect::<Option<Vec<_>>>()
            })
            .collect();
        let desc = RelationDesc::new(RelationType::new(column_types).with_keys(keys), names);
        Ok(RelExpr::new(
            RelKind::Project { input, exprs },
            desc,
            TraitSet::default(),
        ))
    }

    pub fn join(
        left: RelExpr,
        right: RelExpr,
        condition: ScalarExpr,
        kind: JoinKind,
    ) -> Result<RelExpr, PlanError> {
        RelExpr::join_correlated(left, right, condition, kind, BTreeSet::new())
    }

    pub fn join_correlated(
        left: RelExpr,
        right: RelExpr,
        condition: ScalarExpr,
        kind: JoinKind,
        correlation_ids: BTreeSet<CorrelationId>,
    ) -> Result<RelExpr, PlanError> {
        let left_arity = left.arity();
        let combined: Vec<ColumnType> = left
            .desc()
            .iter_types()
            .chain(right.desc().iter_types())
            .cloned()
            .collect();
        check_predicate(&condition, &combined)?;

        let desc = if kind.projects_right() {
            let mut column_types = Vec::with_capacity(combined.len());
            for (i, typ) in combined.into_iter().enumerate() {
                let padded = if i < left_arity {
                    kind.generates_nulls_on_left()
                } else {
                    kind.generates_nulls_on_right()
                };
                column_types.push(if padded { typ.nullable(true) } else { typ });
            }
            let mut keys = Vec::new();
            for lk in &left.typ().keys {
                for rk in &right.typ().keys {
                    let key = lk
                        .iter()
                        .copied()
                        .chain(rk.iter().map(|k| k + left_arity))
                        .collect();
                    keys.push(key);
                }
            }
            // Matching at most one row on the other side preserves keys.
            let info = JoinInfo::of(&condition, left_arity);
            if matches!(kind, JoinKind::Inner | JoinKind::Left)
                && right.typ().is_key_subset(&info.right_keys)
            {
                keys.extend(left.typ().keys.iter().cloned());
            }
            if matches!(kind, JoinKind::Inner | JoinKind::Right)
                && left.typ().is_key_subset(&info.left_keys)
            {
                keys.extend(
                    right
                        .typ()
                        .keys
                        .iter()
                        .map(|k| k.iter().map(|c| c + left_arity).collect()),
                );
            }
            let names = left
                .desc()
                .iter_names()
                .chain(right.desc().iter_names())
                .cloned();
            RelationDesc::new(RelationType::new(column_types).with_keys(keys), names)
        } else {
            left.desc().clone()
        };
        Ok(RelExpr::new(
            RelKind::Join {
                left,
                right,
                condition,
                kind,
                correlation_ids,
            },
            desc,
            TraitSet::default(),
        ))
    }

    pub fn aggregate(
        input: RelExpr,
        group_set: ColumnSet,
        grouping_sets: Option<Vec<ColumnSet>>,
        aggregates: Vec<AggregateCall>,
    ) -> Result<RelExpr, PlanError> {
        let arity = input.arity();
        for c in group_set.iter() {
            check_column(c, arity)?;
        }
        let grouping_sets = match grouping_sets {
            Some(mut sets) => {
                if let Some(bad) = sets.iter().find(|s| !s.is_subset(&group_set)) {
                    return Err(PlanError::InvalidAggregate(format!(
                        "grouping set {} is not a subset of {}",
                        bad, group_set
                    )));
                }
                sets.sort();
                sets.dedup();
                if sets.is_empty() {
                    return Err(PlanError::InvalidAggregate("no grouping sets".into()));
                }
                if sets.len() == 1 && sets[0] == group_set {
                    None
                } else {
                    Some(sets)
                }
            }
            None => None,
        };
        let empty_group = match &grouping_sets {
            Some(sets) => sets.iter().any(|s| s.is_empty()),
            None => group_set.is_empty(),
        };
        let input_types = &input.typ().column_types;
        let mut column_types = Vec::with_capacity(group_set.len() + aggregates.len());
        let mut names = Vec::with_capacity(column_types.capacity());
        for c in group_set.iter() {
            let in_all = grouping_sets
                .as_ref()
                .map_or(true, |sets| sets.iter().all(|s| s.contains(c)));
            let typ = input_types[c].clone();
            column_types.push(if in_all { typ } else { typ.nullable(true) });
            names.push(input.desc().get_name(c).clone());
        }
        for call in &aggregates {
            column_types.push(call.output_type(input_types, empty_group)?);
            names.push(call.name.clone());
        }
        let mut typ = RelationType::new(column_types);
        if grouping_sets.is_none() {
            typ = typ.with_key((0..group_set.len()).collect());
        }
        Ok(RelExpr::new(
            RelKind::Aggregate {
                input,
                group_set,
                grouping_sets,
                aggregates,
            },
            RelationDesc::new(typ, names),
            TraitSet::default(),
        ))
    }

    pub fn window(input: RelExpr, groups: Vec<WindowGroup>) -> Result<RelExpr, PlanError> {
        let arity = input.arity();
        let mut desc = input.desc().clone();
        for group in &groups {
            for c in group.support().iter() {
                check_column(c, arity)?;
            }
            for (call, typ) in group
                .aggregates
                .iter()
                .zip_eq(group.output_types(&input.typ().column_types)?)
            {
                desc = desc.with_column(call.name.clone(), typ);
            }
        }
        Ok(RelExpr::new(
            RelKind::Window { input, groups },
            desc,
            TraitSet::default(),
        ))
    }

    pub fn sort(
        input: RelExpr,
        order_by: Vec<ColumnOrder>,
        offset: usize,
        fetch: Option<usize>,
    ) -> Result<RelExpr, PlanError> {
        for o in &order_by {
            check_column(o.column, input.arity())?;
        }
        let desc = input.desc().clone();
        let traits = TraitSet {
            collation: order_by.clone(),
        };
        Ok(RelExpr::new(
            RelKind::Sort {
                input,
                order_by,
                offset,
                fetch,
            },
            desc,
            traits,
        ))
    }

    pub fn set_op(kind: SetOpKind, all: bool, inputs: Vec<RelExpr>) -> Result<RelExpr, PlanError> {
        let Some((first, rest)) = inputs.split_first() else {
            return Err(PlanError::Invalid(format!("{} without inputs", kind)));
        };
        if rest.is_empty() {
            return Err(PlanError::Invalid(format!("{} of a single input", kind)));
        }
        let mut column_types = first.typ().column_types.clone();
        for input in rest {
            if input.arity() != first.arity() {
                return Err(PlanError::ArityMismatch {
                    context: "set operation",
                    expected: first.arity(),
                    actual: input.arity(),
                });
            }
            for (typ, other) in column_types.iter_mut().zip_eq(input.desc().iter_types()) {
                let merged = typ.union(other).ok_or(PlanError::IncompatibleTypes {
                    context: "set operation",
                    left: typ.scalar_type,
                    right: other.scalar_type,
                })?;
                *typ = match kind {
                    SetOpKind::Union => merged,
                    SetOpKind::Intersect => typ.clone().nullable(typ.nullable && other.nullable),
                    SetOpKind::Minus => typ.clone(),
                };
            }
        }
        let mut typ = RelationType::new(column_types);
        if !all {
            typ = typ.with_key((0..first.arity()).collect());
        }
        let desc = RelationDesc::new(typ, first.desc().iter_names().cloned());
        Ok(RelExpr::new(
            RelKind::SetOp { kind, all, inputs },
            desc,
            TraitSet::default(),
        ))
    }

    /// A set of alternatives for the same rows. The first alternative
    /// determines the schema.
    pub fn subset(alternatives: Vec<RelExpr>) -> Result<RelExpr, PlanError> {
        let first = alternatives
            .first()
            .ok_or_else(|| PlanError::Invalid("subset without alternatives".into()))?;
        for alt in &alternatives[1..] {
            let compatible = alt.arity() == first.arity()
                && alt
                    .desc()
                    .iter_types()
                    .zip_eq(first.desc().iter_types())
                    .all(|(a, f)| a.scalar_type == f.scalar_type);
            if !compatible {
                return Err(PlanError::Invalid(format!(
                    "subset alternative {} does not match {}",
                    alt.desc(),
                    first.desc()
                )));
            }
        }
        let desc = first.desc().clone();
        let traits = first.traits().clone();
        Ok(RelExpr::new(
            RelKind::Subset { alternatives },
            desc,
            traits,
        ))
    }

    pub fn kind(&self) -> &RelKind {
        &self.0.kind
    }

    /// The names, types and keys of the output columns.
    pub fn desc(&self) -> &RelationDesc {
        &self.0.desc
    }

    pub fn typ(&self) -> &RelationType {
        self.0.desc.typ()
    }

    pub fn arity(&self) -> usize {
        self.0.desc.arity()
    }

    pub fn traits(&self) -> &TraitSet {
        &self.0.traits
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind() {
            RelKind::Get { .. } => NodeType::Get,
            RelKind::Values { .. } => NodeType::Values,
            RelKind::Filter { .. } => NodeType::Filter,
            RelKind::Project { .. } => NodeType::Project,
            RelKind::Join { .. } => NodeType::Join,
            RelKind::Aggregate { .. } => NodeType::Aggregate,
            RelKind::Window { .. } => NodeType::Window,
            RelKind::Sort { .. } => NodeType::Sort,
            RelKind::SetOp { .. } => NodeType::SetOp,
            RelKind::Subset { .. } => NodeType::Subset,
        }
    }

    /// The direct inputs of this expression, in order.
    pub fn inputs(&self) -> Vec<&RelExpr> {
        match self.kind() {
            RelKind::Get { .. } | RelKind::Values { .. } => vec![],
            RelKind::Filter { input, .. }
            | RelKind::Project { input, .. }
            | RelKind::Aggregate { input, .. }
            | RelKind::Window { input, .. }
            | RelKind::Sort { input, .. } => vec![input],
            RelKind::Join { left, right, .. } => vec![left, right],
            RelKind::SetOp { inputs, .. } => inputs.iter().collect(),
            RelKind::Subset { alternatives } => alternatives.iter().collect(),
        }
    }

    /// Rebuilds this expression over new inputs, keeping its payload and
    /// re-deriving its schema.
    pub fn with_inputs(&self, inputs: Vec<RelExpr>) -> Result<RelExpr, PlanError> {
        let expected = self.inputs().len();
        if inputs.len() != expected {
            return Err(PlanError::ArityMismatch {
                context: "inputs",
                expected,
                actual: inputs.len(),
            });
        }
        let mut inputs = inputs.into_iter();
        let mut next = || {
            inputs
                .next()
                .ok_or_else(|| PlanError::Invalid("missing input".into()))
        };
        match self.kind() {
            RelKind::Get { .. } | RelKind::Values { .. } => Ok(self.clone()),
            RelKind::Filter { predicate, .. } => RelExpr::filter(next()?, predicate.clone()),
            RelKind::Project { exprs, .. } => RelExpr::project(
                next()?,
                exprs.clone(),
                self.desc().iter_names().cloned().collect(),
            ),
            RelKind::Join {
                condition,
                kind,
                correlation_ids,
                ..
            } => {
                let left = next()?;
                let right = next()?;
                RelExpr::join_correlated(
                    left,
                    right,
                    condition.clone(),
                    *kind,
                    correlation_ids.clone(),
                )
            }
            RelKind::Aggregate {
                group_set,
                grouping_sets,
                aggregates,
                ..
            } => RelExpr::aggregate(
                next()?,
                group_set.clone(),
                grouping_sets.clone(),
                aggregates.clone(),
            ),
            RelKind::Window { groups, .. } => RelExpr::window(next()?, groups.clone()),
            RelKind::Sort {
                order_by,
                offset,
                fetch,
                ..
            } => RelExpr::sort(next()?, order_by.clone(), *offset, *fetch),
            RelKind::SetOp { kind, all, .. } => {
                RelExpr::set_op(*kind, *all, (0..expected).map(|_| next()).try_collect()?)
            }
            RelKind::Subset { .. } => {
                RelExpr::subset((0..expected).map(|_| next()).try_collect()?)
            }
        }
    }

    /// Visits this expression and then its inputs, depth first.
    pub fn visit_pre<F>(&self, f: &mut F)
    where
        F: FnMut(&RelExpr),
    {
        f(self);
        for input in self.inputs() {
            input.visit_pre(f);
        }
    }

    /// Reports whether this is a literal collection without rows.
    pub fn is_empty_values(&self) -> bool {
        matches!(self.kind(), RelKind::Values { rows } if rows.is_empty())
    }

    /// Reports whether this and `other` are the same node.
    pub fn ptr_eq(&self, other: &RelExpr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
