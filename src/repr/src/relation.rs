// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::ScalarType;

/// The type of a [`Datum`](crate::Datum).
///
/// [`ColumnType`] bundles information about the scalar type of a datum (e.g.,
/// Int64 or String) with additional attributes, like its nullability.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
pub struct ColumnType {
    /// Whether this datum can be null.
    pub nullable: bool,
    /// The underlying scalar type (e.g., Int64 or String) of this column.
    pub scalar_type: ScalarType,
}

impl ColumnType {
    /// Consumes this `ColumnType` and returns a new `ColumnType` with its
    /// nullability set to the specified boolean.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Computes the least upper bound of two column types, or `None` if the
    /// scalar types differ.
    pub fn union(&self, other: &Self) -> Option<Self> {
        if self.scalar_type != other.scalar_type {
            return None;
        }
        Some(ColumnType {
            scalar_type: self.scalar_type,
            nullable: self.nullable || other.nullable,
        })
    }

    /// Reports whether a column of type `other` may stand in for a column of
    /// this type.
    ///
    /// The scalar types must agree. `other` may be non-nullable where `self`
    /// is nullable, but not the reverse.
    pub fn accepts(&self, other: &Self) -> bool {
        self.scalar_type == other.scalar_type && (self.nullable || !other.nullable)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?", self.scalar_type)
        } else {
            write!(f, "{}", self.scalar_type)
        }
    }
}

/// The type for a relation.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
pub struct RelationType {
    /// The type for each column, in order.
    pub column_types: Vec<ColumnType>,
    /// Sets of indices that are "keys" for the collection.
    ///
    /// Each element in this list is a set of column indices, each with the property
    /// that the collection contains at most one record with each distinct set of values
    /// for each column. An empty key means the collection has at most one record.
    pub keys: Vec<Vec<usize>>,
}

impl RelationType {
    /// Creates a relation type representing the relation with no columns.
    pub fn empty() -> Self {
        RelationType::new(vec![])
    }

    /// Creates a new instance from specified column types.
    pub fn new(column_types: Vec<ColumnType>) -> Self {
        RelationType {
            column_types,
            keys: Vec::new(),
        }
    }

    /// Adds a set of indices as keys for the collection.
    pub fn with_key(mut self, mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        if !self.keys.contains(&indices) {
            self.keys.push(indices);
        }
        self
    }

    /// Adds new keys for the collection.
    pub fn with_keys(mut self, keys: Vec<Vec<usize>>) -> Self {
        for key in keys {
            self = self.with_key(key)
        }
        self
    }

    /// Computes the number of columns in the relation.
    pub fn arity(&self) -> usize {
        self.column_types.len()
    }

    /// Reports whether some declared key is contained in `columns`.
    pub fn is_key_subset<'a, I>(&self, columns: I) -> bool
    where
        I: IntoIterator<Item = &'a usize>,
    {
        let columns: Vec<usize> = columns.into_iter().copied().collect();
        self.keys
            .iter()
            .any(|key| key.iter().all(|k| columns.contains(k)))
    }
}

/// The name of a column in a [`RelationDesc`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
pub struct ColumnName(String);

impl ColumnName {
    /// Returns this column name as a `str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ColumnName {
    fn from(s: String) -> ColumnName {
        ColumnName(s)
    }
}

impl From<&str> for ColumnName {
    fn from(s: &str) -> ColumnName {
        ColumnName(s.into())
    }
}

impl From<&ColumnName> for ColumnName {
    fn from(n: &ColumnName) -> ColumnName {
        n.clone()
    }
}

/// A complete relation description. Bundles together a `RelationType` with
/// the names of each column.
///
/// Names need not be unique; a join of two relations that both have an `id`
/// column has two columns named `id`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
pub struct RelationDesc {
    typ: RelationType,
    names: Vec<ColumnName>,
}

impl RelationDesc {
    /// Constructs a new `RelationDesc` that represents a relation with no
    /// columns and no keys.
    pub fn empty() -> RelationDesc {
        RelationDesc {
            typ: RelationType::empty(),
            names: vec![],
        }
    }

    /// Constructs a new `RelationDesc` from a `RelationType` and a list of
    /// column names.
    ///
    /// # Panics
    ///
    /// Panics if the number of names does not match the arity of `typ`.
    pub fn new<I, N>(typ: RelationType, names: I) -> RelationDesc
    where
        I: IntoIterator<Item = N>,
        N: Into<ColumnName>,
    {
        let names: Vec<_> = names.into_iter().map(Into::into).collect();
        assert_eq!(typ.column_types.len(), names.len());
        RelationDesc { typ, names }
    }

    /// Like [`RelationDesc::new`], but returns `None` on an arity mismatch.
    pub fn try_new(typ: RelationType, names: Vec<ColumnName>) -> Option<RelationDesc> {
        (typ.column_types.len() == names.len()).then_some(RelationDesc { typ, names })
    }

    /// Appends a named column of the specified type.
    pub fn with_column<N>(mut self, name: N, column_type: ColumnType) -> Self
    where
        N: Into<ColumnName>,
    {
        self.typ.column_types.push(column_type);
        self.names.push(name.into());
        self
    }

    /// Adds a set of indices as keys for the relation.
    pub fn with_key(mut self, indices: Vec<usize>) -> Self {
        self.typ = self.typ.with_key(indices);
        self
    }

    /// Adds several keys for the relation.
    pub fn with_keys(mut self, keys: Vec<Vec<usize>>) -> Self {
        self.typ = self.typ.with_keys(keys);
        self
    }

    /// Returns the relation type underlying this relation description.
    pub fn typ(&self) -> &RelationType {
        &self.typ
    }

    /// Returns the number of columns in this relation.
    pub fn arity(&self) -> usize {
        self.typ.arity()
    }

    /// Returns an iterator over the columns in this relation.
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnName, &ColumnType)> {
        self.iter_names().zip(self.iter_types())
    }

    /// Returns an iterator over the types of the columns in this relation.
    pub fn iter_types(&self) -> impl Iterator<Item = &ColumnType> {
        self.typ.column_types.iter()
    }

    /// Returns an iterator over the names of the columns in this relation.
    pub fn iter_names(&self) -> impl Iterator<Item = &ColumnName> {
        self.names.iter()
    }

    /// Finds a column by name.
    ///
    /// Returns the index and type of the first column with the given name.
    pub fn get_by_name(&self, name: &ColumnName) -> Option<(usize, &ColumnType)> {
        self.iter_names()
            .position(|n| n == name)
            .map(|i| (i, &self.typ.column_types[i]))
    }

    /// Gets the name of the `i`th column.
    ///
    /// # Panics
    ///
    /// Panics if `i` is not a valid column index.
    pub fn get_name(&self, i: usize) -> &ColumnName {
        &self.names[i]
    }

    /// Gets the type of the `i`th column.
    ///
    /// # Panics
    ///
    /// Panics if `i` is not a valid column index.
    pub fn get_type(&self, i: usize) -> &ColumnType {
        &self.typ.column_types[i]
    }

    /// Reports whether a relation described by `other` may replace a relation
    /// described by `self`.
    ///
    /// Names and scalar types must match exactly and in order. Nullability of
    /// `other` may only be narrower. Keys are not compared.
    pub fn accepts(&self, other: &RelationDesc) -> bool {
        self.names == other.names
            && self.arity() == other.arity()
            && self
                .iter_types()
                .zip_eq(other.iter_types())
                .all(|(mine, theirs)| mine.accepts(theirs))
    }
}

impl fmt::Display for RelationDesc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({})",
            self.iter()
                .map(|(name, typ)| format!("{}: {}", name, typ))
                .join(", ")
        )
    }
}
