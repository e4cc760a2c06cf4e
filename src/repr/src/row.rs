// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::ops::Deref;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::Datum;

/// A packed sequence of [`Datum`]s.
///
/// Rows are the unit of data held by literal relations and produced by the
/// reference evaluator.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Row {
    datums: Vec<Datum>,
}

impl Row {
    /// Packs a sequence of datums into a row.
    pub fn pack<I, D>(iter: I) -> Row
    where
        I: IntoIterator<Item = D>,
        D: Into<Datum>,
    {
        Row {
            datums: iter.into_iter().map(Into::into).collect(),
        }
    }

    /// Unpacks this row into its datums.
    pub fn unpack(self) -> Vec<Datum> {
        self.datums
    }

    /// Returns a new row containing the datums at the given positions.
    ///
    /// # Panics
    ///
    /// Panics if any position is out of bounds.
    pub fn project(&self, columns: &[usize]) -> Row {
        Row {
            datums: columns.iter().map(|c| self.datums[*c].clone()).collect(),
        }
    }

    /// Returns the concatenation of two rows.
    pub fn concat(&self, other: &Row) -> Row {
        Row {
            datums: self.datums.iter().chain(&other.datums).cloned().collect(),
        }
    }
}

impl Deref for Row {
    type Target = [Datum];

    fn deref(&self) -> &[Datum] {
        &self.datums
    }
}

impl FromIterator<Datum> for Row {
    fn from_iter<T: IntoIterator<Item = Datum>>(iter: T) -> Self {
        Row {
            datums: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({})", self.datums.iter().join(", "))
    }
}
