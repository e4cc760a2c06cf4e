// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Groups of windowed aggregates sharing a partitioning and ordering.

use std::fmt;

use itertools::Itertools;
use relopt_repr::ColumnType;
use serde::{Deserialize, Serialize};

use crate::relation::ColumnOrder;
use crate::{AggregateCall, ColumnSet, Mapping, PlanError};

/// A set of aggregates evaluated over the same window.
///
/// With an empty `order_by` each aggregate covers its whole partition.
/// Otherwise it is a running aggregate over the rows of the partition that
/// sort at or before the current row, peers included.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct WindowGroup {
    pub partition_by: ColumnSet,
    pub order_by: Vec<ColumnOrder>,
    pub aggregates: Vec<AggregateCall>,
}

impl WindowGroup {
    pub fn new(
        partition_by: ColumnSet,
        order_by: Vec<ColumnOrder>,
        aggregates: Vec<AggregateCall>,
    ) -> WindowGroup {
        WindowGroup {
            partition_by,
            order_by,
            aggregates,
        }
    }

    /// Every input column the group reads.
    pub fn support(&self) -> ColumnSet {
        let mut support = self.partition_by.clone();
        support.extend(self.order_by.iter().map(|o| o.column));
        support.extend(self.aggregates.iter().flat_map(|a| a.args.iter().copied()));
        support
    }

    /// The types of the aggregates' outputs over an input of the given types.
    pub fn output_types(&self, input_types: &[ColumnType]) -> Result<Vec<ColumnType>, PlanError> {
        self.aggregates
            .iter()
            .map(|a| a.output_type(input_types, false))
            .collect()
    }

    /// Returns a copy with every input column reference carried through
    /// `mapping`.
    pub fn remap(&self, mapping: &Mapping) -> Result<WindowGroup, PlanError> {
        Ok(WindowGroup {
            partition_by: mapping.apply_set(&self.partition_by)?,
            order_by: self
                .order_by
                .iter()
                .map(|o| {
                    Ok(ColumnOrder {
                        column: mapping.try_target(o.column)?,
                        ..*o
                    })
                })
                .collect::<Result<_, PlanError>>()?,
            aggregates: self
                .aggregates
                .iter()
                .map(|a| a.remap(mapping))
                .collect::<Result<_, _>>()?,
        })
    }
}

impl fmt::Display for WindowGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "window(partition by {} order by [{}]: {})",
            self.partition_by,
            self.order_by.iter().join(", "),
            self.aggregates.iter().join(", ")
        )
    }
}
