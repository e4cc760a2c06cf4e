// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Rules that move aggregation below filters and joins.
//!
//! Both rules split an aggregate into a partial aggregate computed closer to
//! the data and a top aggregate that recombines the partial results, using
//! the roll-up and split capabilities of each [`AggregateFunc`]. A call whose
//! function lacks the needed capability blocks the rewrite.
//!
//! [`AggregateFunc`]: relopt_expr::AggregateFunc

mod aggregate_filter;
mod aggregate_join;

pub use aggregate_filter::AggregateFilterTranspose;
pub use aggregate_join::AggregateJoinTranspose;
