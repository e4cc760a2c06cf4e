// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Pushes predicates down through other operators.
//!
//! This action generally improves the quality of the query, in that
//! selective per-record filters reduce the volume of data before they arrive
//! at more expensive operators.

mod filter_aggregate;
mod filter_join;
mod filter_project;
mod filter_set_op;

pub use filter_aggregate::FilterAggregateTranspose;
pub use filter_join::{FilterIntoJoin, JoinConditionPush};
pub use filter_project::FilterProjectTranspose;
pub use filter_set_op::FilterSetOpTranspose;
