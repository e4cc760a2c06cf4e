// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Rules that narrow the inputs of an operator to the columns its consumers
//! read.

mod project_join;
mod project_window;

pub use project_join::ProjectJoinTranspose;
pub use project_window::ProjectWindowTranspose;
