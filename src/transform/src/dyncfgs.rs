// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Dyncfgs used by the optimizer.

use relopt_dyncfg::{Config, ConfigSet};

/// Whether filters above an outer join may turn it into a join that pads
/// fewer sides with nulls.
pub const OPTIMIZER_OUTER_JOIN_STRENGTHENING: Config<bool> = Config::new(
    "optimizer_outer_join_strengthening",
    true,
    "Whether filters that reject null-padded rows simplify outer joins \
        toward inner joins during predicate pushdown.",
);

/// Whether an inner join keeps only column equalities in its condition.
pub const OPTIMIZER_JOIN_CONDITION_EQUI_ONLY: Config<bool> = Config::new(
    "optimizer_join_condition_equi_only",
    false,
    "When enabled, conjuncts of an inner join condition that are not column \
        equalities are applied as a filter above the join.",
);

/// Whether the aggregate-join transposition may replace its top aggregate
/// with a projection.
pub const OPTIMIZER_AGGREGATE_JOIN_ELIDE_TOP_AGGREGATE: Config<bool> = Config::new(
    "optimizer_aggregate_join_elide_top_aggregate",
    false,
    "When enabled, pushing an aggregate through a join omits the top \
        aggregate if every join key is determined by the group key.",
);

pub const OPTIMIZER_FIXPOINT_LIMIT: Config<usize> = Config::new(
    "optimizer_fixpoint_limit",
    1000,
    "The maximum number of rewrites a fixpoint applies before giving up.",
);

pub const OPTIMIZER_DEFAULT_ROW_COUNT: Config<usize> = Config::new(
    "optimizer_default_row_count",
    100,
    "The row count assumed for collections without statistics.",
);

/// Adds the full set of all optimizer `Config`s.
pub fn all_dyncfgs(configs: ConfigSet) -> ConfigSet {
    configs
        .add(&OPTIMIZER_OUTER_JOIN_STRENGTHENING)
        .add(&OPTIMIZER_JOIN_CONDITION_EQUI_ONLY)
        .add(&OPTIMIZER_AGGREGATE_JOIN_ELIDE_TOP_AGGREGATE)
        .add(&OPTIMIZER_FIXPOINT_LIMIT)
        .add(&OPTIMIZER_DEFAULT_ROW_COUNT)
}
