// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Plain-text rendering of relational expressions.
//!
//! Conventions:
//! * One operator per line, inputs indented two spaces below their parent.
//! * Columns are referred to by position, e.g. `#4`.
//! * No trailing whitespace.

use std::fmt;

use itertools::Itertools;

use crate::relation::{RelExpr, RelKind};

impl fmt::Display for RelExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt_indented(self, 0, f)
    }
}

fn fmt_indented(expr: &RelExpr, depth: usize, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{:width$}", "", width = depth * 2)?;
    match expr.kind() {
        RelKind::Get { id } => writeln!(f, "Get {}", id)?,
        RelKind::Values { rows } if rows.is_empty() => writeln!(f, "Empty")?,
        RelKind::Values { rows } => writeln!(f, "Values {}", rows.iter().join(", "))?,
        RelKind::Filter { predicate, .. } => writeln!(f, "Filter {}", predicate)?,
        RelKind::Project { exprs, .. } => writeln!(f, "Project ({})", exprs.iter().join(", "))?,
        RelKind::Join {
            condition,
            kind,
            correlation_ids,
            ..
        } => {
            write!(f, "Join type={} on={}", kind, condition)?;
            if !correlation_ids.is_empty() {
                write!(f, " correlation=({})", correlation_ids.iter().join(", "))?;
            }
            writeln!(f)?;
        }
        RelKind::Aggregate {
            input,
            group_set,
            grouping_sets,
            aggregates,
        } => {
            write!(
                f,
                "Aggregate group_by=[{}]",
                group_set.iter().map(|c| format!("#{}", c)).join(", ")
            )?;
            if let Some(sets) = grouping_sets {
                write!(f, " grouping_sets=[{}]", sets.iter().join(", "))?;
            }
            if !aggregates.is_empty() {
                write!(f, " aggregates=[{}]", aggregates.iter().join(", "))?;
            }
            // Name the input columns the output is grouped on.
            if !group_set.is_empty() && input.arity() > 0 {
                write!(
                    f,
                    " keys=({})",
                    group_set
                        .iter()
                        .map(|c| input.desc().get_name(c).as_str().to_string())
                        .join(", ")
                )?;
            }
            writeln!(f)?;
        }
        RelKind::Window { groups, .. } => writeln!(f, "Window {}", groups.iter().join(" "))?,
        RelKind::Sort {
            order_by,
            offset,
            fetch,
            ..
        } => {
            write!(f, "Sort order_by=[{}]", order_by.iter().join(", "))?;
            if *offset > 0 {
                write!(f, " offset={}", offset)?;
            }
            if let Some(fetch) = fetch {
                write!(f, " fetch={}", fetch)?;
            }
            writeln!(f)?;
        }
        RelKind::SetOp { kind, all, .. } => {
            writeln!(f, "{}{}", kind, if *all { " all" } else { "" })?
        }
        RelKind::Subset { alternatives } => {
            writeln!(f, "Subset alternatives={}", alternatives.len())?
        }
    }
    for input in expr.inputs() {
        fmt_indented(input, depth + 1, f)?;
    }
    Ok(())
}
