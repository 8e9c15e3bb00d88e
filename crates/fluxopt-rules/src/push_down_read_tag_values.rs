//! # Tag Values Pushdown Rule
//!
//! `group() |> distinct(column: tag)` over a read lists the values of one tag, which
//! the storage index answers directly.
//!
//! ```text
//! Before: ReadRange |> keep/drop(...) |> group() |> distinct(column: tag)
//! After:  ReadTagValues(ReadRange, tag_key: tag)
//! ```
//!
//! ## Preconditions
//!
//! - `group` puts every row in one table: mode `by` with no keys.
//! - The distinct column is a tag, not one of `_time`, `_value`, `_start`, `_stop`.
//! - The schema mutations are predicate-free `keep`s and `drop`s, and the tag column
//!   survives all of them. Once a mutation removes the tag it cannot come back.

use fluxopt_core::error::PlanResult;
use fluxopt_core::pattern::{Match, Pattern};
use fluxopt_core::plan::PlanGraph;
use fluxopt_core::rule::{Rewrite, Rule};
use fluxopt_core::spec::{
    GroupMode, Mutation, ProcedureKind, ProcedureSpec, ReadTagValuesSpec, DEFAULT_VALUE_COLUMN,
    RESERVED_COLUMNS,
};
use tracing::trace;

/// Replace a tag-values listing with a `ReadTagValues` storage call.
pub struct PushDownReadTagValuesRule;

impl Rule for PushDownReadTagValuesRule {
    fn name(&self) -> &str {
        "PushDownReadTagValuesRule"
    }

    fn pattern(&self) -> Pattern {
        // Match: distinct(group(schemaMutation(ReadRange)))
        Pattern::new(
            ProcedureKind::Distinct,
            [Pattern::new(
                ProcedureKind::Group,
                [Pattern::new(
                    ProcedureKind::SchemaMutation,
                    [Pattern::leaf(ProcedureKind::ReadRange)],
                )],
            )],
        )
    }

    fn rewrite(&self, graph: &mut PlanGraph, matched: &Match) -> PlanResult<Rewrite> {
        let ProcedureSpec::Distinct(distinct) = graph.spec(matched.root())? else {
            return Ok(Rewrite::Unchanged);
        };
        let ProcedureSpec::Group(group) = graph.spec(matched.node(1))? else {
            return Ok(Rewrite::Unchanged);
        };
        let ProcedureSpec::SchemaMutation(schema) = graph.spec(matched.node(2))? else {
            return Ok(Rewrite::Unchanged);
        };
        let ProcedureSpec::ReadRange(read) = graph.spec(matched.node(3))? else {
            return Ok(Rewrite::Unchanged);
        };

        if group.mode != GroupMode::By || !group.keys.is_empty() {
            return Ok(Rewrite::Unchanged);
        }

        let tag_key = distinct.column.as_str();
        if !is_valid_tag_key(tag_key) {
            return Ok(Rewrite::Unchanged);
        }

        let Some(columns) = track_columns(&schema.mutations, tag_key) else {
            return Ok(Rewrite::Unchanged);
        };
        trace!(
            "tag values of '{}' from node {} (value column kept: {})",
            tag_key,
            matched.node(3),
            columns.value
        );

        let spec = ProcedureSpec::ReadTagValues(ReadTagValuesSpec {
            read_range: read.clone(),
            tag_key: tag_key.to_string(),
        });
        Ok(Rewrite::Created(graph.create_node(spec)))
    }
}

fn is_valid_tag_key(key: &str) -> bool {
    !RESERVED_COLUMNS.contains(&key)
}

/// Which of the interesting columns survive a mutation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    tag_key: bool,
    value: bool,
}

/// Walk `mutations` in order. Returns `None` when a mutation cannot be followed or
/// the tag key does not survive.
fn track_columns(mutations: &[Mutation], tag_key: &str) -> Option<Columns> {
    let mut state = Columns {
        tag_key: true,
        value: true,
    };
    for mutation in mutations {
        if !state.tag_key {
            return None;
        }
        match mutation {
            Mutation::Keep {
                columns,
                predicate: None,
            } => {
                state.tag_key = columns.iter().any(|c| c == tag_key);
                state.value = columns.iter().any(|c| c == DEFAULT_VALUE_COLUMN);
            }
            Mutation::Drop {
                columns,
                predicate: None,
            } => {
                for column in columns {
                    if column == tag_key {
                        state.tag_key = false;
                    } else if column == DEFAULT_VALUE_COLUMN {
                        state.value = false;
                    }
                }
            }
            _ => return None,
        }
    }
    state.tag_key.then_some(state)
}
