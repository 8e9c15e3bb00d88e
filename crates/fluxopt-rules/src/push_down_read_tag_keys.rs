//! # Tag Keys Pushdown Rule
//!
//! `keys() |> keep(columns: ["_value"]) |> distinct()` lists the tag keys present in
//! a time range. The storage index can answer that directly, without reading a
//! single series.
//!
//! ```text
//! Before: ReadRange |> keys(column: c) |> keep(columns: [c]) |> distinct(column: c)
//! After:  ReadTagKeys(ReadRange, value_column: c)
//! ```
//!
//! Any filter already pushed into the `ReadRange` is carried over unchanged.
//!
//! ## Preconditions
//!
//! - The schema mutation is exactly one predicate-free `keep` of one column.
//! - That column is the `keys` output column.
//! - `distinct` runs on the same column.

use fluxopt_core::error::PlanResult;
use fluxopt_core::pattern::{Match, Pattern};
use fluxopt_core::plan::PlanGraph;
use fluxopt_core::rule::{Rewrite, Rule};
use fluxopt_core::spec::{Mutation, ProcedureKind, ProcedureSpec, ReadTagKeysSpec};

/// Replace a tag-keys listing with a `ReadTagKeys` storage call.
pub struct PushDownReadTagKeysRule;

impl Rule for PushDownReadTagKeysRule {
    fn name(&self) -> &str {
        "PushDownReadTagKeysRule"
    }

    fn pattern(&self) -> Pattern {
        // Match: distinct(schemaMutation(keys(ReadRange)))
        Pattern::new(
            ProcedureKind::Distinct,
            [Pattern::new(
                ProcedureKind::SchemaMutation,
                [Pattern::new(
                    ProcedureKind::Keys,
                    [Pattern::leaf(ProcedureKind::ReadRange)],
                )],
            )],
        )
    }

    fn rewrite(&self, graph: &mut PlanGraph, matched: &Match) -> PlanResult<Rewrite> {
        let ProcedureSpec::Distinct(distinct) = graph.spec(matched.root())? else {
            return Ok(Rewrite::Unchanged);
        };
        let ProcedureSpec::SchemaMutation(schema) = graph.spec(matched.node(1))? else {
            return Ok(Rewrite::Unchanged);
        };
        let ProcedureSpec::Keys(keys) = graph.spec(matched.node(2))? else {
            return Ok(Rewrite::Unchanged);
        };
        let ProcedureSpec::ReadRange(read) = graph.spec(matched.node(3))? else {
            return Ok(Rewrite::Unchanged);
        };

        // The mutation must keep exactly the keys column.
        let [Mutation::Keep {
            columns,
            predicate: None,
        }] = schema.mutations.as_slice()
        else {
            return Ok(Rewrite::Unchanged);
        };
        if columns.len() != 1 || columns[0] != keys.column || distinct.column != keys.column {
            return Ok(Rewrite::Unchanged);
        }

        let spec = ProcedureSpec::ReadTagKeys(ReadTagKeysSpec {
            read_range: read.clone(),
            value_column_name: keys.column.clone(),
        });
        Ok(Rewrite::Created(graph.create_node(spec)))
    }
}
