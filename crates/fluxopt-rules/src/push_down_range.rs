//! # Range Pushdown Rule
//!
//! Every storage query starts with `from(bucket: ...) |> range(...)`. On its own,
//! `from` would stream the whole bucket into the engine; this rule turns the pair
//! into a single storage read bounded by the requested time range.
//!
//! ```text
//! Before: from(bucket) |> range(start, stop)
//! After:  ReadRange(bucket, [start, stop])
//! ```
//!
//! The rule is unconditional. It must fire before the other storage rules, all of
//! which match on `ReadRange`.

use fluxopt_core::error::PlanResult;
use fluxopt_core::pattern::{Match, Pattern};
use fluxopt_core::plan::PlanGraph;
use fluxopt_core::rule::{Rewrite, Rule};
use fluxopt_core::spec::{ProcedureKind, ProcedureSpec, ReadRangeSpec};

/// Collapse `from |> range` into a `ReadRange`.
pub struct PushDownRangeRule;

impl Rule for PushDownRangeRule {
    fn name(&self) -> &str {
        "PushDownRangeRule"
    }

    fn pattern(&self) -> Pattern {
        // Match: range(from)
        Pattern::new(ProcedureKind::Range, [Pattern::leaf(ProcedureKind::From)])
    }

    fn rewrite(&self, graph: &mut PlanGraph, matched: &Match) -> PlanResult<Rewrite> {
        let ProcedureSpec::Range(range) = graph.spec(matched.root())? else {
            return Ok(Rewrite::Unchanged);
        };
        let ProcedureSpec::From(from) = graph.spec(matched.node(1))? else {
            return Ok(Rewrite::Unchanged);
        };

        let read = ProcedureSpec::ReadRange(ReadRangeSpec {
            bucket: from.bucket.clone(),
            bucket_id: from.bucket_id.clone(),
            bounds: range.bounds,
            filter: None,
        });
        Ok(Rewrite::Created(graph.create_node(read)))
    }
}
