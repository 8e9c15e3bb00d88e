//! # Filter Pushdown Rule
//!
//! Moves the storage-evaluable part of a `filter` into the `ReadRange` below it, so
//! rows are discarded by the storage layer instead of being shipped to the engine
//! and dropped there.
//!
//! ## What It Does
//!
//! The filter body is split at its conjunctions by
//! [`partition_predicates`](fluxopt_core::predicate::partition_predicates); the
//! injected [`LeafClassifier`] decides which conjuncts storage understands.
//!
//! ```text
//! Before: ReadRange(bucket, bounds) |> filter(fn: (r) => P and Q)      P pushable
//! After:  ReadRange(bucket, bounds, filter: (r) => P) |> filter(fn: (r) => Q)
//!
//! Before: ReadRange(bucket, bounds) |> filter(fn: (r) => P)
//! After:  ReadRange(bucket, bounds, filter: (r) => P)
//! ```
//!
//! When the read already carries a pushed filter, the new part is appended to it
//! with `and`, so consecutive filters accumulate into a single storage predicate.
//! Parameter names may differ between the two functions; the appended part is
//! renamed to the stored function's parameter.
//!
//! ## Preconditions
//!
//! - The filter function takes exactly one parameter.
//! - Its body is a single expression, not a statement block.
//! - At least one conjunct is pushable. Otherwise the plan is left alone.
//!
//! ## Termination
//!
//! When only part of the predicate moves, both nodes are replaced in place and the
//! filter keeps exactly the non-pushable conjuncts. Matching the same pair again
//! finds nothing to push, so the rule never fires twice on one filter.

use fluxopt_core::error::PlanResult;
use fluxopt_core::expr::{Expr, FunctionExpr};
use fluxopt_core::pattern::{Match, Pattern};
use fluxopt_core::plan::PlanGraph;
use fluxopt_core::predicate::{partition_predicates, LeafClassifier};
use fluxopt_core::rule::{Rewrite, Rule};
use fluxopt_core::spec::{FilterSpec, ProcedureKind, ProcedureSpec, ReadRangeSpec};
use std::sync::Arc;
use tracing::trace;

/// Push pushable filter conjuncts into the storage read.
pub struct PushDownFilterRule {
    classifier: Arc<dyn LeafClassifier>,
}

impl PushDownFilterRule {
    pub fn new(classifier: Arc<dyn LeafClassifier>) -> Self {
        Self { classifier }
    }
}

impl Rule for PushDownFilterRule {
    fn name(&self) -> &str {
        "PushDownFilterRule"
    }

    fn pattern(&self) -> Pattern {
        // Match: filter(ReadRange)
        Pattern::new(ProcedureKind::Filter, [Pattern::leaf(ProcedureKind::ReadRange)])
    }

    fn rewrite(&self, graph: &mut PlanGraph, matched: &Match) -> PlanResult<Rewrite> {
        let (filter_id, read_id) = (matched.root(), matched.node(1));
        let ProcedureSpec::Filter(filter) = graph.spec(filter_id)? else {
            return Ok(Rewrite::Unchanged);
        };
        let ProcedureSpec::ReadRange(read) = graph.spec(read_id)? else {
            return Ok(Rewrite::Unchanged);
        };
        let func = filter.func.clone();
        let mut read = read.clone();

        let Some(body) = func.body_expr() else {
            trace!("filter {} has a block body", filter_id);
            return Ok(Rewrite::Unchanged);
        };
        let Some(param) = func.single_param() else {
            trace!("filter {} does not take exactly one parameter", filter_id);
            return Ok(Rewrite::Unchanged);
        };

        let partition =
            partition_predicates(body, |leaf| self.classifier.is_pushable(param, leaf))?;
        let Some(pushable) = partition.pushable else {
            return Ok(Rewrite::Unchanged);
        };

        let Some(stored) = pushed_filter(&read, &func, param, pushable) else {
            trace!("ReadRange {} carries a stored filter with a block body", read_id);
            return Ok(Rewrite::Unchanged);
        };
        read.filter = Some(stored);

        match partition.remainder {
            None => {
                let merged = graph.merge(matched.nodes(), ProcedureSpec::ReadRange(read))?;
                Ok(Rewrite::Merged(merged))
            }
            Some(remainder) => {
                graph.replace_spec(read_id, ProcedureSpec::ReadRange(read))?;
                graph.replace_spec(
                    filter_id,
                    ProcedureSpec::Filter(FilterSpec {
                        func: func.with_body(remainder),
                    }),
                )?;
                Ok(Rewrite::Replaced)
            }
        }
    }
}

/// The read's filter after adding `pushable`, or `None` if the stored filter cannot
/// be extended.
fn pushed_filter(
    read: &ReadRangeSpec,
    func: &FunctionExpr,
    param: &str,
    pushable: Expr,
) -> Option<FunctionExpr> {
    let Some(existing) = &read.filter else {
        return Some(func.with_body(pushable));
    };
    let existing_body = existing.body_expr()?;
    let pushable = match existing.single_param() {
        Some(stored) if stored != param => pushable.rename_identifier(param, stored),
        _ => pushable,
    };
    Some(existing.with_body(Expr::and(existing_body.clone(), pushable)))
}
