//! # Fixed-Point Rewrite Driver
//!
//! Applies the registered rules to a [`PlanGraph`] until no rule changes it.
//!
//! ## How It Works
//!
//! Each scan walks the graph bottom-up (predecessors before consumers, ties broken by
//! ascending id). At every node the rules registered for the node's kind are tried in
//! registration order:
//!
//! 1. The rule's pattern is matched at the node. No match, next rule.
//! 2. If an absorbed node of the match is also consumed outside of it, the match is
//!    skipped; collapsing it would orphan the other branch.
//! 3. The rule rewrites. [`Rewrite::Created`] nodes are spliced in place of the whole
//!    match here, so rules never have to rewire consumers themselves.
//!
//! The first successful rewrite ends the scan and a new one starts from the bottom,
//! because the change can enable rules further down (a pushed filter makes its
//! neighbour adjacent to the source) as well as further up. A scan that changes
//! nothing means the fixed point was reached.
//!
//! ## Termination
//!
//! The storage rules all shrink the graph or move work into a source that the same
//! rule cannot move again, so the loop ends on its own. The rewrite budget in
//! [`RewriteConfig`] turns a non-terminating catalog into
//! [`PlanError::RewriteLimitExceeded`] instead of a hang.

use crate::error::{PlanError, PlanResult};
use crate::pattern::{match_pattern, Match};
use crate::plan::{NodeId, PlanGraph};
use crate::rule::{Rewrite, RuleRegistry};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Knobs for one optimization pass.
#[derive(Debug, Clone)]
pub struct RewriteConfig {
    /// Upper bound on successful rule applications per pass.
    pub max_rewrites: usize,
    /// Record a [`RuleApplication`] for every rewrite.
    pub enable_trace: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_rewrites: 10_000,
            enable_trace: false,
        }
    }
}

impl RewriteConfig {
    pub fn with_max_rewrites(mut self, max_rewrites: usize) -> Self {
        self.max_rewrites = max_rewrites;
        self
    }

    pub fn with_trace(mut self, enable_trace: bool) -> Self {
        self.enable_trace = enable_trace;
        self
    }
}

/// One successful rule application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleApplication {
    pub rule: String,
    /// Root of the match.
    pub node: NodeId,
    /// Node carrying the rewritten root afterwards.
    pub result: NodeId,
    /// Matched chain before the rewrite, source first.
    pub before: String,
    /// Rewritten chain, source first.
    pub after: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteOutcome {
    /// Number of bottom-up scans, including the final one that changed nothing.
    pub scans: usize,
    /// Number of successful rule applications.
    pub rewrites: usize,
    /// Empty unless [`RewriteConfig::enable_trace`] is set.
    pub trace: Vec<RuleApplication>,
}

/// The rewrite driver. Cheap to clone; the registry is shared.
#[derive(Clone)]
pub struct Rewriter {
    registry: Arc<RuleRegistry>,
    config: RewriteConfig,
}

impl Rewriter {
    pub fn new(registry: Arc<RuleRegistry>, config: RewriteConfig) -> Self {
        Self { registry, config }
    }

    /// Rewrite `graph` in place until no rule applies.
    ///
    /// On error the graph may hold the rewrites applied before the failure.
    pub fn optimize(&self, graph: &mut PlanGraph) -> PlanResult<RewriteOutcome> {
        let mut outcome = RewriteOutcome::default();
        debug!(
            "Starting rewrite pass: {} nodes, {} rules",
            graph.len(),
            self.registry.len()
        );

        while self.scan(graph, &mut outcome)? {
            if outcome.rewrites > self.config.max_rewrites {
                debug!("Hit rewrite limit");
                return Err(PlanError::RewriteLimitExceeded(self.config.max_rewrites));
            }
        }

        debug!(
            "Rewrite pass complete: {} rewrites in {} scans, {} nodes",
            outcome.rewrites,
            outcome.scans,
            graph.len()
        );
        Ok(outcome)
    }

    /// One bottom-up scan. Returns true if a rule changed the graph.
    fn scan(&self, graph: &mut PlanGraph, outcome: &mut RewriteOutcome) -> PlanResult<bool> {
        outcome.scans += 1;
        for id in graph.topological_order()? {
            let kind = graph.kind(id)?;
            for (rule, pattern) in self.registry.rules_for(kind) {
                let Some(m) = match_pattern(graph, id, pattern) else {
                    continue;
                };
                if !graph.is_exclusive(m.nodes()) {
                    trace!("Skipping rule '{}' at node {}: chain is shared", rule.name(), id);
                    continue;
                }

                let before = self
                    .config
                    .enable_trace
                    .then(|| render_chain(graph, m.nodes()));
                trace!("Applying rule '{}' to node {}", rule.name(), id);

                let result = match rule.rewrite(graph, &m)? {
                    Rewrite::Unchanged => {
                        trace!("  Rule '{}' did not apply", rule.name());
                        continue;
                    }
                    Rewrite::Created(new) => {
                        graph.splice(m.nodes(), new)?;
                        new
                    }
                    Rewrite::Merged(new) => new,
                    Rewrite::Replaced => m.root(),
                };

                outcome.rewrites += 1;
                debug!("Rule '{}' rewrote node {} into node {}", rule.name(), id, result);
                if let Some(before) = before {
                    outcome.trace.push(RuleApplication {
                        rule: rule.name().to_string(),
                        node: id,
                        result,
                        before,
                        after: render_after(graph, &m, result),
                    });
                }
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn render_after(graph: &PlanGraph, m: &Match, result: NodeId) -> String {
    if result == m.root() {
        render_chain(graph, m.nodes())
    } else {
        render_chain(graph, &[result])
    }
}

/// `source |> ... |> root` for a root-first chain.
fn render_chain(graph: &PlanGraph, chain: &[NodeId]) -> String {
    chain
        .iter()
        .rev()
        .filter_map(|&id| graph.spec(id).ok())
        .map(|spec| spec.to_string())
        .collect::<Vec<_>>()
        .join(" |> ")
}
