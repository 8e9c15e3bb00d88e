//! # Rule System
//!
//! This module defines the rewrite rule trait and the registry the driver reads.
//!
//! ## Rules
//!
//! A rule declares a [`Pattern`] and a rewrite action. The driver calls
//! [`Rule::rewrite`] only for nodes whose surrounding chain matches the pattern,
//! passing the matched nodes. The rewrite then checks the rule's semantic
//! preconditions on the spec payloads and either:
//!
//! - returns [`Rewrite::Unchanged`] without touching the graph (a precondition
//!   failed; this is the common, silent path),
//! - allocates a detached node with [`PlanGraph::create_node`] and returns
//!   [`Rewrite::Created`]; the driver splices it in place of the whole match,
//! - collapses the match itself with [`PlanGraph::merge`] and returns
//!   [`Rewrite::Merged`], or
//! - swaps specs in place with [`PlanGraph::replace_spec`] and returns
//!   [`Rewrite::Replaced`].
//!
//! Errors are reserved for malformed plans and abort the optimization pass.
//!
//! ## Rule Registry
//!
//! The [`RuleRegistry`] is built once at start-up and is read-only afterwards. It
//! keeps rules in registration order and indexes them by the kind at the root of
//! their pattern, so the driver only tries rules that can possibly match a node.

use crate::error::PlanResult;
use crate::pattern::{Match, Pattern};
use crate::plan::{NodeId, PlanGraph};
use crate::spec::ProcedureKind;
use std::collections::HashMap;

/// Outcome of a rewrite attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewrite {
    /// Preconditions did not hold; the graph is untouched.
    Unchanged,
    /// A detached node that should replace the whole match.
    Created(NodeId),
    /// The match was already collapsed into this node.
    Merged(NodeId),
    /// Specs were replaced in place; the graph shape is unchanged.
    Replaced,
}

impl Rewrite {
    pub fn changed(&self) -> bool {
        !matches!(self, Rewrite::Unchanged)
    }
}

/// A physical plan rewrite.
pub trait Rule: Send + Sync {
    /// Unique name of this rule.
    fn name(&self) -> &str;

    /// Pattern that this rule matches against.
    fn pattern(&self) -> Pattern;

    /// Rewrite a matching chain. `matched.root()` is the node the pattern root bound.
    fn rewrite(&self, graph: &mut PlanGraph, matched: &Match) -> PlanResult<Rewrite>;
}

type RewriteFn = dyn Fn(&mut PlanGraph, &Match) -> PlanResult<Rewrite> + Send + Sync;

/// A rule assembled from a name, a pattern and a closure.
pub struct FnRule {
    name: String,
    pattern: Pattern,
    rewrite: Box<RewriteFn>,
}

impl Rule for FnRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn pattern(&self) -> Pattern {
        self.pattern.clone()
    }

    fn rewrite(&self, graph: &mut PlanGraph, matched: &Match) -> PlanResult<Rewrite> {
        (self.rewrite)(graph, matched)
    }
}

struct Registered {
    rule: Box<dyn Rule>,
    pattern: Pattern,
}

/// Ordered rule table keyed by pattern root kind.
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Registered>,
    by_kind: HashMap<ProcedureKind, Vec<usize>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        let pattern = rule.pattern();
        self.by_kind
            .entry(pattern.kind)
            .or_default()
            .push(self.rules.len());
        self.rules.push(Registered { rule, pattern });
    }

    /// Register a rule from its parts.
    pub fn register<F>(&mut self, name: impl Into<String>, pattern: Pattern, rewrite: F)
    where
        F: Fn(&mut PlanGraph, &Match) -> PlanResult<Rewrite> + Send + Sync + 'static,
    {
        self.add_rule(Box::new(FnRule {
            name: name.into(),
            pattern,
            rewrite: Box::new(rewrite),
        }));
    }

    /// All rules in registration order.
    pub fn rules(&self) -> impl Iterator<Item = (&dyn Rule, &Pattern)> {
        self.rules.iter().map(|r| (r.rule.as_ref(), &r.pattern))
    }

    /// Rules whose pattern is rooted at `kind`, in registration order.
    pub fn rules_for(&self, kind: ProcedureKind) -> impl Iterator<Item = (&dyn Rule, &Pattern)> {
        self.by_kind
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&i| (self.rules[i].rule.as_ref(), &self.rules[i].pattern))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
