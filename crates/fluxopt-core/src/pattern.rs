//! # Structural Pattern Matching for Rewrite Rules
//!
//! Each rewrite rule declares a [`Pattern`] describing the operator chain it can
//! rewrite. The driver tests the pattern before calling the rule, so a rule's
//! rewrite only ever sees nodes of the kinds it asked for.
//!
//! ## Pattern Language
//!
//! A pattern is a kind plus an ordered list of child patterns. It matches a node when
//! the node has that kind, has exactly as many predecessors as the pattern has
//! children, and each predecessor matches the child pattern at the same position.
//! Matching looks only at kinds and arity, never at spec payloads; payload checks are
//! the rule's preconditions.
//!
//! ```text
//! Pattern::new(Distinct, [Pattern::new(Group, [Pattern::leaf(ReadRange)])])
//!   matches  ReadRange |> group() |> distinct()
//! ```
//!
//! Patterns may have several children; the storage rules only use linear chains.
//!
//! ## Match Result
//!
//! A successful match returns the matched nodes in pre-order: the root first, then
//! each child's subtree left to right. For the single-child chains used by the
//! storage rules this is simply root-to-leaf order.

use crate::plan::{NodeId, PlanGraph};
use crate::spec::ProcedureKind;
use std::fmt;

/// Shape of an operator chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub kind: ProcedureKind,
    pub children: Vec<Pattern>,
}

impl Pattern {
    pub fn new(kind: ProcedureKind, children: impl IntoIterator<Item = Pattern>) -> Self {
        Self {
            kind,
            children: children.into_iter().collect(),
        }
    }

    /// A pattern with no children; matches only nodes without predecessors.
    pub fn leaf(kind: ProcedureKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    /// Number of nodes a successful match returns.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Pattern::node_count).sum::<usize>()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.children.is_empty() {
            write!(f, "(")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Nodes bound by a successful match, in pre-order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    nodes: Vec<NodeId>,
}

impl Match {
    pub fn root(&self) -> NodeId {
        self.nodes[0]
    }

    /// The `i`-th matched node in pre-order. For a linear chain, index 1 is the root's
    /// predecessor, index 2 its predecessor, and so on.
    pub fn node(&self, i: usize) -> NodeId {
        self.nodes[i]
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}

/// Match `pattern` against the node `id`.
///
/// Unknown ids simply do not match.
pub fn match_pattern(graph: &PlanGraph, id: NodeId, pattern: &Pattern) -> Option<Match> {
    let mut nodes = Vec::with_capacity(pattern.node_count());
    if match_into(graph, id, pattern, &mut nodes) {
        Some(Match { nodes })
    } else {
        None
    }
}

/// Check if a node matches a pattern without collecting the chain.
pub fn matches(graph: &PlanGraph, id: NodeId, pattern: &Pattern) -> bool {
    match_pattern(graph, id, pattern).is_some()
}

fn match_into(graph: &PlanGraph, id: NodeId, pattern: &Pattern, out: &mut Vec<NodeId>) -> bool {
    let Ok(node) = graph.node(id) else {
        return false;
    };
    if node.kind() != pattern.kind || node.predecessors.len() != pattern.children.len() {
        return false;
    }
    out.push(id);
    node.predecessors
        .iter()
        .zip(&pattern.children)
        .all(|(&pred, child)| match_into(graph, pred, child, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::*;
    use ProcedureKind::*;

    fn read_range() -> ProcedureSpec {
        ProcedureSpec::ReadRange(ReadRangeSpec {
            bucket: "b".into(),
            bucket_id: String::new(),
            bounds: Bounds::since(-60_000_000_000),
            filter: None,
        })
    }

    fn group() -> ProcedureSpec {
        ProcedureSpec::Group(GroupSpec {
            mode: GroupMode::By,
            keys: vec![],
        })
    }

    fn distinct() -> ProcedureSpec {
        ProcedureSpec::Distinct(DistinctSpec {
            column: "host".into(),
        })
    }

    fn tag_values_pattern() -> Pattern {
        Pattern::new(Distinct, [Pattern::new(Group, [Pattern::leaf(ReadRange)])])
    }

    #[test]
    fn test_display_and_len() {
        let p = tag_values_pattern();
        assert_eq!(p.node_count(), 3);
        assert_eq!(p.to_string(), "distinct(group(ReadRange))");
    }

    #[test]
    fn test_match_returns_root_to_leaf() {
        let (g, ids) = PlanGraph::from_pipeline(vec![read_range(), group(), distinct()]).unwrap();
        let m = match_pattern(&g, ids[2], &tag_values_pattern()).unwrap();
        assert_eq!(m.nodes(), &[ids[2], ids[1], ids[0]]);
        assert_eq!(m.root(), ids[2]);
    }

    #[test]
    fn test_kind_mismatch_anywhere_fails() {
        let (g, ids) = PlanGraph::from_pipeline(vec![read_range(), group(), distinct()]).unwrap();
        let wrong_middle =
            Pattern::new(Distinct, [Pattern::new(Distinct, [Pattern::leaf(ReadRange)])]);
        assert!(!matches(&g, ids[2], &wrong_middle));
        assert!(!matches(&g, ids[2], &Pattern::new(Group, [Pattern::leaf(ReadRange)])));
        assert!(!matches(&g, 99, &Pattern::leaf(ReadRange)));
    }

    #[test]
    fn test_arity_must_agree() {
        let (g, ids) = PlanGraph::from_pipeline(vec![read_range(), group()]).unwrap();
        // Pattern stops short of the node's predecessor.
        assert!(!matches(&g, ids[1], &Pattern::leaf(Group)));
        // Pattern expects a predecessor the source does not have.
        assert!(!matches(&g, ids[0], &Pattern::new(ReadRange, [Pattern::leaf(From)])));
    }
}
