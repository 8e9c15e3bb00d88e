//! Hard failures of an optimization pass.
//!
//! A rule that simply does not apply never produces an error; it returns
//! [`Rewrite::Unchanged`](crate::rule::Rewrite::Unchanged). Everything here aborts the
//! whole pass and surfaces to the caller as a query compilation failure.

use crate::plan::NodeId;
use crate::spec::ProcedureKind;

pub type PlanResult<T> = Result<T, PlanError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// A node id that is not (or no longer) part of the graph.
    #[error("unknown plan node {0}")]
    UnknownNode(NodeId),
    /// Two nodes were declared with the same id.
    #[error("duplicate plan node {0}")]
    DuplicateNode(NodeId),
    /// A wire record uses the reserved largest id.
    #[error("node id {0} is reserved")]
    NodeIdOutOfRange(NodeId),
    /// A node lists a predecessor that does not exist.
    #[error("node {node} references missing predecessor {predecessor}")]
    DanglingReference { node: NodeId, predecessor: NodeId },
    /// The predecessor edges contain a cycle through this node.
    #[error("plan contains a cycle through node {0}")]
    Cycle(NodeId),
    /// A spec's kind expects a different number of predecessors than the node has.
    #[error("node {node}: {kind} expects {expected} predecessor(s), found {actual}")]
    ArityMismatch {
        node: NodeId,
        kind: ProcedureKind,
        expected: usize,
        actual: usize,
    },
    /// A merge would discard a node that is still consumed outside the merged chain.
    #[error("cannot absorb node {0}: it has consumers outside the matched chain")]
    SharedNode(NodeId),
    /// The nodes handed to a merge do not form a chain in the graph.
    #[error("nodes {parent} and {child} are not linked as consumer and predecessor")]
    BrokenChain { parent: NodeId, child: NodeId },
    /// A predicate tree that cannot be a boolean expression.
    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),
    /// The rule catalog kept rewriting past the configured budget.
    #[error("rewrite budget of {0} applications exhausted; rule catalog does not terminate")]
    RewriteLimitExceeded(usize),
}
