//! # Plan Graph
//!
//! The physical plan is a DAG of [`PlanNode`]s stored in an ordered map and addressed
//! by stable [`NodeId`]s. Edges point from a node to its predecessors (its inputs);
//! consumers are derived by scanning, so there is a single source of truth for
//! connectivity and sharing between branches is always visible.
//!
//! ## Editing Primitives
//!
//! Rewrite rules change the graph only through three primitives:
//!
//! - **create** ([`PlanGraph::create_node`]): allocate a detached node. The driver
//!   later splices it in place of the matched chain.
//! - **replace** ([`PlanGraph::replace_spec`]): swap a node's spec in place. The node
//!   keeps its id, its predecessors and all of its consumers.
//! - **merge** ([`PlanGraph::merge`]): collapse a matched chain into one new node.
//!   Consumers of the chain root are rewired onto the new node, inputs of the chain
//!   become its predecessors, and the absorbed nodes are dropped.
//!
//! Fresh ids are always above every id seen so far, so ids handed out earlier never
//! alias a different node. Wire ids may be sparse; storage grows with the number of
//! nodes, not with the largest id.
//!
//! ## Invariants
//!
//! - The graph is acyclic. New nodes can only point at existing ones, and splicing
//!   replaces a connected chain with a single node, so neither primitive can close a
//!   cycle. Graphs built from external input are checked by [`PlanGraph::validate`].
//! - Every node has exactly `kind().arity()` predecessors, except detached nodes
//!   between `create_node` and `splice`.
//! - A node is absorbed by a merge only if all of its consumers are inside the merged
//!   chain.

use crate::error::{PlanError, PlanResult};
use crate::spec::{ProcedureKind, ProcedureSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;

/// Stable identifier of a node within one [`PlanGraph`].
pub type NodeId = u32;

/// One physical operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: NodeId,
    pub spec: ProcedureSpec,
    #[serde(default)]
    pub predecessors: Vec<NodeId>,
}

impl PlanNode {
    pub fn kind(&self) -> ProcedureKind {
        self.spec.kind()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanGraph {
    nodes: BTreeMap<NodeId, PlanNode>,
    next_id: NodeId,
}

impl PlanGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a linear pipeline `specs[0] |> specs[1] |> ...`.
    ///
    /// Returns the graph and the node ids in pipeline order.
    pub fn from_pipeline(
        specs: impl IntoIterator<Item = ProcedureSpec>,
    ) -> PlanResult<(Self, Vec<NodeId>)> {
        let mut graph = Self::new();
        let mut ids: Vec<NodeId> = Vec::new();
        for spec in specs {
            let preds = ids.last().copied().into_iter().collect();
            ids.push(graph.add_node(spec, preds)?);
        }
        Ok((graph, ids))
    }

    /// Build a graph from wire records, checking every structural invariant.
    pub fn try_from_nodes(nodes: Vec<PlanNode>) -> PlanResult<Self> {
        let mut graph = Self::new();
        for node in nodes {
            // The largest id is reserved so that a fresh id always exists.
            if node.id == NodeId::MAX {
                return Err(PlanError::NodeIdOutOfRange(node.id));
            }
            if graph.nodes.contains_key(&node.id) {
                return Err(PlanError::DuplicateNode(node.id));
            }
            graph.next_id = graph.next_id.max(node.id + 1);
            graph.nodes.insert(node.id, node);
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Live nodes in id order.
    pub fn to_nodes(&self) -> Vec<PlanNode> {
        self.nodes.values().cloned().collect()
    }

    /// Check predecessor references, arities and acyclicity.
    pub fn validate(&self) -> PlanResult<()> {
        for node in self.nodes.values() {
            for &pred in &node.predecessors {
                if !self.contains(pred) {
                    return Err(PlanError::DanglingReference {
                        node: node.id,
                        predecessor: pred,
                    });
                }
            }
            check_arity(node.id, &node.spec, node.predecessors.len())?;
        }
        self.topological_order().map(|_| ())
    }

    /// Append a node wired to existing predecessors.
    pub fn add_node(&mut self, spec: ProcedureSpec, predecessors: Vec<NodeId>) -> PlanResult<NodeId> {
        let id = self.next_id;
        for &pred in &predecessors {
            if !self.contains(pred) {
                return Err(PlanError::DanglingReference {
                    node: id,
                    predecessor: pred,
                });
            }
        }
        check_arity(id, &spec, predecessors.len())?;
        self.insert_fresh(PlanNode {
            id,
            spec,
            predecessors,
        });
        Ok(id)
    }

    /// Allocate a detached node with no predecessors and no consumers.
    pub fn create_node(&mut self, spec: ProcedureSpec) -> NodeId {
        let id = self.next_id;
        self.insert_fresh(PlanNode {
            id,
            spec,
            predecessors: Vec::new(),
        });
        id
    }

    fn insert_fresh(&mut self, node: PlanNode) {
        self.next_id = node.id.saturating_add(1);
        self.nodes.insert(node.id, node);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node(&self, id: NodeId) -> PlanResult<&PlanNode> {
        self.nodes.get(&id).ok_or(PlanError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> PlanResult<&mut PlanNode> {
        self.nodes.get_mut(&id).ok_or(PlanError::UnknownNode(id))
    }

    pub fn spec(&self, id: NodeId) -> PlanResult<&ProcedureSpec> {
        Ok(&self.node(id)?.spec)
    }

    pub fn kind(&self, id: NodeId) -> PlanResult<ProcedureKind> {
        Ok(self.node(id)?.kind())
    }

    pub fn predecessors(&self, id: NodeId) -> PlanResult<&[NodeId]> {
        Ok(&self.node(id)?.predecessors)
    }

    /// Ids of all live nodes in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Nodes that list `id` as a predecessor, in ascending id order.
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.predecessors.contains(&id))
            .map(|n| n.id)
            .collect()
    }

    /// Nodes with no consumers; these produce the query results.
    pub fn sinks(&self) -> Vec<NodeId> {
        let consumed: HashSet<NodeId> = self
            .nodes
            .values()
            .flat_map(|n| n.predecessors.iter().copied())
            .collect();
        self.node_ids().filter(|id| !consumed.contains(id)).collect()
    }

    /// Predecessors before consumers; ties are broken by ascending id.
    pub fn topological_order(&self) -> PlanResult<Vec<NodeId>> {
        let mut pending: HashMap<NodeId, usize> = HashMap::new();
        let mut consumers: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in self.nodes.values() {
            pending.insert(node.id, node.predecessors.len());
            for &pred in &node.predecessors {
                consumers.entry(pred).or_default().push(node.id);
            }
        }

        let mut ready: BTreeSet<NodeId> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(pending.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for &consumer in consumers.get(&id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(n) = pending.get_mut(&consumer) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(consumer);
                    }
                }
            }
        }

        if order.len() < pending.len() {
            let stuck = pending
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(id, _)| *id)
                .min()
                .unwrap_or_default();
            return Err(PlanError::Cycle(stuck));
        }
        Ok(order)
    }

    /// Swap a node's spec in place, returning the old one.
    ///
    /// The node keeps its id, predecessors and consumers, so the new spec's kind must
    /// take the same number of predecessors.
    pub fn replace_spec(&mut self, id: NodeId, spec: ProcedureSpec) -> PlanResult<ProcedureSpec> {
        let node = self.node_mut(id)?;
        check_arity(id, &spec, node.predecessors.len())?;
        Ok(std::mem::replace(&mut node.spec, spec))
    }

    /// True when every node of `chain` except the root is consumed only from inside
    /// the chain, i.e. the chain can be collapsed without orphaning another branch.
    pub fn is_exclusive(&self, chain: &[NodeId]) -> bool {
        self.first_shared(chain).is_none()
    }

    fn first_shared(&self, chain: &[NodeId]) -> Option<NodeId> {
        let members: HashSet<NodeId> = chain.iter().copied().collect();
        chain.iter().skip(1).copied().find(|&id| {
            self.successors(id)
                .iter()
                .any(|consumer| !members.contains(consumer))
        })
    }

    /// Collapse `chain` (root first) into a new node carrying `spec`.
    pub fn merge(&mut self, chain: &[NodeId], spec: ProcedureSpec) -> PlanResult<NodeId> {
        let id = self.create_node(spec);
        if let Err(e) = self.splice(chain, id) {
            self.nodes.remove(&id);
            self.next_id = id;
            return Err(e);
        }
        Ok(id)
    }

    /// Put the detached node `replacement` in place of `chain` (root first).
    ///
    /// The replacement inherits every predecessor of the chain that is not itself
    /// part of the chain, in chain order. Consumers of the root are rewired onto the
    /// replacement and the chain nodes are dropped.
    pub fn splice(&mut self, chain: &[NodeId], replacement: NodeId) -> PlanResult<()> {
        let Some(&root) = chain.first() else {
            return Ok(());
        };
        let members: HashSet<NodeId> = chain.iter().copied().collect();
        if members.contains(&replacement) {
            return Err(PlanError::BrokenChain {
                parent: root,
                child: replacement,
            });
        }

        // Every absorbed node must feed some other chain member.
        for &id in chain.iter().skip(1) {
            let linked = chain
                .iter()
                .filter(|&&m| m != id)
                .any(|&m| self.node(m).map_or(false, |n| n.predecessors.contains(&id)));
            if !linked {
                return Err(PlanError::BrokenChain {
                    parent: root,
                    child: id,
                });
            }
        }
        if let Some(shared) = self.first_shared(chain) {
            return Err(PlanError::SharedNode(shared));
        }

        let mut inputs: Vec<NodeId> = Vec::new();
        for &id in chain {
            for &pred in self.predecessors(id)? {
                if !members.contains(&pred) && !inputs.contains(&pred) {
                    inputs.push(pred);
                }
            }
        }
        let spec = &self.node(replacement)?.spec;
        check_arity(replacement, spec, inputs.len())?;

        for slot in self.nodes.values_mut() {
            for pred in slot.predecessors.iter_mut() {
                if *pred == root {
                    *pred = replacement;
                }
            }
        }
        self.node_mut(replacement)?.predecessors = inputs;
        for id in chain {
            self.nodes.remove(id);
        }
        Ok(())
    }

    /// Indented tree rendering rooted at each sink.
    ///
    /// A node reachable from more than one consumer is rendered in full once; later
    /// occurrences print only `^#id`.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        let mut rendered: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        for sink in self.sinks() {
            stack.push((sink, 0));
            while let Some((id, indent)) = stack.pop() {
                let Ok(node) = self.node(id) else {
                    continue;
                };
                let pad = "  ".repeat(indent);
                if !rendered.insert(id) {
                    let _ = writeln!(out, "{}^#{}", pad, id);
                    continue;
                }
                let _ = writeln!(out, "{}{} #{}", pad, node.spec, id);
                // Reversed so the first predecessor is rendered first.
                for &pred in node.predecessors.iter().rev() {
                    stack.push((pred, indent + 1));
                }
            }
        }
        out
    }
}

fn check_arity(node: NodeId, spec: &ProcedureSpec, actual: usize) -> PlanResult<()> {
    let kind = spec.kind();
    let expected = kind.arity();
    if expected != actual {
        return Err(PlanError::ArityMismatch {
            node,
            kind,
            expected,
            actual,
        });
    }
    Ok(())
}
