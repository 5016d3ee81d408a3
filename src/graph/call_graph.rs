//! On-the-fly call graph
//!
//! Nodes are context-sensitive methods; edges connect a call site under
//! its caller context to the resolved callee. Both the edge set and the
//! reachable set only grow, and both iterate in insertion order.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::CtxId;
use crate::cs::CsMethodId;
use crate::ir::{CallKind, CallSiteId};

/// One resolved call edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallEdge {
    pub site: CallSiteId,
    pub caller_ctx: CtxId,
    pub callee: CsMethodId,
    pub kind: CallKind,
}

/// The growing call graph.
#[derive(Default)]
pub struct CallGraph {
    edges: Vec<CallEdge>,
    edge_set: FxHashSet<(CallSiteId, CtxId, CsMethodId)>,
    reachable: Vec<CsMethodId>,
    reachable_set: FxHashSet<CsMethodId>,
    /// Edge indices per callee, for caller lookups
    callers: FxHashMap<CsMethodId, Vec<usize>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edge; returns false if it was already present.
    pub fn add_edge(&mut self, edge: CallEdge) -> bool {
        if !self
            .edge_set
            .insert((edge.site, edge.caller_ctx, edge.callee))
        {
            return false;
        }
        self.callers
            .entry(edge.callee)
            .or_default()
            .push(self.edges.len());
        self.edges.push(edge);
        true
    }

    /// Mark a context-sensitive method reachable; returns false if it
    /// already was.
    pub fn add_reachable(&mut self, method: CsMethodId) -> bool {
        if !self.reachable_set.insert(method) {
            return false;
        }
        self.reachable.push(method);
        true
    }

    pub fn is_reachable(&self, method: CsMethodId) -> bool {
        self.reachable_set.contains(&method)
    }

    /// Reachable methods in discovery order.
    pub fn reachable(&self) -> &[CsMethodId] {
        &self.reachable
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    /// Edges targeting `callee`, in insertion order.
    pub fn edges_into(&self, callee: CsMethodId) -> Vec<CallEdge> {
        self.callers
            .get(&callee)
            .map(|idxs| idxs.iter().map(|&i| self.edges[i]).collect())
            .unwrap_or_default()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_reachable(&self) -> usize {
        self.reachable.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(site: CallSiteId, callee: CsMethodId) -> CallEdge {
        CallEdge {
            site,
            caller_ctx: 0,
            callee,
            kind: CallKind::Virtual,
        }
    }

    #[test]
    fn test_edges_dedup() {
        let mut cg = CallGraph::new();
        assert!(cg.add_edge(edge(1, 10)));
        assert!(!cg.add_edge(edge(1, 10)));
        assert!(cg.add_edge(edge(1, 11)));
        assert!(cg.add_edge(edge(2, 10)));
        assert_eq!(cg.num_edges(), 3);
        assert_eq!(cg.edges_into(10).len(), 2);
        assert!(cg.edges_into(12).is_empty());
    }

    #[test]
    fn test_reachable_is_monotone_and_ordered() {
        let mut cg = CallGraph::new();
        assert!(cg.add_reachable(5));
        assert!(cg.add_reachable(3));
        assert!(!cg.add_reachable(5));
        assert_eq!(cg.reachable(), &[5, 3]);
        assert!(cg.is_reachable(3));
        assert!(!cg.is_reachable(4));
    }
}
