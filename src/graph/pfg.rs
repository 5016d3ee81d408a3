//! Pointer flow graph
//!
//! Directed graph over pointers. Every node owns its points-to set and
//! its outgoing edges by value; nodes live in an arena addressed by
//! dense pointer ids, so edges are plain ids and cycles are benign.
//! Edges are deduplicated by (source, target, kind, filter).

use rustc_hash::FxHashSet;

use crate::collections::PointsToSet;
use crate::cs::PointerId;
use crate::ir::TypeId;

/// What created an edge. All edges propagate as local assignments once
/// materialized; the kind is kept for reporting and debugging, and casts
/// carry their type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    LocalAssign,
    Cast,
    InstanceStore,
    InstanceLoad,
    ArrayStore,
    ArrayLoad,
    StaticStore,
    StaticLoad,
    Parameter,
    Return,
}

/// An outgoing edge of a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PfgEdge {
    pub target: PointerId,
    pub kind: FlowKind,
    /// Only elements whose type is a subtype pass through
    pub filter: Option<TypeId>,
}

/// A pointer's state: its points-to set and outgoing edges.
#[derive(Debug, Default)]
pub struct PointerNode {
    pub pts: PointsToSet,
    /// Insertion-ordered for deterministic propagation
    edges: Vec<PfgEdge>,
    edge_set: FxHashSet<PfgEdge>,
}

impl PointerNode {
    pub fn edges(&self) -> &[PfgEdge] {
        &self.edges
    }
}

/// Arena of pointer nodes addressed by dense id.
#[derive(Default)]
pub struct FlowGraph {
    nodes: Vec<PointerNode>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The node for a pointer, growing the arena on first touch.
    pub fn ensure(&mut self, p: PointerId) -> &mut PointerNode {
        let idx = p as usize;
        if idx >= self.nodes.len() {
            self.nodes.resize_with(idx + 1, PointerNode::default);
        }
        &mut self.nodes[idx]
    }

    /// Add an edge; returns false if an identical edge already exists.
    pub fn add_edge(&mut self, source: PointerId, edge: PfgEdge) -> bool {
        self.ensure(edge.target);
        let node = self.ensure(source);
        if !node.edge_set.insert(edge) {
            return false;
        }
        node.edges.push(edge);
        true
    }

    pub fn node(&self, p: PointerId) -> Option<&PointerNode> {
        self.nodes.get(p as usize)
    }

    pub fn pts(&self, p: PointerId) -> Option<&PointsToSet> {
        self.node(p).map(|n| &n.pts)
    }

    pub fn edges(&self, p: PointerId) -> &[PfgEdge] {
        self.node(p).map(|n| n.edges()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn num_edges(&self) -> usize {
        self.nodes.iter().map(|n| n.edges.len()).sum()
    }

    /// Tear the arena down into per-pointer points-to sets.
    pub fn into_points_to_sets(self) -> Vec<PointsToSet> {
        self.nodes.into_iter().map(|n| n.pts).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_dedup_by_full_identity() {
        let mut g = FlowGraph::new();
        let e = PfgEdge {
            target: 1,
            kind: FlowKind::LocalAssign,
            filter: None,
        };
        assert!(g.add_edge(0, e));
        assert!(!g.add_edge(0, e));
        // Same endpoints, different kind: distinct edge.
        assert!(g.add_edge(
            0,
            PfgEdge {
                target: 1,
                kind: FlowKind::Parameter,
                filter: None,
            }
        ));
        // Same endpoints and kind, different filter: distinct edge.
        assert!(g.add_edge(
            0,
            PfgEdge {
                target: 1,
                kind: FlowKind::LocalAssign,
                filter: Some(3),
            }
        ));
        assert_eq!(g.edges(0).len(), 3);
        assert_eq!(g.num_edges(), 3);
    }

    #[test]
    fn test_arena_grows_on_demand() {
        let mut g = FlowGraph::new();
        g.ensure(5).pts.insert(42);
        assert_eq!(g.len(), 6);
        assert!(g.pts(5).unwrap().contains(42));
        assert!(g.pts(9).is_none());
        assert!(g.edges(9).is_empty());
    }
}
