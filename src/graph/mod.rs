//! Analysis graphs
//!
//! The pointer flow graph the solver closes over, and the call graph it
//! builds on the fly.

pub mod call_graph;
pub mod pfg;

pub use call_graph::{CallEdge, CallGraph};
pub use pfg::{FlowGraph, FlowKind, PfgEdge, PointerNode};
