//! Plugin protocol
//!
//! Plugins observe the analysis (lifecycle and discovery events) and
//! inject constraints in response. The relation to the solver is a hook
//! contract with default no-op methods, not a subclass relation: a
//! plugin receives a `PluginContext` with read access to the analysis
//! state and queues constraint additions, which the solver applies
//! through its normal operations after the fan-out returns.
//!
//! The composite bus dispatches to registered plugins in registration
//! order; an error in one plugin does not mask the others. Non-fatal
//! errors are logged and the analysis continues; a fatal error is
//! rethrown after the current worklist entry completes.

pub mod class_initializer;
pub mod exception;
pub mod lambda;
pub mod reflection;
pub mod result_processor;
pub mod taint;
pub mod thread_handler;
pub mod timer;

use std::sync::Arc;

use tracing::warn;

use crate::collections::PointsToSet;
use crate::context::{ContextPool, ContextSelector, CtxId};
use crate::cs::{CsManager, CsMethodId, PointerId};
use crate::errors::Result;
use crate::graph::{CallEdge, CallGraph, FlowGraph, FlowKind};
use crate::heap::{HeapModel, ObjId};
use crate::ir::{CallKind, CallSiteId, MethodId, TypeId};
use crate::World;

pub use class_initializer::ClassInitializer;
pub use exception::ExceptionAnalysis;
pub use lambda::LambdaAnalysis;
pub use reflection::ReflectionHandler;
pub use result_processor::ResultProcessor;
pub use taint::{TaintAnalysis, TaintFlow};
pub use thread_handler::ThreadHandler;
pub use timer::AnalysisTimer;

/// A constraint addition queued by a plugin. Applied by the solver
/// through its normal operations, so plugin-added constraints re-enter
/// the worklist like any other.
#[derive(Debug, Clone)]
pub enum SolverOp {
    /// Add objects to a pointer's points-to set
    AddPointsTo {
        pointer: PointerId,
        objs: Vec<ObjId>,
    },
    /// Add a pointer-flow edge
    AddEdge {
        source: PointerId,
        target: PointerId,
        kind: FlowKind,
        filter: Option<TypeId>,
    },
    /// Declare a method reachable under a context (an implicit call)
    MakeReachable { method: MethodId, ctx: CtxId },
    /// Record a call edge. With `wire_args` the solver connects
    /// arguments to parameters positionally and returns to the result;
    /// without it the plugin wires data flow itself via `AddEdge`.
    AddCallEdge {
        site: CallSiteId,
        caller_ctx: CtxId,
        callee: MethodId,
        callee_ctx: CtxId,
        kind: CallKind,
        recv_obj: Option<ObjId>,
        wire_args: bool,
    },
    /// Record a source-to-sink taint flow in the final result
    ReportTaintFlow(TaintFlow),
}

/// Read access to the analysis state plus the constraint queue, handed
/// to every hook invocation.
pub struct PluginContext<'a> {
    pub world: &'a Arc<World>,
    pub heap: &'a HeapModel,
    pub cs: &'a CsManager,
    pub ctxs: &'a ContextPool,
    pub selector: &'a dyn ContextSelector,
    pub graph: &'a FlowGraph,
    pub call_graph: &'a CallGraph,
    ops: Vec<SolverOp>,
}

impl<'a> PluginContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        world: &'a Arc<World>,
        heap: &'a HeapModel,
        cs: &'a CsManager,
        ctxs: &'a ContextPool,
        selector: &'a dyn ContextSelector,
        graph: &'a FlowGraph,
        call_graph: &'a CallGraph,
    ) -> Self {
        Self {
            world,
            heap,
            cs,
            ctxs,
            selector,
            graph,
            call_graph,
            ops: Vec::new(),
        }
    }

    /// Current points-to set of a pointer, if it has one.
    pub fn pts(&self, p: PointerId) -> Option<&PointsToSet> {
        self.graph.pts(p)
    }

    pub fn add_points_to(&mut self, pointer: PointerId, objs: Vec<ObjId>) {
        self.ops.push(SolverOp::AddPointsTo { pointer, objs });
    }

    pub fn add_edge(
        &mut self,
        source: PointerId,
        target: PointerId,
        kind: FlowKind,
        filter: Option<TypeId>,
    ) {
        self.ops.push(SolverOp::AddEdge {
            source,
            target,
            kind,
            filter,
        });
    }

    pub fn make_reachable(&mut self, method: MethodId, ctx: CtxId) {
        self.ops.push(SolverOp::MakeReachable { method, ctx });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_call_edge(
        &mut self,
        site: CallSiteId,
        caller_ctx: CtxId,
        callee: MethodId,
        callee_ctx: CtxId,
        kind: CallKind,
        recv_obj: Option<ObjId>,
        wire_args: bool,
    ) {
        self.ops.push(SolverOp::AddCallEdge {
            site,
            caller_ctx,
            callee,
            callee_ctx,
            kind,
            recv_obj,
            wire_args,
        });
    }

    pub fn report_taint_flow(&mut self, flow: TaintFlow) {
        self.ops.push(SolverOp::ReportTaintFlow(flow));
    }

    pub(crate) fn take_ops(self) -> Vec<SolverOp> {
        self.ops
    }
}

/// Analysis lifecycle and discovery hooks. All hooks default to no-ops;
/// a plugin implements the ones it cares about.
pub trait Plugin: Send {
    fn name(&self) -> &'static str;

    /// Before the fixpoint loop starts
    fn on_start(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// After the worklist drains, before the result is frozen
    fn on_finish(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// A method became reachable for the first time in any context
    fn on_new_method(&mut self, ctx: &mut PluginContext<'_>, method: MethodId) -> Result<()> {
        let _ = (ctx, method);
        Ok(())
    }

    /// A (context, method) pair became reachable
    fn on_new_cs_method(
        &mut self,
        ctx: &mut PluginContext<'_>,
        cs_method: CsMethodId,
    ) -> Result<()> {
        let _ = (ctx, cs_method);
        Ok(())
    }

    /// A call edge was added to the call graph
    fn on_new_call_edge(&mut self, ctx: &mut PluginContext<'_>, edge: CallEdge) -> Result<()> {
        let _ = (ctx, edge);
        Ok(())
    }

    /// A pointer's points-to set grew by `delta`
    fn on_new_points_to_set(
        &mut self,
        ctx: &mut PluginContext<'_>,
        pointer: PointerId,
        delta: &PointsToSet,
    ) -> Result<()> {
        let _ = (ctx, pointer, delta);
        Ok(())
    }

    /// A call could not be resolved by ordinary dispatch: a dynamic
    /// call site, or a receiver whose type declares no matching method
    fn on_unresolved_call(
        &mut self,
        ctx: &mut PluginContext<'_>,
        recv: Option<ObjId>,
        site: CallSiteId,
        caller_ctx: CtxId,
    ) -> Result<()> {
        let _ = (ctx, recv, site, caller_ctx);
        Ok(())
    }
}

/// Aggregates registered plugins and fans every hook out in
/// registration order.
#[derive(Default)]
pub struct CompositePlugin {
    plugins: Vec<Box<dyn Plugin>>,
}

impl CompositePlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Dispatch a hook to every plugin. Recoverable errors are logged
    /// and skipped; the first fatal error is returned once all plugins
    /// have been given their turn.
    fn fan_out(&mut self, mut f: impl FnMut(&mut dyn Plugin) -> Result<()>) -> Result<()> {
        let mut fatal = None;
        for plugin in &mut self.plugins {
            if let Err(e) = f(plugin.as_mut()) {
                if e.is_recoverable() {
                    warn!(plugin = plugin.name(), error = %e, "plugin hook failed; continuing");
                } else if fatal.is_none() {
                    fatal = Some(e);
                }
            }
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Plugin for CompositePlugin {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn on_start(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        self.fan_out(|p| p.on_start(ctx))
    }

    fn on_finish(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        self.fan_out(|p| p.on_finish(ctx))
    }

    fn on_new_method(&mut self, ctx: &mut PluginContext<'_>, method: MethodId) -> Result<()> {
        self.fan_out(|p| p.on_new_method(ctx, method))
    }

    fn on_new_cs_method(
        &mut self,
        ctx: &mut PluginContext<'_>,
        cs_method: CsMethodId,
    ) -> Result<()> {
        self.fan_out(|p| p.on_new_cs_method(ctx, cs_method))
    }

    fn on_new_call_edge(&mut self, ctx: &mut PluginContext<'_>, edge: CallEdge) -> Result<()> {
        self.fan_out(|p| p.on_new_call_edge(ctx, edge))
    }

    fn on_new_points_to_set(
        &mut self,
        ctx: &mut PluginContext<'_>,
        pointer: PointerId,
        delta: &PointsToSet,
    ) -> Result<()> {
        self.fan_out(|p| p.on_new_points_to_set(ctx, pointer, delta))
    }

    fn on_unresolved_call(
        &mut self,
        ctx: &mut PluginContext<'_>,
        recv: Option<ObjId>,
        site: CallSiteId,
        caller_ctx: CtxId,
    ) -> Result<()> {
        self.fan_out(|p| p.on_unresolved_call(ctx, recv, site, caller_ctx))
    }
}
