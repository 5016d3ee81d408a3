//! Naive reference solver
//!
//! Same semantics as the default solver, none of its incrementality:
//! instead of a delta worklist, this solver sweeps every pointer each
//! round, re-propagating full points-to sets and re-deriving
//! object-dependent constraints, until a whole round changes nothing.
//! Slow, obviously correct, and kept for cross-checking: both solvers
//! must freeze identical results on the same input.

use std::sync::Arc;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::collections::PointsToSet;
use crate::context::{ContextPool, ContextSelector, CtxId, EMPTY_CTX};
use crate::cs::{CsManager, CsMethodId, PointerId, PointerKey};
use crate::errors::{PtaError, Result};
use crate::graph::{CallEdge, CallGraph, FlowGraph, FlowKind, PfgEdge};
use crate::heap::{HeapModel, ObjId};
use crate::ir::{CallKind, CallSiteId, MethodId, Stmt, TypeId, TypeKind};
use crate::plugin::{CompositePlugin, Plugin, PluginContext, SolverOp, TaintFlow};
use crate::solver::{CancelToken, MethodSummary, PointerAnalysisResult, Solver};
use crate::World;

pub struct SimpleSolver {
    world: Arc<World>,
    heap: Arc<HeapModel>,
    ctxs: Arc<ContextPool>,
    cs: Arc<CsManager>,
    selector: Box<dyn ContextSelector>,
    plugins: CompositePlugin,
    graph: FlowGraph,
    call_graph: CallGraph,
    reachable_methods: FxHashSet<MethodId>,
    summaries: FxHashMap<MethodId, Arc<MethodSummary>>,
    taint_flows: Vec<TaintFlow>,
    cancel: CancelToken,
    pending_fatal: Option<PtaError>,
    /// Did the current round change anything?
    changed: bool,
    /// Pointers whose sets grew in the current round
    grown: Vec<PointerId>,
}

impl SimpleSolver {
    pub fn new(
        world: Arc<World>,
        heap: Arc<HeapModel>,
        ctxs: Arc<ContextPool>,
        selector: Box<dyn ContextSelector>,
        plugins: CompositePlugin,
        cancel: CancelToken,
    ) -> Self {
        Self {
            world,
            heap,
            ctxs,
            cs: Arc::new(CsManager::new()),
            selector,
            plugins,
            graph: FlowGraph::new(),
            call_graph: CallGraph::new(),
            reachable_methods: FxHashSet::default(),
            summaries: FxHashMap::default(),
            taint_flows: Vec::new(),
            cancel,
            pending_fatal: None,
            changed: false,
            grown: Vec::new(),
        }
    }

    fn solve_impl(mut self) -> Result<PointerAnalysisResult> {
        let started = Instant::now();
        info!(solver = "simple", "starting pointer analysis");
        self.broadcast(|pl, cx| pl.on_start(cx))?;
        self.check_fatal()?;

        let entries: Vec<MethodId> = self.world.program.entry_points().to_vec();
        for m in entries {
            let csm = self.cs.cs_method(EMPTY_CTX, m);
            self.add_reachable(csm)?;
        }

        let mut rounds = 0usize;
        loop {
            self.cancel.check()?;
            self.changed = false;
            rounds += 1;

            self.materialize_round()?;
            self.propagate_round();
            self.notify_grown()?;
            self.check_fatal()?;

            if !self.changed {
                break;
            }
        }

        self.broadcast(|pl, cx| pl.on_finish(cx))?;
        self.check_fatal()?;

        info!(
            rounds,
            reachable = self.call_graph.num_reachable(),
            call_edges = self.call_graph.num_edges(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pointer analysis finished"
        );
        Ok(self.freeze())
    }

    /// Re-derive every object-dependent constraint from the full
    /// points-to sets: per-object field and array edges, and call
    /// resolution on every receiver object.
    fn materialize_round(&mut self) -> Result<()> {
        let world = Arc::clone(&self.world);
        let cs = Arc::clone(&self.cs);
        // The pointer universe grows while we materialize; iterate by
        // index so newcomers are handled next round at the latest.
        let mut i = 0;
        while i < cs.num_pointers() {
            let p = i as PointerId;
            i += 1;
            let PointerKey::Var { ctx, var } = cs.key(p) else {
                continue;
            };
            let pts = match self.graph.pts(p) {
                Some(s) if !s.is_empty() => s.clone(),
                _ => continue,
            };
            let method = world.program.var(var).method;
            let summary = self.summary(method);
            let Some(acc) = summary.for_var(var) else {
                continue;
            };
            for obj in pts.iter() {
                for &(field, rhs) in &acc.field_stores {
                    let source = cs.var_ptr(ctx, rhs);
                    let target = cs.instance_field_ptr(obj, field);
                    self.add_pfg_edge(source, target, FlowKind::InstanceStore, None);
                }
                for &(field, lhs) in &acc.field_loads {
                    let source = cs.instance_field_ptr(obj, field);
                    let target = cs.var_ptr(ctx, lhs);
                    self.add_pfg_edge(source, target, FlowKind::InstanceLoad, None);
                }
                if matches!(world.types.kind(self.heap.obj_type(obj)), TypeKind::Array(_)) {
                    for &rhs in &acc.array_stores {
                        let source = cs.var_ptr(ctx, rhs);
                        let target = cs.array_ptr(obj);
                        self.add_pfg_edge(source, target, FlowKind::ArrayStore, None);
                    }
                    for &lhs in &acc.array_loads {
                        let source = cs.array_ptr(obj);
                        let target = cs.var_ptr(ctx, lhs);
                        self.add_pfg_edge(source, target, FlowKind::ArrayLoad, None);
                    }
                }
                for &site in &acc.invokes {
                    self.process_call(site, ctx, obj)?;
                }
            }
        }
        Ok(())
    }

    /// Push every pointer's full set across its outgoing edges once.
    fn propagate_round(&mut self) {
        let mut p = 0;
        while (p as usize) < self.graph.len() {
            let source = match self.graph.pts(p) {
                Some(s) if !s.is_empty() => s.clone(),
                _ => {
                    p += 1;
                    continue;
                }
            };
            let edges: Vec<PfgEdge> = self.graph.edges(p).to_vec();
            for e in edges {
                let filtered = self.apply_filter(&source, e.filter);
                if !filtered.is_empty() {
                    self.add_points_to(e.target, &filtered);
                }
            }
            p += 1;
        }
    }

    /// Report grown pointers to plugins, handing the full current set
    /// as the delta; plugin reactions must be idempotent and are.
    /// Plugin reactions may grow further sets, so drain to quiescence.
    fn notify_grown(&mut self) -> Result<()> {
        loop {
            let grown = std::mem::take(&mut self.grown);
            if grown.is_empty() {
                return Ok(());
            }
            let mut seen = FxHashSet::default();
            for p in grown {
                if !seen.insert(p) {
                    continue;
                }
                let full = self.graph.pts(p).cloned().unwrap_or_default();
                self.broadcast(move |pl, cx| pl.on_new_points_to_set(cx, p, &full))?;
            }
        }
    }

    // ------------------------------------------------------------------
    // Core operations (non-incremental)
    // ------------------------------------------------------------------

    fn add_points_to(&mut self, p: PointerId, objs: &PointsToSet) {
        let node = self.graph.ensure(p);
        let delta = node.pts.add_all_diff(objs);
        if !delta.is_empty() {
            self.changed = true;
            self.grown.push(p);
        }
    }

    fn add_pfg_edge(
        &mut self,
        source: PointerId,
        target: PointerId,
        kind: FlowKind,
        filter: Option<TypeId>,
    ) {
        if self.graph.add_edge(
            source,
            PfgEdge {
                target,
                kind,
                filter,
            },
        ) {
            self.changed = true;
        }
    }

    fn apply_filter(&self, set: &PointsToSet, filter: Option<TypeId>) -> PointsToSet {
        match filter {
            None => set.clone(),
            Some(ty) => set
                .iter()
                .filter(|&o| self.world.types.is_subtype(self.heap.obj_type(o), ty))
                .collect(),
        }
    }

    fn summary(&mut self, method: MethodId) -> Arc<MethodSummary> {
        if let Some(s) = self.summaries.get(&method) {
            return Arc::clone(s);
        }
        let mdef = self.world.program.method(method);
        // Opaque bodies contribute no object-dependent constraints.
        let opaque =
            self.world.options.only_app && !self.world.types.is_application(mdef.class);
        let summary = if opaque {
            Arc::new(MethodSummary::default())
        } else {
            Arc::new(MethodSummary::build(mdef, &self.world.program))
        };
        self.summaries.insert(method, Arc::clone(&summary));
        summary
    }

    // ------------------------------------------------------------------
    // Calls & reachability
    // ------------------------------------------------------------------

    fn process_call(&mut self, site: CallSiteId, caller_ctx: CtxId, recv: ObjId) -> Result<()> {
        let world = Arc::clone(&self.world);
        let csd = world.program.call_site(site);
        let target = match csd.kind {
            CallKind::Virtual | CallKind::Interface => {
                world.types.dispatch(self.heap.obj_type(recv), csd.subsig)
            }
            CallKind::Special => world.types.dispatch(csd.declared_class, csd.subsig),
            CallKind::Static | CallKind::Dynamic => None,
        };
        let Some(target) = target else {
            // Notify once per (site, receiver) pair; plugins dedup.
            self.broadcast(|pl, cx| pl.on_unresolved_call(cx, Some(recv), site, caller_ctx))?;
            return Ok(());
        };
        let callee_ctx = self.selector.select_context(site, caller_ctx, Some(recv));
        self.add_call_edge(site, caller_ctx, target, callee_ctx, csd.kind, Some(recv), true)
    }

    fn process_static_call(&mut self, site: CallSiteId, caller_ctx: CtxId) -> Result<()> {
        let world = Arc::clone(&self.world);
        let csd = world.program.call_site(site);
        let Some(target) = world.types.dispatch(csd.declared_class, csd.subsig) else {
            self.broadcast(|pl, cx| pl.on_unresolved_call(cx, None, site, caller_ctx))?;
            return Ok(());
        };
        let callee_ctx = self.selector.select_context(site, caller_ctx, None);
        self.add_call_edge(site, caller_ctx, target, callee_ctx, CallKind::Static, None, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn add_call_edge(
        &mut self,
        site: CallSiteId,
        caller_ctx: CtxId,
        callee: MethodId,
        callee_ctx: CtxId,
        kind: CallKind,
        recv: Option<ObjId>,
        wire_args: bool,
    ) -> Result<()> {
        let callee_cs = self.cs.cs_method(callee_ctx, callee);
        let edge = CallEdge {
            site,
            caller_ctx,
            callee: callee_cs,
            kind,
        };
        if !self.call_graph.add_edge(edge) {
            return Ok(());
        }
        self.changed = true;
        debug!(site, callee, "new call edge");
        self.broadcast(move |pl, cx| pl.on_new_call_edge(cx, edge))?;
        self.add_reachable(callee_cs)?;
        if let Some(obj) = recv {
            let world = Arc::clone(&self.world);
            if let Some(this) = world.program.method(callee).this_var {
                let this_ptr = self.cs.var_ptr(callee_ctx, this);
                self.add_points_to(this_ptr, &PointsToSet::singleton(obj));
            }
        }
        if wire_args {
            self.wire_call(site, caller_ctx, callee, callee_ctx);
        }
        Ok(())
    }

    fn wire_call(
        &mut self,
        site: CallSiteId,
        caller_ctx: CtxId,
        callee: MethodId,
        callee_ctx: CtxId,
    ) {
        let world = Arc::clone(&self.world);
        let cs = Arc::clone(&self.cs);
        let csd = world.program.call_site(site);
        let mdef = world.program.method(callee);
        for (&arg, &param) in csd.args.iter().zip(mdef.params.iter()) {
            let source = cs.var_ptr(caller_ctx, arg);
            let target = cs.var_ptr(callee_ctx, param);
            self.add_pfg_edge(source, target, FlowKind::Parameter, None);
        }
        if let Some(result) = csd.result {
            let target = cs.var_ptr(caller_ctx, result);
            for &rv in &mdef.return_vars {
                let source = cs.var_ptr(callee_ctx, rv);
                self.add_pfg_edge(source, target, FlowKind::Return, None);
            }
        }
    }

    fn add_reachable(&mut self, csm: CsMethodId) -> Result<()> {
        if !self.call_graph.add_reachable(csm) {
            return Ok(());
        }
        self.changed = true;
        self.broadcast(move |pl, cx| pl.on_new_cs_method(cx, csm))?;
        let (ctx, method) = self.cs.method_parts(csm);
        if self.reachable_methods.insert(method) {
            self.broadcast(move |pl, cx| pl.on_new_method(cx, method))?;
        }
        let world = Arc::clone(&self.world);
        let mdef = world.program.method(method);
        if mdef.is_abstract {
            return Ok(());
        }
        if world.options.only_app && !world.types.is_application(mdef.class) {
            return Ok(());
        }
        self.process_stmts(ctx, method)
    }

    fn process_stmts(&mut self, ctx: CtxId, method: MethodId) -> Result<()> {
        let world = Arc::clone(&self.world);
        let cs = Arc::clone(&self.cs);
        let mdef = world.program.method(method);
        for stmt in &mdef.stmts {
            match *stmt {
                Stmt::New { lhs, site } => {
                    let heap_ctx = self.selector.select_heap_context(site, ctx);
                    let obj = self.heap.obj_at(site, heap_ctx);
                    let p = cs.var_ptr(ctx, lhs);
                    self.add_points_to(p, &PointsToSet::singleton(obj));
                }
                Stmt::Copy { lhs, rhs } => {
                    let source = cs.var_ptr(ctx, rhs);
                    let target = cs.var_ptr(ctx, lhs);
                    self.add_pfg_edge(source, target, FlowKind::LocalAssign, None);
                }
                Stmt::Cast { lhs, rhs, ty } => {
                    let source = cs.var_ptr(ctx, rhs);
                    let target = cs.var_ptr(ctx, lhs);
                    self.add_pfg_edge(source, target, FlowKind::Cast, Some(ty));
                }
                Stmt::LoadStatic { lhs, field } => {
                    let source = cs.static_field_ptr(field);
                    let target = cs.var_ptr(ctx, lhs);
                    self.add_pfg_edge(source, target, FlowKind::StaticLoad, None);
                }
                Stmt::StoreStatic { field, rhs } => {
                    let source = cs.var_ptr(ctx, rhs);
                    let target = cs.static_field_ptr(field);
                    self.add_pfg_edge(source, target, FlowKind::StaticStore, None);
                }
                Stmt::Invoke(site) => {
                    let kind = world.program.call_site(site).kind;
                    match kind {
                        CallKind::Static => self.process_static_call(site, ctx)?,
                        CallKind::Dynamic => {
                            self.broadcast(move |pl, cx| {
                                pl.on_unresolved_call(cx, None, site, ctx)
                            })?;
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plugin bus
    // ------------------------------------------------------------------

    fn broadcast(
        &mut self,
        f: impl FnOnce(&mut CompositePlugin, &mut PluginContext<'_>) -> Result<()>,
    ) -> Result<()> {
        let mut plugins = std::mem::take(&mut self.plugins);
        let mut pctx = PluginContext::new(
            &self.world,
            &self.heap,
            &self.cs,
            &self.ctxs,
            self.selector.as_ref(),
            &self.graph,
            &self.call_graph,
        );
        let outcome = f(&mut plugins, &mut pctx);
        let ops = pctx.take_ops();
        self.plugins = plugins;
        if let Err(e) = outcome {
            if self.pending_fatal.is_none() {
                self.pending_fatal = Some(e);
            }
        }
        self.apply_ops(ops)
    }

    fn check_fatal(&mut self) -> Result<()> {
        match self.pending_fatal.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn apply_ops(&mut self, ops: Vec<SolverOp>) -> Result<()> {
        for op in ops {
            match op {
                SolverOp::AddPointsTo { pointer, objs } => {
                    let set: PointsToSet = objs.into_iter().collect();
                    self.add_points_to(pointer, &set);
                }
                SolverOp::AddEdge {
                    source,
                    target,
                    kind,
                    filter,
                } => {
                    self.add_pfg_edge(source, target, kind, filter);
                }
                SolverOp::MakeReachable { method, ctx } => {
                    let csm = self.cs.cs_method(ctx, method);
                    self.add_reachable(csm)?;
                }
                SolverOp::AddCallEdge {
                    site,
                    caller_ctx,
                    callee,
                    callee_ctx,
                    kind,
                    recv_obj,
                    wire_args,
                } => {
                    self.add_call_edge(
                        site, caller_ctx, callee, callee_ctx, kind, recv_obj, wire_args,
                    )?;
                }
                SolverOp::ReportTaintFlow(flow) => {
                    self.taint_flows.push(flow);
                }
            }
        }
        Ok(())
    }

    fn freeze(self) -> PointerAnalysisResult {
        PointerAnalysisResult::new(
            self.world,
            self.heap,
            self.ctxs,
            self.cs,
            self.graph.into_points_to_sets(),
            self.call_graph,
            self.taint_flows,
        )
    }
}

impl Solver for SimpleSolver {
    fn solve(self: Box<Self>) -> Result<PointerAnalysisResult> {
        (*self).solve_impl()
    }
}
