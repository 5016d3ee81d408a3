//! Frozen analysis result
//!
//! Read-only snapshot produced when the worklist drains: points-to sets
//! for every pointer kind, the call graph, reachable methods, the
//! context-insensitive projection, taint flows, and summary statistics.
//! Report rendering works over any points-to source so the result
//! processor plugin can render the same text from the live solver
//! state.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::collections::PointsToSet;
use crate::context::{ContextElem, ContextPool, CtxId, EMPTY_CTX};
use crate::cs::{CsManager, CsMethodId, PointerId, PointerKey};
use crate::graph::{CallEdge, CallGraph, FlowGraph};
use crate::heap::{HeapModel, ObjData, ObjId, ObjKind};
use crate::ir::{MethodId, SiteId, VarId};
use crate::plugin::TaintFlow;
use crate::World;

/// Anything that can answer points-to queries by pointer id.
pub trait PtsSource {
    fn pts_of(&self, p: PointerId) -> Option<&PointsToSet>;
}

impl PtsSource for FlowGraph {
    fn pts_of(&self, p: PointerId) -> Option<&PointsToSet> {
        self.pts(p)
    }
}

impl PtsSource for Vec<PointsToSet> {
    fn pts_of(&self, p: PointerId) -> Option<&PointsToSet> {
        self.get(p as usize)
    }
}

/// Read-only view over the solved state.
pub struct PointerAnalysisResult {
    world: Arc<World>,
    heap: Arc<HeapModel>,
    ctxs: Arc<ContextPool>,
    cs: Arc<CsManager>,
    /// Points-to sets addressed by pointer id
    pts: Vec<PointsToSet>,
    call_graph: CallGraph,
    taint_flows: Vec<TaintFlow>,
}

impl PtsSource for PointerAnalysisResult {
    fn pts_of(&self, p: PointerId) -> Option<&PointsToSet> {
        self.pts.get(p as usize)
    }
}

impl PointerAnalysisResult {
    pub(crate) fn new(
        world: Arc<World>,
        heap: Arc<HeapModel>,
        ctxs: Arc<ContextPool>,
        cs: Arc<CsManager>,
        pts: Vec<PointsToSet>,
        call_graph: CallGraph,
        taint_flows: Vec<TaintFlow>,
    ) -> Self {
        Self {
            world,
            heap,
            ctxs,
            cs,
            pts,
            call_graph,
            taint_flows,
        }
    }

    fn view(&self) -> ReportView<'_, Self> {
        ReportView {
            world: &self.world,
            heap: &self.heap,
            ctxs: &self.ctxs,
            cs: &self.cs,
            pts: self,
            call_graph: &self.call_graph,
        }
    }

    // ------------------------------------------------------------------
    // Points-to accessors
    // ------------------------------------------------------------------

    pub fn points_to(&self, p: PointerId) -> &PointsToSet {
        static EMPTY: PointsToSet = PointsToSet::new();
        self.pts.get(p as usize).unwrap_or(&EMPTY)
    }

    /// PTS of a variable under one context, if that pointer exists.
    pub fn var_points_to(&self, ctx: CtxId, var: VarId) -> &PointsToSet {
        static EMPTY: PointsToSet = PointsToSet::new();
        match self.cs.find_var_ptr(ctx, var) {
            Some(p) => self.points_to(p),
            None => &EMPTY,
        }
    }

    /// Context-insensitive projection: the union of PTS(var, c) over
    /// every context c.
    pub fn ci_var_points_to(&self, var: VarId) -> PointsToSet {
        let mut out = PointsToSet::new();
        for (p, _, v) in self.cs.var_pointers() {
            if v == var {
                out.add_all_diff(self.points_to(p));
            }
        }
        out
    }

    /// Allocation sites behind the objects of a points-to set,
    /// discarding heap contexts. Useful for comparisons across
    /// context-sensitivity configurations.
    pub fn sites_of(&self, set: &PointsToSet) -> FxHashSet<SiteId> {
        set.iter()
            .filter_map(|o| match self.heap.obj(o).kind {
                ObjKind::Alloc(site) => Some(site),
                _ => None,
            })
            .collect()
    }

    pub fn obj(&self, id: ObjId) -> ObjData {
        self.heap.obj(id)
    }

    pub fn heap(&self) -> &HeapModel {
        &self.heap
    }

    pub fn cs(&self) -> &CsManager {
        &self.cs
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    // ------------------------------------------------------------------
    // Call graph
    // ------------------------------------------------------------------

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    pub fn call_edges(&self) -> &[CallEdge] {
        self.call_graph.edges()
    }

    pub fn reachable_cs_methods(&self) -> &[CsMethodId] {
        self.call_graph.reachable()
    }

    /// Reachable methods ignoring contexts.
    pub fn reachable_methods(&self) -> FxHashSet<MethodId> {
        self.call_graph
            .reachable()
            .iter()
            .map(|&csm| self.cs.method_parts(csm).1)
            .collect()
    }

    pub fn is_reachable(&self, method: MethodId) -> bool {
        self.reachable_methods().contains(&method)
    }

    pub fn taint_flows(&self) -> &[TaintFlow] {
        &self.taint_flows
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn stats(&self) -> PtaStats {
        let var_ptrs = self.cs.var_pointers();
        let distinct_vars: FxHashSet<VarId> = var_ptrs.iter().map(|&(_, _, v)| v).collect();
        let var_pts_size: usize = var_ptrs
            .iter()
            .map(|&(p, _, _)| self.points_to(p).len())
            .sum();
        let ifield_pts_size: usize = self
            .cs
            .instance_field_pointers()
            .iter()
            .map(|&(p, _, _)| self.points_to(p).len())
            .sum();
        let array_pts_size: usize = self
            .cs
            .array_pointers()
            .iter()
            .map(|&(p, _)| self.points_to(p).len())
            .sum();
        let sfield_pts_size: usize = self
            .cs
            .static_field_pointers()
            .iter()
            .map(|&(p, _)| self.points_to(p).len())
            .sum();
        let insens_edges: FxHashSet<(u32, MethodId)> = self
            .call_graph
            .edges()
            .iter()
            .map(|e| (e.site, self.cs.method_parts(e.callee).1))
            .collect();
        PtaStats {
            var_pointers_insens: distinct_vars.len(),
            var_pointers_sens: var_ptrs.len(),
            var_points_to_sens: var_pts_size,
            instance_field_points_to_sens: ifield_pts_size,
            array_points_to_sens: array_pts_size,
            static_field_points_to_sens: sfield_pts_size,
            reachable_insens: self.reachable_methods().len(),
            reachable_sens: self.call_graph.num_reachable(),
            call_edges_insens: insens_edges.len(),
            call_edges_sens: self.call_graph.num_edges(),
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    pub fn format_ctx(&self, ctx: CtxId) -> String {
        self.view().format_ctx(ctx)
    }

    pub fn format_obj(&self, obj: ObjId) -> String {
        self.view().format_obj(obj)
    }

    pub fn format_method(&self, method: MethodId) -> String {
        self.view().format_method(method)
    }

    pub fn format_cs_method(&self, csm: CsMethodId) -> String {
        self.view().format_cs_method(csm)
    }

    pub fn format_pointer(&self, p: PointerId) -> String {
        self.view().format_pointer(p)
    }

    /// Render the full result in deterministic (sorted) order.
    pub fn render_report(&self) -> String {
        self.view().render()
    }
}

/// Renders the report blocks from any points-to source: the frozen
/// result, or the live flow graph while the solver still owns it.
pub struct ReportView<'a, S: PtsSource> {
    pub world: &'a World,
    pub heap: &'a HeapModel,
    pub ctxs: &'a ContextPool,
    pub cs: &'a CsManager,
    pub pts: &'a S,
    pub call_graph: &'a CallGraph,
}

impl<'a, S: PtsSource> ReportView<'a, S> {
    fn points_to(&self, p: PointerId) -> PointsToSet {
        self.pts.pts_of(p).cloned().unwrap_or_default()
    }

    pub fn format_ctx(&self, ctx: CtxId) -> String {
        let elems = self.ctxs.elems(ctx);
        let parts: Vec<String> = elems
            .iter()
            .map(|e| match e {
                ContextElem::CallSite(s) => format!("call@{}", s),
                ContextElem::Obj(o) => self.format_obj(*o),
                ContextElem::Type(t) => self.world.types.name(*t),
            })
            .collect();
        format!("[{}]", parts.join(","))
    }

    pub fn format_obj(&self, obj: ObjId) -> String {
        let data = self.heap.obj(obj);
        let ty = self.world.types.name(data.ty);
        let core = match data.kind {
            ObjKind::Alloc(site) => {
                let method = self.world.program.site(site).method;
                format!("new {} @ {}/s{}", ty, self.format_method(method), site)
            }
            ObjKind::StringConstant(_) => {
                format!("\"{}\"", self.heap.literal(obj).unwrap_or_default())
            }
            ObjKind::Merged(t) => format!("<merged {}>", self.world.types.name(t)),
            ObjKind::Class(t) => format!("<class {}>", self.world.types.name(t)),
            ObjKind::Taint(site) => format!("<taint @ call@{}>", site),
            ObjKind::Lambda(site) => format!("<lambda {} @ call@{}>", ty, site),
            ObjKind::Reflective(site, t) => {
                format!("<reflective {} @ call@{}>", self.world.types.name(t), site)
            }
            ObjKind::MainThread => "<main-thread>".to_string(),
        };
        if data.heap_ctx != EMPTY_CTX {
            format!("{}{}", self.format_ctx(data.heap_ctx), core)
        } else {
            core
        }
    }

    pub fn format_method(&self, method: MethodId) -> String {
        let mdef = self.world.program.method(method);
        format!(
            "{}.{}",
            self.world.types.name(mdef.class),
            self.world.types.subsig_name(mdef.subsig)
        )
    }

    pub fn format_cs_method(&self, csm: CsMethodId) -> String {
        let (ctx, method) = self.cs.method_parts(csm);
        format!("{}{}", self.format_ctx(ctx), self.format_method(method))
    }

    pub fn format_pointer(&self, p: PointerId) -> String {
        match self.cs.key(p) {
            PointerKey::Var { ctx, var } => {
                let vd = self.world.program.var(var);
                format!(
                    "{}{}/{}",
                    self.format_ctx(ctx),
                    self.format_method(vd.method),
                    vd.name
                )
            }
            PointerKey::InstanceField { obj, field } => {
                let f = self.world.program.field(field);
                format!("{}.{}", self.format_obj(obj), f.name)
            }
            PointerKey::ArrayIndex { obj } => format!("{}[*]", self.format_obj(obj)),
            PointerKey::StaticField { field } => {
                let f = self.world.program.field(field);
                format!("{}.{}", self.world.types.name(f.class), f.name)
            }
        }
    }

    fn format_pts(&self, p: PointerId) -> String {
        let objs: Vec<String> = self
            .points_to(p)
            .iter()
            .map(|o| self.format_obj(o))
            .collect();
        format!("{} -> {{{}}}", self.format_pointer(p), objs.join(", "))
    }

    /// Reachable methods, call edges, then the points-to sets of every
    /// pointer kind, each block sorted for stable diffs.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("---------- Reachable methods: ----------\n");
        let mut methods: Vec<String> = self
            .call_graph
            .reachable()
            .iter()
            .map(|&m| self.format_cs_method(m))
            .collect();
        methods.sort();
        for m in methods {
            out.push_str(&m);
            out.push('\n');
        }
        out.push_str("---------- Call graph edges: ----------\n");
        let mut edges: Vec<String> = self
            .call_graph
            .edges()
            .iter()
            .map(|e| {
                format!(
                    "{}call@{} -[{}]-> {}",
                    self.format_ctx(e.caller_ctx),
                    e.site,
                    e.kind.as_str(),
                    self.format_cs_method(e.callee)
                )
            })
            .collect();
        edges.sort();
        for e in edges {
            out.push_str(&e);
            out.push('\n');
        }
        let sections: [(&str, Vec<PointerId>); 4] = [
            (
                "---------- Points-to sets of all variables: ----------",
                self.cs.var_pointers().iter().map(|&(p, _, _)| p).collect(),
            ),
            (
                "---------- Points-to sets of all instance fields: ----------",
                self.cs
                    .instance_field_pointers()
                    .iter()
                    .map(|&(p, _, _)| p)
                    .collect(),
            ),
            (
                "---------- Points-to sets of all array indexes: ----------",
                self.cs.array_pointers().iter().map(|&(p, _)| p).collect(),
            ),
            (
                "---------- Points-to sets of all static fields: ----------",
                self.cs
                    .static_field_pointers()
                    .iter()
                    .map(|&(p, _)| p)
                    .collect(),
            ),
        ];
        for (header, pointers) in sections {
            out.push_str(header);
            out.push('\n');
            let mut lines: Vec<String> = pointers.into_iter().map(|p| self.format_pts(p)).collect();
            lines.sort();
            for line in lines {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}

/// The statistics block of a finished analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtaStats {
    pub var_pointers_insens: usize,
    pub var_pointers_sens: usize,
    pub var_points_to_sens: usize,
    pub instance_field_points_to_sens: usize,
    pub array_points_to_sens: usize,
    pub static_field_points_to_sens: usize,
    pub reachable_insens: usize,
    pub reachable_sens: usize,
    pub call_edges_insens: usize,
    pub call_edges_sens: usize,
}

impl fmt::Display for PtaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-------------- Pointer analysis statistics: --------------")?;
        writeln!(
            f,
            "{:<30}{} (insens) / {} (sens)",
            "#var pointers:", self.var_pointers_insens, self.var_pointers_sens
        )?;
        writeln!(
            f,
            "{:<30}{} (sens)",
            "#var points-to:", self.var_points_to_sens
        )?;
        writeln!(
            f,
            "{:<30}{} (sens)",
            "#instance field points-to:", self.instance_field_points_to_sens
        )?;
        writeln!(
            f,
            "{:<30}{} (sens)",
            "#array points-to:", self.array_points_to_sens
        )?;
        writeln!(
            f,
            "{:<30}{} (sens)",
            "#static field points-to:", self.static_field_points_to_sens
        )?;
        writeln!(
            f,
            "{:<30}{} (insens) / {} (sens)",
            "#reachable methods:", self.reachable_insens, self.reachable_sens
        )?;
        writeln!(
            f,
            "{:<30}{} (insens) / {} (sens)",
            "#call graph edges:", self.call_edges_insens, self.call_edges_sens
        )?;
        write!(f, "----------------------------------------")
    }
}
