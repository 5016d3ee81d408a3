//! Exception flow
//!
//! Threads thrown objects along catch-handler chains: within a method,
//! a thrown object reaches the first handler whose catch type admits
//! it; objects no handler catches escape to every caller, where they
//! are rethrown at the call site. Escaped sets are remembered so call
//! edges discovered later still receive them.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cs::{CsMethodId, PointerId};
use crate::errors::Result;
use crate::graph::CallEdge;
use crate::heap::ObjId;
use crate::plugin::{Plugin, PluginContext};

#[derive(Default)]
pub struct ExceptionAnalysis {
    processed: FxHashSet<CsMethodId>,
    /// Pointer of a thrown variable -> the method it throws in
    throw_ptrs: FxHashMap<PointerId, CsMethodId>,
    /// Thrown objects escaping each method
    uncaught: FxHashMap<CsMethodId, FxHashSet<ObjId>>,
}

impl ExceptionAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver thrown objects to `cs_method`: catch locally or escape
    /// to callers, transitively.
    fn handle_thrown(
        &mut self,
        ctx: &mut PluginContext<'_>,
        cs_method: CsMethodId,
        objs: &[ObjId],
    ) {
        let (mctx, method) = ctx.cs.method_parts(cs_method);
        let world = ctx.world.clone();
        let handlers = &world.program.method(method).handlers;
        for &obj in objs {
            let ty = ctx.heap.obj_type(obj);
            let caught = handlers
                .iter()
                .find(|h| world.types.is_subtype(ty, h.catch_ty));
            match caught {
                Some(h) => {
                    let p = ctx.cs.var_ptr(mctx, h.var);
                    ctx.add_points_to(p, vec![obj]);
                }
                None => {
                    if !self
                        .uncaught
                        .entry(cs_method)
                        .or_default()
                        .insert(obj)
                    {
                        continue;
                    }
                    // Rethrow at every known caller.
                    for edge in ctx.call_graph.edges_into(cs_method) {
                        let caller_method = world.program.call_site(edge.site).method;
                        let caller = ctx.cs.cs_method(edge.caller_ctx, caller_method);
                        self.handle_thrown(ctx, caller, &[obj]);
                    }
                }
            }
        }
    }
}

impl Plugin for ExceptionAnalysis {
    fn name(&self) -> &'static str {
        "exception-analysis"
    }

    fn on_new_cs_method(
        &mut self,
        ctx: &mut PluginContext<'_>,
        cs_method: CsMethodId,
    ) -> Result<()> {
        if !self.processed.insert(cs_method) {
            return Ok(());
        }
        let (mctx, method) = ctx.cs.method_parts(cs_method);
        let world = ctx.world.clone();
        for stmt in &world.program.method(method).stmts {
            if let crate::ir::Stmt::Throw { var } = stmt {
                let p = ctx.cs.var_ptr(mctx, *var);
                self.throw_ptrs.insert(p, cs_method);
                if let Some(pts) = ctx.pts(p) {
                    let objs: Vec<ObjId> = pts.iter().collect();
                    self.handle_thrown(ctx, cs_method, &objs);
                }
            }
        }
        Ok(())
    }

    fn on_new_points_to_set(
        &mut self,
        ctx: &mut PluginContext<'_>,
        pointer: PointerId,
        delta: &crate::collections::PointsToSet,
    ) -> Result<()> {
        if let Some(&cs_method) = self.throw_ptrs.get(&pointer) {
            let objs: Vec<ObjId> = delta.iter().collect();
            self.handle_thrown(ctx, cs_method, &objs);
        }
        Ok(())
    }

    fn on_new_call_edge(&mut self, ctx: &mut PluginContext<'_>, edge: CallEdge) -> Result<()> {
        // Escaped exceptions of the callee reach this new caller too.
        let escaped: Vec<ObjId> = self
            .uncaught
            .get(&edge.callee)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        if escaped.is_empty() {
            return Ok(());
        }
        let caller_method = ctx.world.program.call_site(edge.site).method;
        let caller = ctx.cs.cs_method(edge.caller_ctx, caller_method);
        self.handle_thrown(ctx, caller, &escaped);
        Ok(())
    }
}
