//! Thread modeling
//!
//! `Thread.start()` dispatches to the receiver's `run()` method, and
//! `Thread.currentThread()` yields the implicit main-thread object.
//! Receiver objects arriving at registered `start()` sites trigger
//! `run()` resolution with the configured context selector.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::CtxId;
use crate::cs::{CsMethodId, PointerId};
use crate::errors::Result;
use crate::heap::ObjId;
use crate::ir::{CallSiteId, Stmt};
use crate::plugin::{Plugin, PluginContext};

#[derive(Default)]
pub struct ThreadHandler {
    processed: FxHashSet<CsMethodId>,
    /// Receiver pointer of a start() call -> the sites it serves
    start_sites: FxHashMap<PointerId, Vec<(CallSiteId, CtxId)>>,
    dispatched: FxHashSet<(CallSiteId, CtxId, ObjId)>,
}

impl ThreadHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_thread_class(ctx: &PluginContext<'_>, ty: crate::ir::TypeId) -> bool {
        match ctx.world.types.lookup("java.lang.Thread") {
            Some(thread) => ctx.world.types.is_subtype(ty, thread),
            None => false,
        }
    }

    fn dispatch_run(
        &mut self,
        ctx: &mut PluginContext<'_>,
        site: CallSiteId,
        caller_ctx: CtxId,
        objs: &[ObjId],
    ) {
        let run = ctx.world.types.subsig("run()");
        for &obj in objs {
            if !self.dispatched.insert((site, caller_ctx, obj)) {
                continue;
            }
            let recv_ty = ctx.heap.obj_type(obj);
            if let Some(target) = ctx.world.types.dispatch(recv_ty, run) {
                let callee_ctx = ctx.selector.select_context(site, caller_ctx, Some(obj));
                ctx.add_call_edge(
                    site,
                    caller_ctx,
                    target,
                    callee_ctx,
                    crate::ir::CallKind::Virtual,
                    Some(obj),
                    true,
                );
            }
        }
    }
}

impl Plugin for ThreadHandler {
    fn name(&self) -> &'static str {
        "thread-handler"
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
        let mdef = world.program.method(method);
        for stmt in &mdef.stmts {
            let Stmt::Invoke(site) = stmt else { continue };
            let csd = world.program.call_site(*site);
            if !Self::is_thread_class(ctx, csd.declared_class) {
                continue;
            }
            let subsig = world.types.subsig_name(csd.subsig);
            if subsig == "start()" {
                if let Some(recv) = csd.recv {
                    let p = ctx.cs.var_ptr(mctx, recv);
                    self.start_sites.entry(p).or_default().push((*site, mctx));
                    // Receivers that arrived before registration.
                    if let Some(pts) = ctx.pts(p) {
                        let objs: Vec<ObjId> = pts.iter().collect();
                        self.dispatch_run(ctx, *site, mctx, &objs);
                    }
                }
            } else if subsig == "currentThread()" {
                if let Some(result) = csd.result {
                    if let Some(main) = ctx.heap.main_thread_obj() {
                        let p = ctx.cs.var_ptr(mctx, result);
                        ctx.add_points_to(p, vec![main]);
                    }
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
        let Some(sites) = self.start_sites.get(&pointer) else {
            return Ok(());
        };
        let sites = sites.clone();
        let objs: Vec<ObjId> = delta.iter().collect();
        for (site, caller_ctx) in sites {
            self.dispatch_run(ctx, site, caller_ctx, &objs);
        }
        Ok(())
    }
}
