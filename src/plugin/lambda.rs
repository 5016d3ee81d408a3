//! Lambda / invokedynamic desugaring
//!
//! A dynamic call site produces a synthetic functional-interface
//! instance carrying its bootstrap information. When an interface
//! method is later invoked on such an instance and ordinary dispatch
//! finds no target, the invocation is forwarded to the implementation
//! method: captured variables feed the leading parameters (or the
//! receiver), invocation arguments feed the rest, and returned values
//! flow back to the call-site result.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::CtxId;
use crate::errors::Result;
use crate::graph::FlowKind;
use crate::heap::{ObjId, ObjKind};
use crate::ir::{CallSiteId, DynamicInfo};
use crate::plugin::{Plugin, PluginContext};

#[derive(Default)]
pub struct LambdaAnalysis {
    /// Contexts each dynamic site was instantiated under
    creation_ctxs: FxHashMap<CallSiteId, FxHashSet<CtxId>>,
    /// Implementation contexts each dynamic site has dispatched into
    impl_ctxs: FxHashMap<CallSiteId, FxHashSet<CtxId>>,
}

impl LambdaAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect captured variables of one creation context to the
    /// implementation parameters under one callee context. Edge
    /// insertion is idempotent, so re-wiring is harmless.
    fn wire_captures(
        ctx: &mut PluginContext<'_>,
        info: &DynamicInfo,
        creation_ctx: CtxId,
        callee_ctx: CtxId,
    ) {
        let mdef = ctx.world.program.method(info.impl_method);
        let mut captured = info.captured.iter();
        if let (false, Some(this)) = (mdef.is_static, mdef.this_var) {
            if let Some(&recv_cap) = captured.next() {
                let source = ctx.cs.var_ptr(creation_ctx, recv_cap);
                let target = ctx.cs.var_ptr(callee_ctx, this);
                ctx.add_edge(source, target, FlowKind::Parameter, None);
            }
        }
        for (&cap, &param) in captured.zip(mdef.params.iter()) {
            let source = ctx.cs.var_ptr(creation_ctx, cap);
            let target = ctx.cs.var_ptr(callee_ctx, param);
            ctx.add_edge(source, target, FlowKind::Parameter, None);
        }
    }

    fn handle_creation(
        &mut self,
        ctx: &mut PluginContext<'_>,
        site: CallSiteId,
        caller_ctx: CtxId,
    ) {
        let world = ctx.world.clone();
        let csd = world.program.call_site(site);
        let Some(info) = &csd.dynamic else { return };
        let obj = ctx.heap.lambda_obj(site, info.interface);
        if let Some(result) = csd.result {
            let p = ctx.cs.var_ptr(caller_ctx, result);
            ctx.add_points_to(p, vec![obj]);
        }
        if self
            .creation_ctxs
            .entry(site)
            .or_default()
            .insert(caller_ctx)
        {
            // Invocations discovered before this creation context.
            let impl_ctxs: Vec<CtxId> = self
                .impl_ctxs
                .get(&site)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default();
            for callee_ctx in impl_ctxs {
                Self::wire_captures(ctx, info, caller_ctx, callee_ctx);
            }
        }
    }

    fn handle_invocation(
        &mut self,
        ctx: &mut PluginContext<'_>,
        obj: ObjId,
        site: CallSiteId,
        caller_ctx: CtxId,
    ) {
        let ObjKind::Lambda(dyn_site) = ctx.heap.obj(obj).kind else {
            return;
        };
        let world = ctx.world.clone();
        let Some(info) = &world.program.call_site(dyn_site).dynamic else {
            return;
        };
        let inv = world.program.call_site(site);
        if inv.subsig != info.interface_subsig {
            return;
        }
        let callee_ctx = ctx.selector.select_context(site, caller_ctx, None);
        ctx.add_call_edge(
            site,
            caller_ctx,
            info.impl_method,
            callee_ctx,
            inv.kind,
            None,
            false,
        );
        let mdef = world.program.method(info.impl_method);
        // Invocation arguments fill the parameters after the captures.
        let captured_params = info.captured.len().saturating_sub(usize::from(
            !mdef.is_static && mdef.this_var.is_some(),
        ));
        for (&arg, &param) in inv.args.iter().zip(mdef.params.iter().skip(captured_params)) {
            let source = ctx.cs.var_ptr(caller_ctx, arg);
            let target = ctx.cs.var_ptr(callee_ctx, param);
            ctx.add_edge(source, target, FlowKind::Parameter, None);
        }
        if let Some(result) = inv.result {
            let target = ctx.cs.var_ptr(caller_ctx, result);
            for &rv in &mdef.return_vars {
                let source = ctx.cs.var_ptr(callee_ctx, rv);
                ctx.add_edge(source, target, FlowKind::Return, None);
            }
        }
        if self.impl_ctxs.entry(dyn_site).or_default().insert(callee_ctx) {
            let creation_ctxs: Vec<CtxId> = self
                .creation_ctxs
                .get(&dyn_site)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default();
            for creation_ctx in creation_ctxs {
                Self::wire_captures(ctx, info, creation_ctx, callee_ctx);
            }
        }
    }
}

impl Plugin for LambdaAnalysis {
    fn name(&self) -> &'static str {
        "lambda-analysis"
    }

    fn on_unresolved_call(
        &mut self,
        ctx: &mut PluginContext<'_>,
        recv: Option<ObjId>,
        site: CallSiteId,
        caller_ctx: CtxId,
    ) -> Result<()> {
        match recv {
            None => self.handle_creation(ctx, site, caller_ctx),
            Some(obj) => self.handle_invocation(ctx, obj, site, caller_ctx),
        }
        Ok(())
    }
}
