//! Class initialization
//!
//! Marks `<clinit>` reachable on the first use of a type: instance
//! creation, static field access, or static invocation, plus the
//! declaring class of every method that becomes reachable.
//! Superclasses are initialized before their subclasses, following JVM
//! initialization order.

use rustc_hash::FxHashSet;

use crate::context::EMPTY_CTX;
use crate::errors::Result;
use crate::ir::{AllocKind, MethodId, Stmt, TypeId};
use crate::plugin::{Plugin, PluginContext};

#[derive(Default)]
pub struct ClassInitializer {
    initialized: FxHashSet<TypeId>,
    processed: FxHashSet<MethodId>,
}

impl ClassInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn initialize(&mut self, ctx: &mut PluginContext<'_>, ty: TypeId) {
        if !self.initialized.insert(ty) {
            return;
        }
        if let Some(sup) = ctx.world.types.super_of(ty) {
            self.initialize(ctx, sup);
        }
        let clinit = ctx.world.types.subsig("<clinit>()");
        if let Some(m) = ctx.world.types.declared_method(ty, clinit) {
            ctx.make_reachable(m, EMPTY_CTX);
        }
    }
}

impl Plugin for ClassInitializer {
    fn name(&self) -> &'static str {
        "class-initializer"
    }

    fn on_new_method(&mut self, ctx: &mut PluginContext<'_>, method: MethodId) -> Result<()> {
        if !self.processed.insert(method) {
            return Ok(());
        }
        let world = ctx.world.clone();
        let mdef = world.program.method(method);
        self.initialize(ctx, mdef.class);
        for stmt in &mdef.stmts {
            match stmt {
                Stmt::New { site, .. } => {
                    let sd = world.program.site(*site);
                    // String literals do not trigger initialization.
                    if matches!(sd.kind, AllocKind::New | AllocKind::Synthetic(_)) {
                        self.initialize(ctx, sd.ty);
                    }
                }
                Stmt::LoadStatic { field, .. } | Stmt::StoreStatic { field, .. } => {
                    let class = world.program.field(*field).class;
                    self.initialize(ctx, class);
                }
                Stmt::Invoke(site) => {
                    let csd = world.program.call_site(*site);
                    if csd.kind == crate::ir::CallKind::Static {
                        self.initialize(ctx, csd.declared_class);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}
