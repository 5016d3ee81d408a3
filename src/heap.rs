//! Heap abstraction
//!
//! Allocation-site-based model: each `new T()` site yields one abstract
//! object per heap context. String constants are merged per literal,
//! with options to coalesce all string constants, all string objects,
//! string builders, and exception objects. Plugins may register
//! synthetic objects (taint marks, lambda instances, class objects,
//! reflectively created instances) through the same interning path.

use std::sync::Arc;

use crate::collections::Indexer;
use crate::context::{CtxId, EMPTY_CTX};
use crate::ir::{AllocKind, CallSiteId, SiteId, TypeId};
use crate::World;

/// Dense id of an abstract heap object.
pub type ObjId = u32;

/// Identity of an abstract object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjKind {
    /// An allocation site (per heap context)
    Alloc(SiteId),
    /// A string literal, identified by interned literal id
    StringConstant(u32),
    /// All objects of a type coalesced into one (merged strings,
    /// builders, exceptions)
    Merged(TypeId),
    /// `java.lang.Class` instance standing for a type
    Class(TypeId),
    /// Taint mark introduced at a source call site
    Taint(CallSiteId),
    /// Functional-interface instance produced at a dynamic call site
    Lambda(CallSiteId),
    /// Object reflectively instantiated at a call site
    Reflective(CallSiteId, TypeId),
    /// The implicit main thread
    MainThread,
}

/// An interned abstract object: identity plus its concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjData {
    pub kind: ObjKind,
    pub ty: TypeId,
    pub heap_ctx: CtxId,
}

/// Allocation-site-based heap model.
pub struct HeapModel {
    world: Arc<World>,
    objs: Indexer<ObjData>,
    literals: Indexer<String>,
    string_ty: Option<TypeId>,
    builder_tys: Vec<TypeId>,
    throwable_ty: Option<TypeId>,
}

impl HeapModel {
    pub fn new(world: Arc<World>) -> Self {
        let types = &world.types;
        let string_ty = types.lookup("java.lang.String");
        let builder_tys = ["java.lang.StringBuilder", "java.lang.StringBuffer"]
            .iter()
            .filter_map(|n| types.lookup(n))
            .collect();
        let throwable_ty = types.lookup("java.lang.Throwable");
        Self {
            world,
            objs: Indexer::new(),
            literals: Indexer::new(),
            string_ty,
            builder_tys,
            throwable_ty,
        }
    }

    /// The abstract object for an allocation site under a heap context,
    /// applying the configured coalescing rules.
    pub fn obj_at(&self, site: SiteId, heap_ctx: CtxId) -> ObjId {
        let opts = &self.world.options;
        let sd = self.world.program.site(site);
        if let AllocKind::StringConstant(lit) = &sd.kind {
            if opts.merge_string_objects || !opts.distinguish_string_constants {
                return self.merged_obj(sd.ty);
            }
            let lit_id = self.literals.intern(lit.clone());
            return self.objs.intern(ObjData {
                kind: ObjKind::StringConstant(lit_id),
                ty: sd.ty,
                heap_ctx: EMPTY_CTX,
            });
        }
        let ty = sd.ty;
        if opts.merge_string_objects && Some(ty) == self.string_ty {
            return self.merged_obj(ty);
        }
        if opts.merge_string_builders && self.builder_tys.contains(&ty) {
            return self.merged_obj(ty);
        }
        if opts.merge_exception_objects {
            if let Some(throwable) = self.throwable_ty {
                if self.world.types.is_subtype(ty, throwable) {
                    return self.merged_obj(ty);
                }
            }
        }
        self.objs.intern(ObjData {
            kind: ObjKind::Alloc(site),
            ty,
            heap_ctx,
        })
    }

    fn merged_obj(&self, ty: TypeId) -> ObjId {
        self.objs.intern(ObjData {
            kind: ObjKind::Merged(ty),
            ty,
            heap_ctx: EMPTY_CTX,
        })
    }

    // ------------------------------------------------------------------
    // Synthetic objects for plugins
    // ------------------------------------------------------------------

    /// A `java.lang.Class` object standing for `ty`.
    pub fn class_obj(&self, ty: TypeId) -> ObjId {
        let class_ty = self.world.types.ensure_class("java.lang.Class");
        self.objs.intern(ObjData {
            kind: ObjKind::Class(ty),
            ty: class_ty,
            heap_ctx: EMPTY_CTX,
        })
    }

    /// A taint mark of type `ty` introduced at `site`.
    pub fn taint_obj(&self, site: CallSiteId, ty: TypeId) -> ObjId {
        self.objs.intern(ObjData {
            kind: ObjKind::Taint(site),
            ty,
            heap_ctx: EMPTY_CTX,
        })
    }

    /// A functional-interface instance produced at dynamic site `site`.
    pub fn lambda_obj(&self, site: CallSiteId, iface: TypeId) -> ObjId {
        self.objs.intern(ObjData {
            kind: ObjKind::Lambda(site),
            ty: iface,
            heap_ctx: EMPTY_CTX,
        })
    }

    /// An instance of `ty` reflectively created at `site`.
    pub fn reflective_obj(&self, site: CallSiteId, ty: TypeId) -> ObjId {
        self.objs.intern(ObjData {
            kind: ObjKind::Reflective(site, ty),
            ty,
            heap_ctx: EMPTY_CTX,
        })
    }

    /// The implicit main-thread object, typed `java.lang.Thread`.
    pub fn main_thread_obj(&self) -> Option<ObjId> {
        let thread_ty = self.world.types.lookup("java.lang.Thread")?;
        Some(self.objs.intern(ObjData {
            kind: ObjKind::MainThread,
            ty: thread_ty,
            heap_ctx: EMPTY_CTX,
        }))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn obj(&self, id: ObjId) -> ObjData {
        self.objs.get(id)
    }

    pub fn obj_type(&self, id: ObjId) -> TypeId {
        self.objs.get_with(id, |o| o.ty)
    }

    pub fn heap_ctx(&self, id: ObjId) -> CtxId {
        self.objs.get_with(id, |o| o.heap_ctx)
    }

    /// The string literal an object stands for, if it is a string
    /// constant.
    pub fn literal(&self, id: ObjId) -> Option<String> {
        match self.objs.get_with(id, |o| o.kind) {
            ObjKind::StringConstant(lit) => Some(self.literals.get(lit)),
            _ => None,
        }
    }

    /// The class declaring the method containing this object's
    /// allocation site; falls back to the object's own type for
    /// synthetic and merged objects.
    pub fn container_type(&self, id: ObjId) -> TypeId {
        let data = self.objs.get(id);
        match data.kind {
            ObjKind::Alloc(site) => {
                let method = self.world.program.site(site).method;
                self.world.program.method(method).class
            }
            _ => data.ty,
        }
    }

    pub fn num_objs(&self) -> usize {
        self.objs.len()
    }
}
