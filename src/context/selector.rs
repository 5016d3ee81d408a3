//! Context selector variants
//!
//! A selector decides the callee context at each dispatch and the heap
//! context at each allocation. Variants follow the standard k-limited
//! abstractions: call-site strings, receiver objects, receiver types.
//!
//! # References
//! - Smaragdakis et al. "Pick Your Contexts Well" (POPL 2011)
//! - Milanova et al. "Parameterized Object Sensitivity" (TOSEM 2005)

use std::sync::Arc;

use super::{ContextElem, ContextPool, CtxId, EMPTY_CTX};
use crate::config::CsVariant;
use crate::heap::{HeapModel, ObjId};
use crate::ir::{CallSiteId, SiteId};

/// Chooses analysis contexts at dispatches and allocations.
pub trait ContextSelector: Send + Sync {
    /// The context for the callee of `site`, given the caller's context
    /// and, for receiver-carrying calls, the receiver object.
    fn select_context(&self, site: CallSiteId, caller: CtxId, recv: Option<ObjId>) -> CtxId;

    /// The heap context for an allocation executed under `method_ctx`.
    fn select_heap_context(&self, site: SiteId, method_ctx: CtxId) -> CtxId;
}

/// Always the empty context.
pub struct ContextInsensitiveSelector;

impl ContextSelector for ContextInsensitiveSelector {
    fn select_context(&self, _site: CallSiteId, _caller: CtxId, _recv: Option<ObjId>) -> CtxId {
        EMPTY_CTX
    }

    fn select_heap_context(&self, _site: SiteId, _method_ctx: CtxId) -> CtxId {
        EMPTY_CTX
    }
}

/// Last k call sites; heap contexts are the caller context truncated to
/// k-1.
pub struct KCallSelector {
    k: usize,
    pool: Arc<ContextPool>,
}

impl KCallSelector {
    pub fn new(k: usize, pool: Arc<ContextPool>) -> Self {
        Self { k, pool }
    }
}

impl ContextSelector for KCallSelector {
    fn select_context(&self, site: CallSiteId, caller: CtxId, _recv: Option<ObjId>) -> CtxId {
        self.pool.append_k(caller, ContextElem::CallSite(site), self.k)
    }

    fn select_heap_context(&self, _site: SiteId, method_ctx: CtxId) -> CtxId {
        self.pool.truncate_k(method_ctx, self.k.saturating_sub(1))
    }
}

/// Last k receiver objects: the callee context is the receiver's heap
/// context extended with the receiver itself. Receiver-less calls keep
/// the caller's context.
pub struct KObjSelector {
    k: usize,
    pool: Arc<ContextPool>,
    heap: Arc<HeapModel>,
}

impl KObjSelector {
    pub fn new(k: usize, pool: Arc<ContextPool>, heap: Arc<HeapModel>) -> Self {
        Self { k, pool, heap }
    }
}

impl ContextSelector for KObjSelector {
    fn select_context(&self, _site: CallSiteId, caller: CtxId, recv: Option<ObjId>) -> CtxId {
        match recv {
            Some(obj) => {
                let base = self.heap.heap_ctx(obj);
                self.pool.append_k(base, ContextElem::Obj(obj), self.k)
            }
            None => caller,
        }
    }

    fn select_heap_context(&self, _site: SiteId, method_ctx: CtxId) -> CtxId {
        self.pool.truncate_k(method_ctx, self.k.saturating_sub(1))
    }
}

/// Like k-obj, but context elements are the classes containing the
/// receivers' allocation sites instead of the objects themselves.
pub struct KTypeSelector {
    k: usize,
    pool: Arc<ContextPool>,
    heap: Arc<HeapModel>,
}

impl KTypeSelector {
    pub fn new(k: usize, pool: Arc<ContextPool>, heap: Arc<HeapModel>) -> Self {
        Self { k, pool, heap }
    }
}

impl ContextSelector for KTypeSelector {
    fn select_context(&self, _site: CallSiteId, caller: CtxId, recv: Option<ObjId>) -> CtxId {
        match recv {
            Some(obj) => {
                let base = self.heap.heap_ctx(obj);
                let ty = self.heap.container_type(obj);
                self.pool.append_k(base, ContextElem::Type(ty), self.k)
            }
            None => caller,
        }
    }

    fn select_heap_context(&self, _site: SiteId, method_ctx: CtxId) -> CtxId {
        self.pool.truncate_k(method_ctx, self.k.saturating_sub(1))
    }
}

/// Instantiate the selector for a configured variant.
pub fn make_selector(
    variant: CsVariant,
    pool: Arc<ContextPool>,
    heap: Arc<HeapModel>,
) -> Box<dyn ContextSelector> {
    match variant {
        CsVariant::Insensitive => Box::new(ContextInsensitiveSelector),
        CsVariant::KCall(k) => Box::new(KCallSelector::new(k, pool)),
        CsVariant::KObj(k) => Box::new(KObjSelector::new(k, pool, heap)),
        CsVariant::KType(k) => Box::new(KTypeSelector::new(k, pool, heap)),
    }
}
