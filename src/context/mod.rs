//! Analysis contexts
//!
//! A context is an ordered tuple of elements (call sites, receiver
//! objects, or receiver types depending on the selector variant),
//! bounded by k. Contexts are interned by value, so identity comparison
//! is a single integer compare and the empty context is always id 0.

pub mod selector;

use std::sync::Arc;

use crate::collections::Indexer;
use crate::heap::ObjId;
use crate::ir::{CallSiteId, TypeId};

pub use selector::{
    make_selector, ContextInsensitiveSelector, ContextSelector, KCallSelector, KObjSelector,
    KTypeSelector,
};

/// Dense id of an interned context.
pub type CtxId = u32;

/// The distinguished insensitive (empty) context.
pub const EMPTY_CTX: CtxId = 0;

/// One element of a context tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextElem {
    CallSite(CallSiteId),
    Obj(ObjId),
    Type(TypeId),
}

/// Canonicalizing pool of contexts.
pub struct ContextPool {
    inner: Indexer<Arc<[ContextElem]>>,
}

impl ContextPool {
    pub fn new() -> Self {
        let pool = Self {
            inner: Indexer::new(),
        };
        let empty = pool.inner.intern(Arc::from(Vec::new().into_boxed_slice()));
        debug_assert_eq!(empty, EMPTY_CTX);
        pool
    }

    pub fn intern(&self, elems: &[ContextElem]) -> CtxId {
        self.inner.intern(Arc::from(elems))
    }

    /// The elements of a context, most recent last.
    pub fn elems(&self, id: CtxId) -> Arc<[ContextElem]> {
        self.inner.get(id)
    }

    pub fn depth(&self, id: CtxId) -> usize {
        self.inner.get_with(id, |e| e.len())
    }

    /// Append an element and keep only the `k` most recent.
    pub fn append_k(&self, base: CtxId, elem: ContextElem, k: usize) -> CtxId {
        if k == 0 {
            return EMPTY_CTX;
        }
        let base = self.elems(base);
        let mut elems: Vec<ContextElem> = base.iter().copied().collect();
        elems.push(elem);
        let start = elems.len().saturating_sub(k);
        self.intern(&elems[start..])
    }

    /// Keep only the `k` most recent elements.
    pub fn truncate_k(&self, base: CtxId, k: usize) -> CtxId {
        if k == 0 {
            return EMPTY_CTX;
        }
        let elems = self.elems(base);
        if elems.len() <= k {
            return base;
        }
        let start = elems.len() - k;
        self.intern(&elems[start..])
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_is_id_zero() {
        let pool = ContextPool::new();
        assert_eq!(pool.intern(&[]), EMPTY_CTX);
        assert_eq!(pool.depth(EMPTY_CTX), 0);
    }

    #[test]
    fn test_interning_is_by_value() {
        let pool = ContextPool::new();
        let a = pool.intern(&[ContextElem::CallSite(1), ContextElem::CallSite(2)]);
        let b = pool.intern(&[ContextElem::CallSite(1), ContextElem::CallSite(2)]);
        let c = pool.intern(&[ContextElem::CallSite(2), ContextElem::CallSite(1)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_append_k_limits_to_most_recent() {
        let pool = ContextPool::new();
        let c1 = pool.append_k(EMPTY_CTX, ContextElem::CallSite(10), 2);
        let c2 = pool.append_k(c1, ContextElem::CallSite(20), 2);
        let c3 = pool.append_k(c2, ContextElem::CallSite(30), 2);
        assert_eq!(
            pool.elems(c3).as_ref(),
            &[ContextElem::CallSite(20), ContextElem::CallSite(30)]
        );
        assert_eq!(pool.append_k(c2, ContextElem::CallSite(9), 0), EMPTY_CTX);
    }

    #[test]
    fn test_truncate_k() {
        let pool = ContextPool::new();
        let c = pool.intern(&[
            ContextElem::CallSite(1),
            ContextElem::CallSite(2),
            ContextElem::CallSite(3),
        ]);
        let t = pool.truncate_k(c, 2);
        assert_eq!(
            pool.elems(t).as_ref(),
            &[ContextElem::CallSite(2), ContextElem::CallSite(3)]
        );
        assert_eq!(pool.truncate_k(c, 5), c);
        assert_eq!(pool.truncate_k(c, 0), EMPTY_CTX);
    }
}
