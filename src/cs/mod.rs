//! Context-sensitive entities
//!
//! Interns (context, method) pairs and the four pointer kinds, assigning
//! dense ids used to address the solver's node arena. Interning is
//! concurrent and idempotent; iteration is always in id order.

pub mod pointer;

use crate::collections::Indexer;
use crate::context::CtxId;
use crate::heap::ObjId;
use crate::ir::{FieldId, MethodId, VarId};

pub use pointer::{PointerId, PointerKey};

/// Dense id of a (context, method) pair.
pub type CsMethodId = u32;

/// Interner for context-sensitive methods and pointers.
pub struct CsManager {
    pointers: Indexer<PointerKey>,
    methods: Indexer<(CtxId, MethodId)>,
}

impl CsManager {
    pub fn new() -> Self {
        Self {
            pointers: Indexer::new(),
            methods: Indexer::new(),
        }
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    pub fn cs_method(&self, ctx: CtxId, method: MethodId) -> CsMethodId {
        self.methods.intern((ctx, method))
    }

    /// The (context, method) pair behind a dense id.
    pub fn method_parts(&self, id: CsMethodId) -> (CtxId, MethodId) {
        self.methods.get(id)
    }

    pub fn num_cs_methods(&self) -> usize {
        self.methods.len()
    }

    // ------------------------------------------------------------------
    // Pointers
    // ------------------------------------------------------------------

    pub fn var_ptr(&self, ctx: CtxId, var: VarId) -> PointerId {
        self.pointers.intern(PointerKey::Var { ctx, var })
    }

    pub fn instance_field_ptr(&self, obj: ObjId, field: FieldId) -> PointerId {
        self.pointers.intern(PointerKey::InstanceField { obj, field })
    }

    pub fn array_ptr(&self, obj: ObjId) -> PointerId {
        self.pointers.intern(PointerKey::ArrayIndex { obj })
    }

    pub fn static_field_ptr(&self, field: FieldId) -> PointerId {
        self.pointers.intern(PointerKey::StaticField { field })
    }

    /// Look up a variable pointer without interning it.
    pub fn find_var_ptr(&self, ctx: CtxId, var: VarId) -> Option<PointerId> {
        self.pointers.lookup(&PointerKey::Var { ctx, var })
    }

    pub fn key(&self, id: PointerId) -> PointerKey {
        self.pointers.get(id)
    }

    pub fn num_pointers(&self) -> usize {
        self.pointers.len()
    }

    /// All pointers in id order, paired with their keys.
    pub fn pointers(&self) -> Vec<(PointerId, PointerKey)> {
        self.pointers
            .snapshot()
            .into_iter()
            .enumerate()
            .map(|(i, k)| (i as PointerId, k))
            .collect()
    }

    /// All variable pointers, in id order.
    pub fn var_pointers(&self) -> Vec<(PointerId, CtxId, VarId)> {
        self.pointers()
            .into_iter()
            .filter_map(|(id, k)| match k {
                PointerKey::Var { ctx, var } => Some((id, ctx, var)),
                _ => None,
            })
            .collect()
    }

    /// All instance-field pointers, in id order.
    pub fn instance_field_pointers(&self) -> Vec<(PointerId, ObjId, FieldId)> {
        self.pointers()
            .into_iter()
            .filter_map(|(id, k)| match k {
                PointerKey::InstanceField { obj, field } => Some((id, obj, field)),
                _ => None,
            })
            .collect()
    }

    /// All array pointers, in id order.
    pub fn array_pointers(&self) -> Vec<(PointerId, ObjId)> {
        self.pointers()
            .into_iter()
            .filter_map(|(id, k)| match k {
                PointerKey::ArrayIndex { obj } => Some((id, obj)),
                _ => None,
            })
            .collect()
    }

    /// All static-field pointers, in id order.
    pub fn static_field_pointers(&self) -> Vec<(PointerId, FieldId)> {
        self.pointers()
            .into_iter()
            .filter_map(|(id, k)| match k {
                PointerKey::StaticField { field } => Some((id, field)),
                _ => None,
            })
            .collect()
    }
}

impl Default for CsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EMPTY_CTX;

    #[test]
    fn test_pointer_interning_is_by_identity_tuple() {
        let cs = CsManager::new();
        let p1 = cs.var_ptr(EMPTY_CTX, 3);
        let p2 = cs.var_ptr(EMPTY_CTX, 3);
        let p3 = cs.var_ptr(1, 3);
        assert_eq!(p1, p2);
        assert_ne!(p1, p3);

        let f1 = cs.instance_field_ptr(7, 0);
        let f2 = cs.instance_field_ptr(7, 1);
        assert_ne!(f1, f2);
        assert_eq!(cs.num_pointers(), 4);
    }

    #[test]
    fn test_iteration_partitions_by_kind() {
        let cs = CsManager::new();
        cs.var_ptr(EMPTY_CTX, 0);
        cs.instance_field_ptr(1, 2);
        cs.array_ptr(1);
        cs.static_field_ptr(5);
        cs.var_ptr(EMPTY_CTX, 1);

        assert_eq!(cs.var_pointers().len(), 2);
        assert_eq!(cs.instance_field_pointers().len(), 1);
        assert_eq!(cs.array_pointers().len(), 1);
        assert_eq!(cs.static_field_pointers(), vec![(3, 5)]);
    }

    #[test]
    fn test_cs_methods() {
        let cs = CsManager::new();
        let m1 = cs.cs_method(EMPTY_CTX, 0);
        let m2 = cs.cs_method(1, 0);
        assert_ne!(m1, m2);
        assert_eq!(cs.method_parts(m2), (1, 0));
        assert_eq!(cs.cs_method(EMPTY_CTX, 0), m1);
    }
}
