//! Pointer variants
//!
//! The four abstract pointer kinds the analysis computes points-to sets
//! for. A tagged variant with a shared payload (the solver's node arena)
//! rather than a class hierarchy: edge materialization switches on the
//! kind, everything else is uniform.

use crate::context::CtxId;
use crate::heap::ObjId;
use crate::ir::{FieldId, VarId};

/// Dense id of a pointer in the solver's node arena.
pub type PointerId = u32;

/// Identity of an abstract pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKey {
    /// A local variable under an analysis context. Parameters, `this`,
    /// and return values are ordinary variables of their method.
    Var { ctx: CtxId, var: VarId },
    /// An instance field of an abstract object
    InstanceField { obj: ObjId, field: FieldId },
    /// The single index pointer of an abstract array object
    ArrayIndex { obj: ObjId },
    /// A static field
    StaticField { field: FieldId },
}

impl PointerKey {
    pub fn is_var(&self) -> bool {
        matches!(self, PointerKey::Var { .. })
    }
}
