//! Statements of the analyzed IR
//!
//! The statement kinds mirror what the constraint generation consumes:
//! allocations, copies, casts, field and array accesses, static
//! accesses, invocations, returns, and throws. Control flow is
//! irrelevant to a flow-insensitive analysis and is not represented.

use super::{CallSiteId, FieldId, MethodId, SiteId, SubsigId, TypeId, VarId};

/// How a call site dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Receiver-based dispatch on the dynamic type
    Virtual,
    /// Like virtual, through an interface reference
    Interface,
    /// Constructors, private methods, super calls: fixed target, but
    /// still receiver-carrying
    Special,
    /// No receiver; target resolved when the enclosing method becomes
    /// reachable
    Static,
    /// `invokedynamic`-style sites; resolved by a plugin
    Dynamic,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Virtual => "virtual",
            CallKind::Interface => "interface",
            CallKind::Special => "special",
            CallKind::Static => "static",
            CallKind::Dynamic => "dynamic",
        }
    }
}

/// Lambda-style bootstrap information attached to a dynamic call site.
///
/// Describes the functional interface being instantiated, the concrete
/// method implementing it, and the variables captured at the site.
#[derive(Debug, Clone)]
pub struct DynamicInfo {
    /// Functional interface the site produces an instance of
    pub interface: TypeId,
    /// Subsignature of the interface method being implemented
    pub interface_subsig: SubsigId,
    /// Concrete method the invocation is forwarded to
    pub impl_method: MethodId,
    /// Captured variables of the enclosing method, in capture order
    pub captured: Vec<VarId>,
}

/// A call site, addressed program-wide by a dense id.
#[derive(Debug, Clone)]
pub struct CallSiteData {
    pub id: CallSiteId,
    /// Method containing this call site
    pub method: MethodId,
    pub kind: CallKind,
    /// Class named by the invocation instruction
    pub declared_class: TypeId,
    /// Subsignature of the invoked method
    pub subsig: SubsigId,
    pub recv: Option<VarId>,
    pub args: Vec<VarId>,
    pub result: Option<VarId>,
    /// Optional front-end tag used to match externally supplied logs
    /// (e.g. reflection resolution logs) against call sites
    pub tag: Option<String>,
    pub dynamic: Option<DynamicInfo>,
}

/// One statement of a method body.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `x = new T()` (also string constants and synthetic allocations)
    New { lhs: VarId, site: SiteId },
    /// `x = y`
    Copy { lhs: VarId, rhs: VarId },
    /// `x = (T) y`
    Cast { lhs: VarId, rhs: VarId, ty: TypeId },
    /// `x = y.f`
    LoadField { lhs: VarId, base: VarId, field: FieldId },
    /// `x.f = y`
    StoreField { base: VarId, field: FieldId, rhs: VarId },
    /// `x = y[i]`, all indices conflated
    LoadArray { lhs: VarId, base: VarId },
    /// `x[i] = y`
    StoreArray { base: VarId, rhs: VarId },
    /// `x = T.f`
    LoadStatic { lhs: VarId, field: FieldId },
    /// `T.f = y`
    StoreStatic { field: FieldId, rhs: VarId },
    /// Any invocation; payload lives in the program's call-site table
    Invoke(CallSiteId),
    /// `return x` / `return`
    Return { var: Option<VarId> },
    /// `throw x`
    Throw { var: VarId },
}

/// A catch clause of a method. Thrown objects are matched against
/// handlers in declaration order; the first type match receives the
/// object.
#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    pub catch_ty: TypeId,
    pub var: VarId,
}
