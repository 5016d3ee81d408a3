//! Reified program model
//!
//! The front end hands the analysis a fully built program: a class
//! hierarchy, fields, methods with typed statement lists, and entry
//! points. Everything is addressed by dense ids assigned at build time.

pub mod program;
pub mod stmt;
pub mod types;

pub use program::{AllocKind, FieldData, MethodData, Program, ProgramBuilder, SiteData, VarData};
pub use stmt::{CallKind, CallSiteData, DynamicInfo, ExceptionHandler, Stmt};
pub use types::{TypeKind, TypeManager};

/// Dense id of a type (class, interface, or array).
pub type TypeId = u32;
/// Dense id of a field.
pub type FieldId = u32;
/// Dense id of a method.
pub type MethodId = u32;
/// Dense id of a local variable (program-wide).
pub type VarId = u32;
/// Dense id of an allocation site.
pub type SiteId = u32;
/// Dense id of a call site (program-wide).
pub type CallSiteId = u32;
/// Dense id of an interned method subsignature (`name(paramTypes)`).
pub type SubsigId = u32;
