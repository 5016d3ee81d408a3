//! Program model and builder
//!
//! The reified program: fields, methods with statement lists, local
//! variables, allocation sites, call sites, and entry points. Built once
//! by the front end through `ProgramBuilder`, then immutable for the
//! lifetime of the analysis.

use super::stmt::{CallKind, CallSiteData, DynamicInfo, ExceptionHandler, Stmt};
use super::types::{TypeKind, TypeManager};
use super::{CallSiteId, FieldId, MethodId, SiteId, SubsigId, TypeId, VarId};
use crate::config::AnalysisOptions;

#[derive(Debug, Clone)]
pub struct VarData {
    pub name: String,
    pub ty: Option<TypeId>,
    pub method: MethodId,
}

#[derive(Debug, Clone)]
pub struct FieldData {
    pub class: TypeId,
    pub name: String,
    pub ty: Option<TypeId>,
    pub is_static: bool,
}

/// What an allocation site allocates.
#[derive(Debug, Clone)]
pub enum AllocKind {
    /// Ordinary `new T()`
    New,
    /// A string literal; merged per literal by the heap model
    StringConstant(String),
    /// Front-end-synthesized allocation (e.g. command-line args array)
    Synthetic(String),
}

#[derive(Debug, Clone)]
pub struct SiteData {
    pub method: MethodId,
    pub ty: TypeId,
    pub kind: AllocKind,
}

#[derive(Debug, Clone)]
pub struct MethodData {
    pub class: TypeId,
    pub name: String,
    pub subsig: SubsigId,
    pub is_static: bool,
    pub is_abstract: bool,
    pub this_var: Option<VarId>,
    pub params: Vec<VarId>,
    /// Variables returned by `return` statements
    pub return_vars: Vec<VarId>,
    pub stmts: Vec<Stmt>,
    pub handlers: Vec<ExceptionHandler>,
}

/// The immutable program handed to the solver.
#[derive(Default)]
pub struct Program {
    vars: Vec<VarData>,
    fields: Vec<FieldData>,
    methods: Vec<MethodData>,
    sites: Vec<SiteData>,
    call_sites: Vec<CallSiteData>,
    entry_points: Vec<MethodId>,
}

impl Program {
    pub fn var(&self, id: VarId) -> &VarData {
        &self.vars[id as usize]
    }

    pub fn field(&self, id: FieldId) -> &FieldData {
        &self.fields[id as usize]
    }

    pub fn method(&self, id: MethodId) -> &MethodData {
        &self.methods[id as usize]
    }

    pub fn site(&self, id: SiteId) -> &SiteData {
        &self.sites[id as usize]
    }

    pub fn call_site(&self, id: CallSiteId) -> &CallSiteData {
        &self.call_sites[id as usize]
    }

    pub fn call_sites(&self) -> &[CallSiteData] {
        &self.call_sites
    }

    pub fn entry_points(&self) -> &[MethodId] {
        &self.entry_points
    }

    pub fn num_methods(&self) -> usize {
        self.methods.len()
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }
}

/// Front-end construction API.
///
/// Builds the type hierarchy and the program model together, producing a
/// `World`. Method bodies are emitted statement by statement through the
/// `emit_*` family.
pub struct ProgramBuilder {
    types: TypeManager,
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            types: TypeManager::new(),
            program: Program::default(),
        }
    }

    pub fn types(&self) -> &TypeManager {
        &self.types
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Declare an application class extending `java.lang.Object`.
    pub fn add_class(&mut self, name: &str) -> TypeId {
        let object = self.types.object();
        self.types
            .intern(name, TypeKind::Class, Some(object), Vec::new(), true)
    }

    /// Declare a non-application (library) class.
    pub fn add_library_class(&mut self, name: &str) -> TypeId {
        let object = self.types.object();
        self.types
            .intern(name, TypeKind::Class, Some(object), Vec::new(), false)
    }

    pub fn add_interface(&mut self, name: &str) -> TypeId {
        self.types
            .intern(name, TypeKind::Interface, None, Vec::new(), true)
    }

    /// Declare a class with an explicit superclass and interfaces.
    pub fn add_class_extending(
        &mut self,
        name: &str,
        super_class: TypeId,
        interfaces: &[TypeId],
    ) -> TypeId {
        self.types.intern(
            name,
            TypeKind::Class,
            Some(super_class),
            interfaces.to_vec(),
            true,
        )
    }

    pub fn array_of(&mut self, elem: TypeId) -> TypeId {
        self.types.array_of(elem)
    }

    pub fn add_field(
        &mut self,
        class: TypeId,
        name: &str,
        ty: Option<TypeId>,
        is_static: bool,
    ) -> FieldId {
        let id = self.program.fields.len() as FieldId;
        self.program.fields.push(FieldData {
            class,
            name: name.to_string(),
            ty,
            is_static,
        });
        id
    }

    /// Declare a method. Parameter variables (and `this` for instance
    /// methods) are created here; the body is emitted afterwards.
    pub fn add_method(
        &mut self,
        class: TypeId,
        name: &str,
        param_tys: &[TypeId],
        is_static: bool,
    ) -> MethodId {
        let id = self.program.methods.len() as MethodId;
        let subsig_str = self.types.format_subsig(name, param_tys);
        let subsig = self.types.subsig(&subsig_str);
        let this_var = if is_static {
            None
        } else {
            Some(self.push_var(id, "this", Some(class)))
        };
        let params = param_tys
            .iter()
            .enumerate()
            .map(|(i, &ty)| self.push_var(id, &format!("p{}", i), Some(ty)))
            .collect();
        self.program.methods.push(MethodData {
            class,
            name: name.to_string(),
            subsig,
            is_static,
            is_abstract: false,
            this_var,
            params,
            return_vars: Vec::new(),
            stmts: Vec::new(),
            handlers: Vec::new(),
        });
        self.types.declare_method(class, subsig, id);
        id
    }

    /// Declare an abstract (bodiless) method; participates in interface
    /// and class tables but resolves only via overriding.
    pub fn add_abstract_method(
        &mut self,
        class: TypeId,
        name: &str,
        param_tys: &[TypeId],
    ) -> MethodId {
        let id = self.program.methods.len() as MethodId;
        let subsig_str = self.types.format_subsig(name, param_tys);
        let subsig = self.types.subsig(&subsig_str);
        self.program.methods.push(MethodData {
            class,
            name: name.to_string(),
            subsig,
            is_static: false,
            is_abstract: true,
            this_var: None,
            params: Vec::new(),
            return_vars: Vec::new(),
            stmts: Vec::new(),
            handlers: Vec::new(),
        });
        // Not entered in the dispatch table: abstract methods are never
        // dispatch targets.
        id
    }

    pub fn add_entry_point(&mut self, method: MethodId) {
        self.program.entry_points.push(method);
    }

    // ------------------------------------------------------------------
    // Variables & body emission
    // ------------------------------------------------------------------

    fn push_var(&mut self, method: MethodId, name: &str, ty: Option<TypeId>) -> VarId {
        let id = self.program.vars.len() as VarId;
        self.program.vars.push(VarData {
            name: name.to_string(),
            ty,
            method,
        });
        id
    }

    pub fn new_var(&mut self, method: MethodId, name: &str, ty: Option<TypeId>) -> VarId {
        self.push_var(method, name, ty)
    }

    pub fn this_var(&self, method: MethodId) -> Option<VarId> {
        self.program.methods[method as usize].this_var
    }

    pub fn param(&self, method: MethodId, index: usize) -> VarId {
        self.program.methods[method as usize].params[index]
    }

    /// `lhs = new ty()`
    pub fn emit_new(&mut self, method: MethodId, lhs: VarId, ty: TypeId) -> SiteId {
        let site = self.program.sites.len() as SiteId;
        self.program.sites.push(SiteData {
            method,
            ty,
            kind: AllocKind::New,
        });
        self.push_stmt(method, Stmt::New { lhs, site });
        site
    }

    /// `lhs = "literal"`
    pub fn emit_string_const(&mut self, method: MethodId, lhs: VarId, literal: &str) -> SiteId {
        let ty = self.types.ensure_class("java.lang.String");
        let site = self.program.sites.len() as SiteId;
        self.program.sites.push(SiteData {
            method,
            ty,
            kind: AllocKind::StringConstant(literal.to_string()),
        });
        self.push_stmt(method, Stmt::New { lhs, site });
        site
    }

    pub fn emit_copy(&mut self, method: MethodId, lhs: VarId, rhs: VarId) {
        self.push_stmt(method, Stmt::Copy { lhs, rhs });
    }

    pub fn emit_cast(&mut self, method: MethodId, lhs: VarId, rhs: VarId, ty: TypeId) {
        self.push_stmt(method, Stmt::Cast { lhs, rhs, ty });
    }

    pub fn emit_load_field(&mut self, method: MethodId, lhs: VarId, base: VarId, field: FieldId) {
        self.push_stmt(method, Stmt::LoadField { lhs, base, field });
    }

    pub fn emit_store_field(&mut self, method: MethodId, base: VarId, field: FieldId, rhs: VarId) {
        self.push_stmt(method, Stmt::StoreField { base, field, rhs });
    }

    pub fn emit_load_array(&mut self, method: MethodId, lhs: VarId, base: VarId) {
        self.push_stmt(method, Stmt::LoadArray { lhs, base });
    }

    pub fn emit_store_array(&mut self, method: MethodId, base: VarId, rhs: VarId) {
        self.push_stmt(method, Stmt::StoreArray { base, rhs });
    }

    pub fn emit_load_static(&mut self, method: MethodId, lhs: VarId, field: FieldId) {
        self.push_stmt(method, Stmt::LoadStatic { lhs, field });
    }

    pub fn emit_store_static(&mut self, method: MethodId, field: FieldId, rhs: VarId) {
        self.push_stmt(method, Stmt::StoreStatic { field, rhs });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn emit_call(
        &mut self,
        method: MethodId,
        kind: CallKind,
        declared_class: TypeId,
        subsig: &str,
        recv: Option<VarId>,
        args: &[VarId],
        result: Option<VarId>,
    ) -> CallSiteId {
        let id = self.program.call_sites.len() as CallSiteId;
        let subsig = self.types.subsig(subsig);
        self.program.call_sites.push(CallSiteData {
            id,
            method,
            kind,
            declared_class,
            subsig,
            recv,
            args: args.to_vec(),
            result,
            tag: None,
            dynamic: None,
        });
        self.push_stmt(method, Stmt::Invoke(id));
        id
    }

    /// An `invokedynamic`-style site producing an instance of a
    /// functional interface.
    pub fn emit_dynamic_call(
        &mut self,
        method: MethodId,
        info: DynamicInfo,
        result: VarId,
    ) -> CallSiteId {
        let id = self.program.call_sites.len() as CallSiteId;
        let subsig = info.interface_subsig;
        let declared_class = info.interface;
        self.program.call_sites.push(CallSiteData {
            id,
            method,
            kind: CallKind::Dynamic,
            declared_class,
            subsig,
            recv: None,
            args: Vec::new(),
            result: Some(result),
            tag: None,
            dynamic: Some(info),
        });
        self.push_stmt(method, Stmt::Invoke(id));
        id
    }

    /// Tag a call site so externally supplied logs can refer to it.
    pub fn set_call_tag(&mut self, site: CallSiteId, tag: &str) {
        self.program.call_sites[site as usize].tag = Some(tag.to_string());
    }

    pub fn emit_return(&mut self, method: MethodId, var: Option<VarId>) {
        if let Some(v) = var {
            self.program.methods[method as usize].return_vars.push(v);
        }
        self.push_stmt(method, Stmt::Return { var });
    }

    pub fn emit_throw(&mut self, method: MethodId, var: VarId) {
        self.push_stmt(method, Stmt::Throw { var });
    }

    pub fn add_handler(&mut self, method: MethodId, catch_ty: TypeId, var: VarId) {
        self.program.methods[method as usize]
            .handlers
            .push(ExceptionHandler { catch_ty, var });
    }

    fn push_stmt(&mut self, method: MethodId, stmt: Stmt) {
        self.program.methods[method as usize].stmts.push(stmt);
    }

    /// Freeze the program into a `World`.
    pub fn build(self, options: AnalysisOptions) -> crate::World {
        crate::World {
            types: self.types,
            program: self.program,
            options,
        }
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_assembles_methods() {
        let mut b = ProgramBuilder::new();
        let a = b.add_class("A");
        let m = b.add_method(a, "run", &[a], false);
        assert!(b.this_var(m).is_some());
        let p0 = b.param(m, 0);
        let x = b.new_var(m, "x", Some(a));
        b.emit_copy(m, x, p0);
        b.emit_return(m, Some(x));

        let world = b.build(AnalysisOptions::default());
        let mdef = world.program.method(m);
        assert_eq!(mdef.stmts.len(), 2);
        assert_eq!(mdef.return_vars, vec![x]);
        assert_eq!(world.program.var(x).method, m);
        assert_eq!(world.types.name(mdef.class), "A");
    }

    #[test]
    fn test_call_sites_get_dense_ids() {
        let mut b = ProgramBuilder::new();
        let a = b.add_class("A");
        let m = b.add_method(a, "main", &[], true);
        let r = b.new_var(m, "r", None);
        let s1 = b.emit_call(m, CallKind::Static, a, "f()", None, &[], Some(r));
        let s2 = b.emit_call(m, CallKind::Static, a, "g()", None, &[], None);
        assert_eq!(s1, 0);
        assert_eq!(s2, 1);

        let world = b.build(AnalysisOptions::default());
        assert_eq!(world.program.call_site(s2).method, m);
        assert!(world.program.call_site(s1).result.is_some());
    }
}
