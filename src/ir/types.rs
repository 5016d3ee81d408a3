//! Type hierarchy and dynamic dispatch
//!
//! Classes, interfaces, and array types with subtype checking and
//! receiver-type method resolution. Lookup maps are concurrent: the
//! front end may populate them from multiple threads and plugins may
//! intern well-known types lazily during the solve.

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::{FxBuildHasher, FxHashMap};

use super::{MethodId, SubsigId, TypeId};
use crate::collections::Indexer;

pub const OBJECT_CLASS: &str = "java.lang.Object";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Array(TypeId),
}

#[derive(Debug, Clone)]
struct TypeData {
    name: String,
    kind: TypeKind,
    super_class: Option<TypeId>,
    interfaces: Vec<TypeId>,
    is_application: bool,
}

/// The program's type universe.
pub struct TypeManager {
    types: RwLock<Vec<TypeData>>,
    by_name: DashMap<String, TypeId, FxBuildHasher>,
    subsigs: Indexer<String>,
    /// Concrete methods declared per class, keyed by subsignature
    tables: RwLock<Vec<FxHashMap<SubsigId, MethodId>>>,
    dispatch_cache: DashMap<(TypeId, SubsigId), Option<MethodId>, FxBuildHasher>,
    subtype_cache: DashMap<(TypeId, TypeId), bool, FxBuildHasher>,
}

impl TypeManager {
    pub fn new() -> Self {
        let tm = Self {
            types: RwLock::new(Vec::new()),
            by_name: DashMap::with_hasher(FxBuildHasher),
            subsigs: Indexer::new(),
            tables: RwLock::new(Vec::new()),
            dispatch_cache: DashMap::with_hasher(FxBuildHasher),
            subtype_cache: DashMap::with_hasher(FxBuildHasher),
        };
        // The hierarchy root always exists.
        tm.intern(OBJECT_CLASS, TypeKind::Class, None, Vec::new(), false);
        tm
    }

    pub fn object(&self) -> TypeId {
        0
    }

    /// Intern a type. Returns the existing id when the name was seen
    /// before; hierarchy fields of the first interning win.
    pub fn intern(
        &self,
        name: &str,
        kind: TypeKind,
        super_class: Option<TypeId>,
        interfaces: Vec<TypeId>,
        is_application: bool,
    ) -> TypeId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        *self
            .by_name
            .entry(name.to_string())
            .or_insert_with(|| {
                let mut types = self.types.write();
                let mut tables = self.tables.write();
                let id = types.len() as TypeId;
                types.push(TypeData {
                    name: name.to_string(),
                    kind,
                    super_class,
                    interfaces,
                    is_application,
                });
                tables.push(FxHashMap::default());
                id
            })
    }

    /// Intern a library class with `java.lang.Object` as superclass.
    /// Used by plugins for well-known types the front end may not have
    /// loaded (e.g. `java.lang.Class`).
    pub fn ensure_class(&self, name: &str) -> TypeId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let object = self.object();
        self.intern(name, TypeKind::Class, Some(object), Vec::new(), false)
    }

    /// The array type over `elem`, interned on demand.
    pub fn array_of(&self, elem: TypeId) -> TypeId {
        let name = format!("{}[]", self.name(elem));
        let object = self.object();
        self.intern(&name, TypeKind::Array(elem), Some(object), Vec::new(), false)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).map(|r| *r)
    }

    pub fn name(&self, ty: TypeId) -> String {
        self.types.read()[ty as usize].name.clone()
    }

    pub fn kind(&self, ty: TypeId) -> TypeKind {
        self.types.read()[ty as usize].kind
    }

    pub fn super_of(&self, ty: TypeId) -> Option<TypeId> {
        self.types.read()[ty as usize].super_class
    }

    pub fn is_application(&self, ty: TypeId) -> bool {
        self.types.read()[ty as usize].is_application
    }

    pub fn num_types(&self) -> usize {
        self.types.read().len()
    }

    // ------------------------------------------------------------------
    // Subsignatures
    // ------------------------------------------------------------------

    /// Intern a subsignature string of the form `name(Ty1,Ty2)`.
    pub fn subsig(&self, s: &str) -> SubsigId {
        self.subsigs.intern(s.to_string())
    }

    pub fn subsig_name(&self, id: SubsigId) -> String {
        self.subsigs.get(id)
    }

    /// Render the canonical subsignature for a method name and its
    /// parameter types.
    pub fn format_subsig(&self, name: &str, params: &[TypeId]) -> String {
        let params: Vec<String> = params.iter().map(|&t| self.name(t)).collect();
        format!("{}({})", name, params.join(","))
    }

    // ------------------------------------------------------------------
    // Method tables & dispatch
    // ------------------------------------------------------------------

    /// Record a concrete method declared by `class`.
    pub fn declare_method(&self, class: TypeId, subsig: SubsigId, method: MethodId) {
        self.tables.write()[class as usize].insert(subsig, method);
        // Declarations arriving after dispatch queries would make cached
        // misses stale.
        self.dispatch_cache.clear();
    }

    /// The method declared directly by `class` for `subsig`, without
    /// walking the hierarchy. Used for lookups that must not inherit,
    /// e.g. class initializers.
    pub fn declared_method(&self, class: TypeId, subsig: SubsigId) -> Option<MethodId> {
        self.tables.read()[class as usize].get(&subsig).copied()
    }

    /// Resolve `subsig` against the dynamic type `ty` by walking the
    /// superclass chain, memoizing the answer.
    pub fn dispatch(&self, ty: TypeId, subsig: SubsigId) -> Option<MethodId> {
        if let Some(hit) = self.dispatch_cache.get(&(ty, subsig)) {
            return *hit;
        }
        let mut cur = Some(ty);
        let mut found = None;
        {
            let types = self.types.read();
            let tables = self.tables.read();
            while let Some(t) = cur {
                if let Some(&m) = tables[t as usize].get(&subsig) {
                    found = Some(m);
                    break;
                }
                cur = types[t as usize].super_class;
            }
        }
        self.dispatch_cache.insert((ty, subsig), found);
        found
    }

    // ------------------------------------------------------------------
    // Subtyping
    // ------------------------------------------------------------------

    /// Whether `sub` is a subtype of `sup` (reflexive).
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup || sup == self.object() {
            return true;
        }
        if let Some(hit) = self.subtype_cache.get(&(sub, sup)) {
            return *hit;
        }
        let answer = self.compute_subtype(sub, sup);
        self.subtype_cache.insert((sub, sup), answer);
        answer
    }

    fn compute_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        let (sub_kind, sup_kind) = (self.kind(sub), self.kind(sup));
        if let (TypeKind::Array(a), TypeKind::Array(b)) = (sub_kind, sup_kind) {
            return self.is_subtype(a, b);
        }
        if matches!(sub_kind, TypeKind::Array(_)) || matches!(sup_kind, TypeKind::Array(_)) {
            return false;
        }
        // Walk superclasses and the transitive interface closure.
        let mut stack = vec![sub];
        let mut seen = vec![false; self.num_types()];
        while let Some(t) = stack.pop() {
            if t == sup {
                return true;
            }
            if std::mem::replace(&mut seen[t as usize], true) {
                continue;
            }
            let types = self.types.read();
            let data = &types[t as usize];
            if let Some(s) = data.super_class {
                stack.push(s);
            }
            stack.extend(data.interfaces.iter().copied());
        }
        false
    }
}

impl Default for TypeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(tm: &TypeManager, name: &str, sup: TypeId) -> TypeId {
        tm.intern(name, TypeKind::Class, Some(sup), Vec::new(), true)
    }

    #[test]
    fn test_subtype_superclass_chain() {
        let tm = TypeManager::new();
        let a = class(&tm, "A", tm.object());
        let b = class(&tm, "B", a);
        let c = class(&tm, "C", b);

        assert!(tm.is_subtype(c, a));
        assert!(tm.is_subtype(c, tm.object()));
        assert!(tm.is_subtype(a, a));
        assert!(!tm.is_subtype(a, c));
    }

    #[test]
    fn test_subtype_interfaces_transitive() {
        let tm = TypeManager::new();
        let i = tm.intern("I", TypeKind::Interface, None, Vec::new(), true);
        let j = tm.intern("J", TypeKind::Interface, None, vec![i], true);
        let c = tm.intern("C", TypeKind::Class, Some(tm.object()), vec![j], true);

        assert!(tm.is_subtype(c, j));
        assert!(tm.is_subtype(c, i));
        assert!(tm.is_subtype(j, i));
        assert!(!tm.is_subtype(i, j));
    }

    #[test]
    fn test_subtype_arrays_covariant() {
        let tm = TypeManager::new();
        let a = class(&tm, "A", tm.object());
        let b = class(&tm, "B", a);
        let arr_a = tm.array_of(a);
        let arr_b = tm.array_of(b);

        assert!(tm.is_subtype(arr_b, arr_a));
        assert!(!tm.is_subtype(arr_a, arr_b));
        assert!(tm.is_subtype(arr_a, tm.object()));
        assert!(!tm.is_subtype(arr_a, a));
        // Interning the same array type twice yields one id.
        assert_eq!(arr_a, tm.array_of(a));
    }

    #[test]
    fn test_dispatch_walks_superclasses() {
        let tm = TypeManager::new();
        let a = class(&tm, "A", tm.object());
        let b = class(&tm, "B", a);
        let m = tm.subsig("m()");

        tm.declare_method(a, m, 10);
        assert_eq!(tm.dispatch(b, m), Some(10));
        assert_eq!(tm.dispatch(a, m), Some(10));

        // An override in B takes precedence for receivers of type B.
        tm.declare_method(b, m, 20);
        assert_eq!(tm.dispatch(b, m), Some(20));
        assert_eq!(tm.dispatch(a, m), Some(10));
    }

    #[test]
    fn test_declared_method_does_not_inherit() {
        let tm = TypeManager::new();
        let a = class(&tm, "A", tm.object());
        let b = class(&tm, "B", a);
        let clinit = tm.subsig("<clinit>()");

        tm.declare_method(a, clinit, 1);
        assert_eq!(tm.declared_method(a, clinit), Some(1));
        assert_eq!(tm.declared_method(b, clinit), None);
    }

    #[test]
    fn test_intern_is_idempotent() {
        let tm = TypeManager::new();
        let a1 = class(&tm, "A", tm.object());
        let a2 = class(&tm, "A", tm.object());
        assert_eq!(a1, a2);
        assert_eq!(tm.lookup("A"), Some(a1));
        assert_eq!(tm.lookup("Missing"), None);
    }
}
