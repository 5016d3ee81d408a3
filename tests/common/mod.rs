//! Shared helpers for integration tests

use ptagraph::ir::{CallKind, MethodId, TypeId, VarId};
use ptagraph::{AnalysisOptions, PointerAnalysis, PointerAnalysisResult, ProgramBuilder, World};

pub fn options(cs: &str) -> AnalysisOptions {
    AnalysisOptions::default().with_cs(cs).unwrap()
}

#[allow(dead_code)]
pub fn solve(world: World) -> PointerAnalysisResult {
    PointerAnalysis::new(world).run().expect("analysis failed")
}

/// Declare a class together with a no-op constructor.
#[allow(dead_code)]
pub fn class_with_ctor(b: &mut ProgramBuilder, name: &str) -> (TypeId, MethodId) {
    let class = b.add_class(name);
    let ctor = b.add_method(class, "<init>", &[], false);
    (class, ctor)
}

/// Emit `lhs = new class()` followed by the constructor call.
#[allow(dead_code)]
pub fn emit_new_with_ctor(
    b: &mut ProgramBuilder,
    method: MethodId,
    lhs: VarId,
    class: TypeId,
) -> u32 {
    let site = b.emit_new(method, lhs, class);
    b.emit_call(
        method,
        CallKind::Special,
        class,
        "<init>()",
        Some(lhs),
        &[],
        None,
    );
    site
}
