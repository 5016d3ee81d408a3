//! Cross-checking the two solver implementations
//!
//! The incremental default solver and the naive simple solver must
//! freeze identical results on the same input, across sensitivity
//! variants. Reports render in sorted order, so equal text means equal
//! reachable methods, call edges, and points-to sets. Repeated runs of
//! the same solver must also agree with themselves.

mod common;

use common::{class_with_ctor, emit_new_with_ctor, options};
use ptagraph::ir::CallKind;
use ptagraph::{AnalysisOptions, PointerAnalysis, ProgramBuilder, SolverKind, World};

/// A program touching every constraint kind: allocation, copies, casts,
/// instance and static fields, arrays, virtual and static calls, and a
/// throw/catch pair.
fn mixed_program(opts: AnalysisOptions) -> World {
    let mut b = ProgramBuilder::new();
    let object = b.types().object();
    let throwable = b.add_library_class("java.lang.Throwable");
    let err = b.add_class_extending("AppError", throwable, &[]);

    let (cls_a, _) = class_with_ctor(&mut b, "A");
    let cls_b = b.add_class("B");
    let f = b.add_field(cls_a, "f", Some(object), false);
    let g = b.add_field(cls_a, "g", Some(object), true);

    let worker = b.add_class("Worker");
    let step = b.add_method(worker, "step", &[object], false);
    let step_v = b.param(step, 0);
    let step_ret = b.new_var(step, "out", Some(object));
    b.emit_copy(step, step_ret, step_v);
    b.emit_return(step, Some(step_ret));

    let boom = b.add_method(worker, "boom", &[], true);
    let ex = b.new_var(boom, "ex", Some(err));
    b.emit_new(boom, ex, err);
    b.emit_throw(boom, ex);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let handler_var = b.new_var(main, "caught", Some(throwable));
    b.add_handler(main, throwable, handler_var);

    let a = b.new_var(main, "a", Some(cls_a));
    let bb = b.new_var(main, "bb", Some(cls_b));
    let w = b.new_var(main, "w", Some(worker));
    let x = b.new_var(main, "x", Some(object));
    let y = b.new_var(main, "y", Some(object));
    let z = b.new_var(main, "z", Some(cls_b));
    emit_new_with_ctor(&mut b, main, a, cls_a);
    b.emit_new(main, bb, cls_b);
    b.emit_new(main, w, worker);
    b.emit_store_field(main, a, f, bb);
    b.emit_load_field(main, x, a, f);
    b.emit_store_static(main, g, a);
    b.emit_load_static(main, y, g);
    b.emit_cast(main, z, x, cls_b);
    let arr_ty = b.array_of(object);
    let arr = b.new_var(main, "arr", Some(arr_ty));
    let elem = b.new_var(main, "elem", Some(object));
    b.emit_new(main, arr, arr_ty);
    b.emit_store_array(main, arr, bb);
    b.emit_load_array(main, elem, arr);
    let r = b.new_var(main, "r", Some(object));
    b.emit_call(
        main,
        CallKind::Virtual,
        worker,
        "step(java.lang.Object)",
        Some(w),
        &[a],
        Some(r),
    );
    b.emit_call(main, CallKind::Static, worker, "boom()", None, &[], None);

    b.build(opts)
}

fn run_with(opts: AnalysisOptions) -> (String, ptagraph::PtaStats) {
    let result = PointerAnalysis::new(mixed_program(opts)).run().unwrap();
    (result.render_report(), result.stats())
}

fn assert_solvers_agree(cs: &str) {
    let default_opts = options(cs);
    let mut simple_opts = options(cs);
    simple_opts.solver = SolverKind::Simple;

    let (default_report, default_stats) = run_with(default_opts);
    let (simple_report, simple_stats) = run_with(simple_opts);
    assert_eq!(
        default_report, simple_report,
        "solver reports diverge under cs={}",
        cs
    );
    assert_eq!(default_stats, simple_stats);
}

#[test]
fn test_solvers_agree_insensitive() {
    assert_solvers_agree("ci");
}

#[test]
fn test_solvers_agree_one_call() {
    assert_solvers_agree("1-call");
}

#[test]
fn test_solvers_agree_two_call() {
    assert_solvers_agree("2-call");
}

#[test]
fn test_solvers_agree_one_object() {
    assert_solvers_agree("1-obj");
}

#[test]
fn test_solvers_agree_one_type() {
    assert_solvers_agree("1-type");
}

#[test]
fn test_default_solver_is_deterministic() {
    let (first, _) = run_with(options("2-obj"));
    let (second, _) = run_with(options("2-obj"));
    assert_eq!(first, second);
}

#[test]
fn test_report_mentions_every_section() {
    let (report, _) = run_with(options("ci"));
    for header in [
        "Reachable methods",
        "Call graph edges",
        "all variables",
        "all instance fields",
        "all array indexes",
        "all static fields",
    ] {
        assert!(report.contains(header), "missing section: {}", header);
    }
}

#[test]
fn test_stats_count_both_projections() {
    let result = PointerAnalysis::new(mixed_program(options("1-call")))
        .run()
        .unwrap();
    let stats = result.stats();
    assert!(stats.var_pointers_sens >= stats.var_pointers_insens);
    assert!(stats.reachable_sens >= stats.reachable_insens);
    assert!(stats.call_edges_sens >= stats.call_edges_insens);
    let rendered = stats.to_string();
    assert!(rendered.contains("#reachable methods:"));
    assert!(rendered.contains("#var pointers:"));
}
