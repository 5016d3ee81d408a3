//! Plugin behaviors
//!
//! Class initialization ordering, thread start/run dispatch, exception
//! catch chains, lambda desugaring, reflection resolution, taint
//! source-to-sink tracking, result rendering, plugin error isolation,
//! and cancellation.

mod common;

use common::{options, solve};
use ptagraph::heap::ObjKind;
use ptagraph::ir::{CallKind, DynamicInfo, MethodId};
use ptagraph::plugin::taint::TaintConfig;
use ptagraph::plugin::{Plugin, PluginContext, ResultProcessor, TaintAnalysis};
use ptagraph::{
    CancelToken, PointerAnalysis, ProgramBuilder, PtaError, ReflectionInference,
};

// ----------------------------------------------------------------------
// Class initialization
// ----------------------------------------------------------------------

#[test]
fn test_clinit_runs_on_first_use_superclasses_first() {
    let mut b = ProgramBuilder::new();
    let base = b.add_class("Base");
    let base_clinit = b.add_method(base, "<clinit>", &[], true);
    let derived = b.add_class_extending("Derived", base, &[]);
    let derived_clinit = b.add_method(derived, "<clinit>", &[], true);
    let unused = b.add_class("Unused");
    let unused_clinit = b.add_method(unused, "<clinit>", &[], true);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let d = b.new_var(main, "d", Some(derived));
    b.emit_new(main, d, derived);

    let result = solve(b.build(options("ci")));

    assert!(result.is_reachable(base_clinit));
    assert!(result.is_reachable(derived_clinit));
    assert!(!result.is_reachable(unused_clinit));
    // Base's initializer was discovered no later than Derived's.
    let order: Vec<MethodId> = result
        .reachable_cs_methods()
        .iter()
        .map(|&m| result.cs().method_parts(m).1)
        .collect();
    let pos = |m: MethodId| order.iter().position(|&x| x == m).unwrap();
    assert!(pos(base_clinit) < pos(derived_clinit));
}

#[test]
fn test_static_call_triggers_callee_class_init() {
    let mut b = ProgramBuilder::new();
    let util = b.add_class("Util");
    let util_clinit = b.add_method(util, "<clinit>", &[], true);
    b.add_method(util, "helper", &[], true);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    b.emit_call(main, CallKind::Static, util, "helper()", None, &[], None);

    let result = solve(b.build(options("ci")));
    assert!(result.is_reachable(util_clinit));
}

// ----------------------------------------------------------------------
// Threads
// ----------------------------------------------------------------------

#[test]
fn test_thread_start_dispatches_to_run() {
    let mut b = ProgramBuilder::new();
    let thread = b.add_library_class("java.lang.Thread");
    b.add_method(thread, "start", &[], false);
    b.add_method(thread, "run", &[], false);
    let my_thread = b.add_class_extending("MyThread", thread, &[]);
    let my_run = b.add_method(my_thread, "run", &[], false);
    let run_this = b.this_var(my_run).unwrap();

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let t = b.new_var(main, "t", Some(thread));
    let site = b.emit_new(main, t, my_thread);
    b.emit_call(main, CallKind::Virtual, thread, "start()", Some(t), &[], None);

    let result = solve(b.build(options("ci")));

    assert!(result.is_reachable(my_run));
    let this_sites = result.sites_of(&result.ci_var_points_to(run_this));
    assert!(this_sites.contains(&site));
}

#[test]
fn test_current_thread_yields_main_thread_object() {
    let mut b = ProgramBuilder::new();
    let thread = b.add_library_class("java.lang.Thread");
    b.add_method(thread, "currentThread", &[], true);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let t = b.new_var(main, "t", Some(thread));
    b.emit_call(
        main,
        CallKind::Static,
        thread,
        "currentThread()",
        None,
        &[],
        Some(t),
    );

    let result = solve(b.build(options("ci")));
    let pts: Vec<u32> = result.ci_var_points_to(t).iter().collect();
    assert_eq!(pts.len(), 1);
    assert!(matches!(result.obj(pts[0]).kind, ObjKind::MainThread));
}

// ----------------------------------------------------------------------
// Exceptions
// ----------------------------------------------------------------------

#[test]
fn test_thrown_object_reaches_first_matching_handler() {
    let mut b = ProgramBuilder::new();
    let throwable = b.add_library_class("java.lang.Throwable");
    let io_err = b.add_class_extending("IoError", throwable, &[]);
    let app_err = b.add_class_extending("AppError", throwable, &[]);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let io_var = b.new_var(main, "io", Some(io_err));
    let any_var = b.new_var(main, "any", Some(throwable));
    b.add_handler(main, io_err, io_var);
    b.add_handler(main, throwable, any_var);

    let ex = b.new_var(main, "ex", Some(app_err));
    b.emit_new(main, ex, app_err);
    b.emit_throw(main, ex);

    let result = solve(b.build(options("ci")));

    // AppError is not an IoError: the first handler stays empty, the
    // catch-all receives it.
    assert!(result.ci_var_points_to(io_var).is_empty());
    let caught: Vec<u32> = result.ci_var_points_to(any_var).iter().collect();
    assert_eq!(caught.len(), 1);
    assert_eq!(result.obj(caught[0]).ty, app_err);
}

#[test]
fn test_uncaught_exception_escapes_to_caller() {
    let mut b = ProgramBuilder::new();
    let throwable = b.add_library_class("java.lang.Throwable");
    let app_err = b.add_class_extending("AppError", throwable, &[]);

    let worker = b.add_class("Worker");
    let boom = b.add_method(worker, "boom", &[], true);
    let ex = b.new_var(boom, "ex", Some(app_err));
    b.emit_new(boom, ex, app_err);
    b.emit_throw(boom, ex);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let caught = b.new_var(main, "caught", Some(throwable));
    b.add_handler(main, throwable, caught);
    b.emit_call(main, CallKind::Static, worker, "boom()", None, &[], None);

    let result = solve(b.build(options("ci")));
    let objs: Vec<u32> = result.ci_var_points_to(caught).iter().collect();
    assert_eq!(objs.len(), 1);
    assert_eq!(result.obj(objs[0]).ty, app_err);
}

// ----------------------------------------------------------------------
// Lambdas
// ----------------------------------------------------------------------

#[test]
fn test_lambda_invocation_forwards_to_impl_with_captures() {
    let mut b = ProgramBuilder::new();
    let object = b.types().object();
    let cls_a = b.add_class("A");
    let supplier = b.add_interface("Supplier");
    b.add_abstract_method(supplier, "get", &[]);
    let get_subsig = b.types().subsig("get()");

    // static Object lambda$0(Object captured) { return captured; }
    let holder = b.add_class("Main");
    let impl_m = b.add_method(holder, "lambda$0", &[object], true);
    let cap_param = b.param(impl_m, 0);
    b.emit_return(impl_m, Some(cap_param));

    let main = b.add_method(holder, "main", &[], true);
    b.add_entry_point(main);
    let cap = b.new_var(main, "cap", Some(cls_a));
    let site = b.emit_new(main, cap, cls_a);
    let f = b.new_var(main, "f", Some(supplier));
    b.emit_dynamic_call(
        main,
        DynamicInfo {
            interface: supplier,
            interface_subsig: get_subsig,
            impl_method: impl_m,
            captured: vec![cap],
        },
        f,
    );
    let x = b.new_var(main, "x", Some(object));
    b.emit_call(main, CallKind::Interface, supplier, "get()", Some(f), &[], Some(x));

    let result = solve(b.build(options("ci")));

    assert!(result.is_reachable(impl_m));
    // The lambda object reached f, and the captured value flowed
    // through the implementation into the invocation result.
    let f_objs: Vec<u32> = result.ci_var_points_to(f).iter().collect();
    assert_eq!(f_objs.len(), 1);
    assert!(matches!(result.obj(f_objs[0]).kind, ObjKind::Lambda(_)));
    assert!(result.sites_of(&result.ci_var_points_to(x)).contains(&site));
}

// ----------------------------------------------------------------------
// Reflection
// ----------------------------------------------------------------------

#[test]
fn test_forname_with_string_constant_initializes_class() {
    let mut b = ProgramBuilder::new();
    let class_cls = b.add_library_class("java.lang.Class");
    b.add_method(class_cls, "forName", &[b.types().ensure_class("java.lang.String")], true);
    let widget = b.add_class("Widget");
    let widget_clinit = b.add_method(widget, "<clinit>", &[], true);
    b.add_method(widget, "<init>", &[], false);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let s = b.new_var(main, "s", None);
    b.emit_string_const(main, s, "Widget");
    let c = b.new_var(main, "c", Some(class_cls));
    b.emit_call(
        main,
        CallKind::Static,
        class_cls,
        "forName(java.lang.String)",
        None,
        &[s],
        Some(c),
    );

    let mut opts = options("ci");
    opts.reflection_inference = ReflectionInference::StringConstant;
    let result = solve(b.build(opts));

    assert!(result.is_reachable(widget_clinit));
    let class_objs: Vec<u32> = result.ci_var_points_to(c).iter().collect();
    assert_eq!(class_objs.len(), 1);
    assert!(matches!(result.obj(class_objs[0]).kind, ObjKind::Class(t) if t == widget));
}

#[test]
fn test_newinstance_creates_object_and_calls_ctor() {
    let mut b = ProgramBuilder::new();
    let string_cls = b.types().ensure_class("java.lang.String");
    let class_cls = b.add_library_class("java.lang.Class");
    b.add_method(class_cls, "forName", &[string_cls], true);
    b.add_method(class_cls, "newInstance", &[], false);
    let widget = b.add_class("Widget");
    let widget_init = b.add_method(widget, "<init>", &[], false);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let s = b.new_var(main, "s", None);
    b.emit_string_const(main, s, "Widget");
    let c = b.new_var(main, "c", Some(class_cls));
    b.emit_call(
        main,
        CallKind::Static,
        class_cls,
        "forName(java.lang.String)",
        None,
        &[s],
        Some(c),
    );
    let n = b.new_var(main, "n", None);
    b.emit_call(
        main,
        CallKind::Virtual,
        class_cls,
        "newInstance()",
        Some(c),
        &[],
        Some(n),
    );

    let mut opts = options("ci");
    opts.reflection_inference = ReflectionInference::StringConstant;
    let result = solve(b.build(opts));

    assert!(result.is_reachable(widget_init));
    let objs: Vec<u32> = result.ci_var_points_to(n).iter().collect();
    assert_eq!(objs.len(), 1);
    assert!(matches!(result.obj(objs[0]).kind, ObjKind::Reflective(_, t) if t == widget));
}

#[test]
fn test_reflection_log_replay_on_tagged_site() {
    let mut b = ProgramBuilder::new();
    let class_cls = b.add_library_class("java.lang.Class");
    let widget = b.add_class("Widget");
    let widget_clinit = b.add_method(widget, "<clinit>", &[], true);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let c = b.new_var(main, "c", Some(class_cls));
    // The argument is unknown to the analysis; only the log resolves it.
    let s = b.new_var(main, "s", None);
    let site = b.emit_call(
        main,
        CallKind::Static,
        class_cls,
        "forName(java.lang.String)",
        None,
        &[s],
        Some(c),
    );
    b.set_call_tag(site, "cs-forname-1");

    let log_path = std::env::temp_dir().join("ptagraph-test-reflection.log");
    std::fs::write(&log_path, "forName cs-forname-1 Widget\n").unwrap();
    let mut opts = options("ci");
    opts.reflection_log = Some(log_path.clone());
    let result = solve(b.build(opts));
    std::fs::remove_file(&log_path).ok();

    assert!(result.is_reachable(widget_clinit));
    let class_objs: Vec<u32> = result.ci_var_points_to(c).iter().collect();
    assert_eq!(class_objs.len(), 1);
}

// ----------------------------------------------------------------------
// Taint
// ----------------------------------------------------------------------

#[test]
fn test_taint_flows_from_source_to_sink() {
    let mut b = ProgramBuilder::new();
    let string_cls = b.types().ensure_class("java.lang.String");
    let source_cls = b.add_class("Source");
    b.add_method(source_cls, "get", &[], true);
    let sink_cls = b.add_class("Sink");
    b.add_method(sink_cls, "leak", &[string_cls], true);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let s = b.new_var(main, "s", Some(string_cls));
    let t = b.new_var(main, "t", Some(string_cls));
    let source_site = b.emit_call(main, CallKind::Static, source_cls, "get()", None, &[], Some(s));
    b.emit_copy(main, t, s);
    let sink_site = b.emit_call(
        main,
        CallKind::Static,
        sink_cls,
        "leak(java.lang.String)",
        None,
        &[t],
        None,
    );

    let config = TaintConfig::from_json(
        r#"{
            "sources": [ { "method": "Source.get()", "type": "java.lang.String" } ],
            "sinks": [ { "method": "Sink.leak(java.lang.String)", "index": 0 } ]
        }"#,
    )
    .unwrap();
    let result = PointerAnalysis::new(b.build(options("ci")))
        .with_plugin(Box::new(TaintAnalysis::new(config)))
        .run()
        .unwrap();

    let flows = result.taint_flows();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].source_site, source_site);
    assert_eq!(flows[0].sink_site, sink_site);
    assert_eq!(flows[0].index, 0);
}

#[test]
fn test_untainted_value_does_not_reach_sink_report() {
    let mut b = ProgramBuilder::new();
    let string_cls = b.types().ensure_class("java.lang.String");
    let sink_cls = b.add_class("Sink");
    b.add_method(sink_cls, "leak", &[string_cls], true);

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let s = b.new_var(main, "s", Some(string_cls));
    b.emit_string_const(main, s, "benign");
    b.emit_call(
        main,
        CallKind::Static,
        sink_cls,
        "leak(java.lang.String)",
        None,
        &[s],
        None,
    );

    let config = TaintConfig::from_json(
        r#"{ "sinks": [ { "method": "Sink.leak(java.lang.String)", "index": 0 } ] }"#,
    )
    .unwrap();
    let result = PointerAnalysis::new(b.build(options("ci")))
        .with_plugin(Box::new(TaintAnalysis::new(config)))
        .run()
        .unwrap();
    assert!(result.taint_flows().is_empty());
}

// ----------------------------------------------------------------------
// Result processor, error isolation, cancellation
// ----------------------------------------------------------------------

#[test]
fn test_result_processor_renders_on_finish() {
    let mut b = ProgramBuilder::new();
    let cls_a = b.add_class("A");
    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let x = b.new_var(main, "x", Some(cls_a));
    b.emit_new(main, x, cls_a);

    let (processor, buffer) = ResultProcessor::shared();
    let result = PointerAnalysis::new(b.build(options("ci")))
        .with_plugin(Box::new(processor))
        .run()
        .unwrap();

    let rendered = buffer.lock().clone();
    assert_eq!(rendered, result.render_report());
    assert!(rendered.contains("Main.main()"));
}

/// Fails on every new method, recoverably.
struct FlakyPlugin;

impl Plugin for FlakyPlugin {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn on_new_method(&mut self, _ctx: &mut PluginContext<'_>, _m: MethodId) -> ptagraph::Result<()> {
        Err(PtaError::plugin("flaky", "intermittent failure"))
    }
}

/// Fails fatally on start.
struct FatalPlugin;

impl Plugin for FatalPlugin {
    fn name(&self) -> &'static str {
        "fatal"
    }

    fn on_start(&mut self, _ctx: &mut PluginContext<'_>) -> ptagraph::Result<()> {
        Err(PtaError::plugin_fatal("fatal", "cannot continue"))
    }
}

fn tiny_world(opts: ptagraph::AnalysisOptions) -> ptagraph::World {
    let mut b = ProgramBuilder::new();
    let cls_a = b.add_class("A");
    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let x = b.new_var(main, "x", Some(cls_a));
    b.emit_new(main, x, cls_a);
    b.build(opts)
}

#[test]
fn test_recoverable_plugin_error_does_not_abort() {
    let result = PointerAnalysis::new(tiny_world(options("ci")))
        .with_plugin(Box::new(FlakyPlugin))
        .run();
    assert!(result.is_ok());
}

#[test]
fn test_fatal_plugin_error_aborts() {
    let result = PointerAnalysis::new(tiny_world(options("ci")))
        .with_plugin(Box::new(FatalPlugin))
        .run();
    assert!(matches!(result, Err(PtaError::Plugin { fatal: true, .. })));
}

#[test]
fn test_cancellation_surfaces_cancelled_error() {
    let token = CancelToken::new();
    token.cancel();
    let result = PointerAnalysis::new(tiny_world(options("ci")))
        .with_cancel_token(token)
        .run();
    assert!(matches!(result, Err(PtaError::Cancelled)));
}

#[test]
fn test_only_app_keeps_library_bodies_opaque() {
    let mut b = ProgramBuilder::new();
    let cls_a = b.add_class("A");
    let lib = b.add_library_class("lib.Helper");
    let helper = b.add_method(lib, "make", &[], true);
    let inner = b.new_var(helper, "inner", Some(cls_a));
    b.emit_new(helper, inner, cls_a);
    b.emit_return(helper, Some(inner));

    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let x = b.new_var(main, "x", Some(cls_a));
    b.emit_call(main, CallKind::Static, lib, "make()", None, &[], Some(x));

    let mut opts = options("ci");
    opts.only_app = true;
    let result = solve(b.build(opts));

    // The library method is reachable, but its body contributed nothing.
    assert!(result.is_reachable(helper));
    assert!(result.ci_var_points_to(x).is_empty());
}

#[test]
fn test_merged_string_builders_share_one_object() {
    let mut b = ProgramBuilder::new();
    let sb = b.add_library_class("java.lang.StringBuilder");
    let main_cls = b.add_class("Main");
    let main = b.add_method(main_cls, "main", &[], true);
    b.add_entry_point(main);
    let x = b.new_var(main, "x", Some(sb));
    let y = b.new_var(main, "y", Some(sb));
    b.emit_new(main, x, sb);
    b.emit_new(main, y, sb);

    let result = solve(b.build(options("ci")));
    assert_eq!(result.ci_var_points_to(x), result.ci_var_points_to(y));
    let objs: Vec<u32> = result.ci_var_points_to(x).iter().collect();
    assert!(matches!(result.obj(objs[0]).kind, ObjKind::Merged(t) if t == sb));
}
