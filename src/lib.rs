//! # ptagraph
//!
//! Whole-program, context-sensitive, subset-based pointer analysis over
//! an object-oriented IR with JVM-like semantics. Given a program and
//! its entry points, computes the abstract objects every pointer may
//! reference together with the call graph discovered on the fly, under
//! a pluggable context abstraction (call-site, object, or type
//! k-sensitivity) and an allocation-site heap model. Auxiliary
//! semantic models (class initialization, threads, exceptions,
//! reflection, lambdas, taint) participate through a plugin protocol.
//!
//! ## Usage
//! ```
//! use ptagraph::{AnalysisOptions, PointerAnalysis, ProgramBuilder};
//!
//! let mut b = ProgramBuilder::new();
//! let a = b.add_class("A");
//! let main = b.add_method(a, "main", &[], true);
//! b.add_entry_point(main);
//! let x = b.new_var(main, "x", Some(a));
//! let y = b.new_var(main, "y", Some(a));
//! b.emit_new(main, x, a);
//! b.emit_copy(main, y, x);
//!
//! let world = b.build(AnalysisOptions::default());
//! let result = PointerAnalysis::new(world).run().unwrap();
//! assert_eq!(
//!     result.ci_var_points_to(x),
//!     result.ci_var_points_to(y),
//! );
//! ```

pub mod analysis;
pub mod collections;
pub mod config;
pub mod context;
pub mod cs;
pub mod errors;
pub mod graph;
pub mod heap;
pub mod ir;
pub mod plugin;
pub mod solver;

pub use analysis::PointerAnalysis;
pub use config::{AnalysisOptions, CsVariant, ReflectionInference, SolverKind};
pub use errors::{PtaError, Result};
pub use ir::ProgramBuilder;
pub use plugin::{Plugin, PluginContext};
pub use solver::{CancelToken, PointerAnalysisResult, PtaStats};

use ir::{Program, TypeManager};

/// The program model and options, threaded through the solver as an
/// explicit dependency. Constructed once by the front end, released
/// when the frozen result is dropped.
pub struct World {
    pub types: TypeManager,
    pub program: Program,
    pub options: AnalysisOptions,
}
