//! Analysis driver
//!
//! Wires validated options into a configured solver: heap model,
//! context selector, CS manager, and the plugin roster in the fixed
//! registration order (the timer first, so its span covers every other
//! plugin; the fixpoint itself does not depend on the order).

use std::sync::Arc;

use crate::config::{ReflectionInference, SolverKind};
use crate::context::{make_selector, ContextPool};
use crate::errors::{PtaError, Result};
use crate::heap::HeapModel;
use crate::plugin::reflection::parse_reflection_log;
use crate::plugin::{
    AnalysisTimer, ClassInitializer, CompositePlugin, ExceptionAnalysis, LambdaAnalysis, Plugin,
    ReflectionHandler, TaintAnalysis, ThreadHandler,
};
use crate::plugin::taint::TaintConfig;
use crate::solver::{CancelToken, DefaultSolver, PointerAnalysisResult, SimpleSolver, Solver};
use crate::World;

/// Whole-program pointer analysis over a built `World`.
pub struct PointerAnalysis {
    world: Arc<World>,
    extra_plugins: Vec<Box<dyn Plugin>>,
    cancel: Option<CancelToken>,
}

impl PointerAnalysis {
    pub fn new(world: World) -> Self {
        Self {
            world: Arc::new(world),
            extra_plugins: Vec::new(),
            cancel: None,
        }
    }

    /// Register an additional plugin, after the built-in roster.
    pub fn with_plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.extra_plugins.push(plugin);
        self
    }

    /// Use an externally held cancellation token. Takes precedence over
    /// the configured time budget.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the analysis to fixpoint and freeze the result.
    pub fn run(self) -> Result<PointerAnalysisResult> {
        let world = self.world;
        let options = world.options.clone();

        // Configuration-dependent inputs are parsed before any analysis
        // work so bad files surface as configuration errors.
        let taint_config = match &options.taint_config {
            Some(path) => Some(TaintConfig::from_file(path)?),
            None => None,
        };
        let reflection_log = match &options.reflection_log {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    PtaError::config(format!(
                        "cannot read reflection log {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                parse_reflection_log(&text)?
            }
            None => Vec::new(),
        };

        let ctxs = Arc::new(ContextPool::new());
        let heap = Arc::new(HeapModel::new(Arc::clone(&world)));
        let selector = make_selector(options.cs, Arc::clone(&ctxs), Arc::clone(&heap));

        let mut plugins = CompositePlugin::new();
        plugins.add_plugin(Box::new(AnalysisTimer::new()));
        plugins.add_plugin(Box::new(ClassInitializer::new()));
        plugins.add_plugin(Box::new(ThreadHandler::new()));
        plugins.add_plugin(Box::new(ExceptionAnalysis::new()));
        if options.reflection_inference != ReflectionInference::Off || !reflection_log.is_empty() {
            plugins.add_plugin(Box::new(ReflectionHandler::new(
                options.reflection_inference,
                reflection_log,
            )));
        }
        plugins.add_plugin(Box::new(LambdaAnalysis::new()));
        if let Some(config) = taint_config {
            plugins.add_plugin(Box::new(TaintAnalysis::new(config)));
        }
        for plugin in self.extra_plugins {
            plugins.add_plugin(plugin);
        }

        let cancel = match (self.cancel, options.time_budget) {
            (Some(token), _) => token,
            (None, Some(budget)) => CancelToken::with_budget(budget),
            (None, None) => CancelToken::new(),
        };

        let solver: Box<dyn Solver> = match options.solver {
            SolverKind::Default => Box::new(DefaultSolver::new(
                world, heap, ctxs, selector, plugins, cancel,
            )),
            SolverKind::Simple => Box::new(SimpleSolver::new(
                world, heap, ctxs, selector, plugins, cancel,
            )),
        };
        solver.solve()
    }
}
