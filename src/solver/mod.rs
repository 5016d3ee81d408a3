//! Constraint solvers
//!
//! Two implementations of the same semantics: the default solver drives
//! an incremental worklist of (pointer, delta) pairs; the simple solver
//! is a naive round-based fixpoint kept as a reference for
//! cross-checking. Both produce the same frozen result.

pub mod default_solver;
pub mod result;
pub mod simple_solver;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::errors::{PtaError, Result};
use crate::ir::{CallSiteId, FieldId, MethodData, Program, Stmt, VarId};

pub use default_solver::DefaultSolver;
pub use result::{PointerAnalysisResult, PtaStats};
pub use simple_solver::SimpleSolver;

/// A solver is single-use: configuration happens at construction,
/// `solve` consumes it and freezes the result.
pub trait Solver {
    fn solve(self: Box<Self>) -> Result<PointerAnalysisResult>;
}

/// Cooperative cancellation, checked between worklist pops. Carries an
/// optional wall-clock deadline; expiry takes the same path as explicit
/// cancellation.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(budget: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + budget),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PtaError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Statements of a method relevant to a given base/receiver variable:
/// the accesses that must be materialized per object flowing into it.
#[derive(Debug, Default)]
pub(crate) struct VarAccess {
    /// `x.f = rhs`, keyed by x
    pub field_stores: Vec<(FieldId, VarId)>,
    /// `lhs = x.f`
    pub field_loads: Vec<(FieldId, VarId)>,
    /// `x[i] = rhs`
    pub array_stores: Vec<VarId>,
    /// `lhs = x[i]`
    pub array_loads: Vec<VarId>,
    /// call sites with receiver x
    pub invokes: Vec<CallSiteId>,
}

/// Per-method index from base variable to its relevant statements,
/// built once when the method first becomes reachable.
#[derive(Debug, Default)]
pub(crate) struct MethodSummary {
    by_var: FxHashMap<VarId, VarAccess>,
}

impl MethodSummary {
    pub fn build(mdef: &MethodData, program: &Program) -> Self {
        let mut summary = MethodSummary::default();
        for stmt in &mdef.stmts {
            match stmt {
                Stmt::StoreField { base, field, rhs } => {
                    summary.entry(*base).field_stores.push((*field, *rhs));
                }
                Stmt::LoadField { lhs, base, field } => {
                    summary.entry(*base).field_loads.push((*field, *lhs));
                }
                Stmt::StoreArray { base, rhs } => {
                    summary.entry(*base).array_stores.push(*rhs);
                }
                Stmt::LoadArray { lhs, base } => {
                    summary.entry(*base).array_loads.push(*lhs);
                }
                Stmt::Invoke(site) => {
                    if let Some(recv) = program.call_site(*site).recv {
                        summary.entry(recv).invokes.push(*site);
                    }
                }
                _ => {}
            }
        }
        summary
    }

    fn entry(&mut self, var: VarId) -> &mut VarAccess {
        self.by_var.entry(var).or_default()
    }

    pub fn for_var(&self, var: VarId) -> Option<&VarAccess> {
        self.by_var.get(&var)
    }
}
