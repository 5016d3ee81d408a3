//! Analysis configuration
//!
//! Typed options with fallible parsers for the stringly-typed knobs.
//! Every unknown value is rejected with a configuration error before any
//! analysis work starts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::PtaError;

/// Which solver implementation to run.
///
/// `Default` uses all optimizations (delta propagation, hybrid sets,
/// on-the-fly edge filtering); `Simple` is a naive reference
/// implementation kept for cross-checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SolverKind {
    Default,
    Simple,
}

impl FromStr for SolverKind {
    type Err = PtaError;

    fn from_str(s: &str) -> Result<Self, PtaError> {
        match s {
            "default" => Ok(SolverKind::Default),
            "simple" => Ok(SolverKind::Simple),
            other => Err(PtaError::config(format!("unknown solver: {}", other))),
        }
    }
}

impl TryFrom<String> for SolverKind {
    type Error = PtaError;
    fn try_from(s: String) -> Result<Self, PtaError> {
        s.parse()
    }
}

impl From<SolverKind> for String {
    fn from(k: SolverKind) -> String {
        match k {
            SolverKind::Default => "default".into(),
            SolverKind::Simple => "simple".into(),
        }
    }
}

/// Context-sensitivity variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CsVariant {
    /// Context-insensitive baseline
    Insensitive,
    /// Last k call sites
    KCall(usize),
    /// Last k receiver objects
    KObj(usize),
    /// Last k receiver types
    KType(usize),
}

impl CsVariant {
    pub fn depth(&self) -> usize {
        match self {
            CsVariant::Insensitive => 0,
            CsVariant::KCall(k) | CsVariant::KObj(k) | CsVariant::KType(k) => *k,
        }
    }
}

impl FromStr for CsVariant {
    type Err = PtaError;

    fn from_str(s: &str) -> Result<Self, PtaError> {
        match s {
            "ci" => Ok(CsVariant::Insensitive),
            "1-call" | "1-cfa" => Ok(CsVariant::KCall(1)),
            "2-call" | "2-cfa" => Ok(CsVariant::KCall(2)),
            "1-obj" | "1-object" => Ok(CsVariant::KObj(1)),
            "2-obj" | "2-object" => Ok(CsVariant::KObj(2)),
            "1-type" => Ok(CsVariant::KType(1)),
            "2-type" => Ok(CsVariant::KType(2)),
            other => Err(PtaError::config(format!(
                "unknown context sensitivity variant: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for CsVariant {
    type Error = PtaError;
    fn try_from(s: String) -> Result<Self, PtaError> {
        s.parse()
    }
}

impl From<CsVariant> for String {
    fn from(v: CsVariant) -> String {
        match v {
            CsVariant::Insensitive => "ci".into(),
            CsVariant::KCall(k) => format!("{}-call", k),
            CsVariant::KObj(k) => format!("{}-obj", k),
            CsVariant::KType(k) => format!("{}-type", k),
        }
    }
}

/// How reflective call targets are inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReflectionInference {
    Off,
    /// Resolve targets from string constants flowing into reflective APIs
    StringConstant,
    /// Solar-style inference; currently resolved with the same
    /// string-constant propagation machinery
    Solar,
}

impl FromStr for ReflectionInference {
    type Err = PtaError;

    fn from_str(s: &str) -> Result<Self, PtaError> {
        match s {
            "off" => Ok(ReflectionInference::Off),
            "string-constant" => Ok(ReflectionInference::StringConstant),
            "solar" => Ok(ReflectionInference::Solar),
            other => Err(PtaError::config(format!(
                "unknown reflection inference strategy: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ReflectionInference {
    type Error = PtaError;
    fn try_from(s: String) -> Result<Self, PtaError> {
        s.parse()
    }
}

impl From<ReflectionInference> for String {
    fn from(r: ReflectionInference) -> String {
        match r {
            ReflectionInference::Off => "off".into(),
            ReflectionInference::StringConstant => "string-constant".into(),
            ReflectionInference::Solar => "solar".into(),
        }
    }
}

/// Options recognized by the analysis core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub solver: SolverKind,
    pub cs: CsVariant,
    /// Confine reachable-body processing to application classes
    pub only_app: bool,
    /// One abstract object per string literal (false merges all string
    /// constants into a single object)
    pub distinguish_string_constants: bool,
    /// Merge every string object into one
    pub merge_string_objects: bool,
    /// Merge StringBuilder/StringBuffer objects per type
    pub merge_string_builders: bool,
    /// Merge throwable objects per type
    pub merge_exception_objects: bool,
    /// Taint specification; presence enables the taint plugin
    pub taint_config: Option<PathBuf>,
    pub reflection_inference: ReflectionInference,
    /// Externally supplied reflection-resolution log
    pub reflection_log: Option<PathBuf>,
    /// Wall-clock budget for the solve
    #[serde(skip)]
    pub time_budget: Option<Duration>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            solver: SolverKind::Default,
            cs: CsVariant::Insensitive,
            only_app: false,
            distinguish_string_constants: true,
            merge_string_objects: false,
            merge_string_builders: true,
            merge_exception_objects: true,
            taint_config: None,
            reflection_inference: ReflectionInference::Off,
            reflection_log: None,
            time_budget: None,
        }
    }
}

impl AnalysisOptions {
    pub fn with_cs(mut self, cs: &str) -> crate::Result<Self> {
        self.cs = cs.parse()?;
        Ok(self)
    }

    pub fn with_solver(mut self, solver: &str) -> crate::Result<Self> {
        self.solver = solver.parse()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cs_aliases() {
        assert_eq!("ci".parse::<CsVariant>().unwrap(), CsVariant::Insensitive);
        assert_eq!("1-cfa".parse::<CsVariant>().unwrap(), CsVariant::KCall(1));
        assert_eq!("1-call".parse::<CsVariant>().unwrap(), CsVariant::KCall(1));
        assert_eq!("2-object".parse::<CsVariant>().unwrap(), CsVariant::KObj(2));
        assert_eq!("1-type".parse::<CsVariant>().unwrap(), CsVariant::KType(1));
    }

    #[test]
    fn test_unknown_values_are_config_errors() {
        assert!(matches!(
            "3-cfa".parse::<CsVariant>(),
            Err(PtaError::Config(_))
        ));
        assert!(matches!(
            "fast".parse::<SolverKind>(),
            Err(PtaError::Config(_))
        ));
        assert!(matches!(
            "ml".parse::<ReflectionInference>(),
            Err(PtaError::Config(_))
        ));
    }

    #[test]
    fn test_options_roundtrip_json() {
        let opts = AnalysisOptions::default()
            .with_cs("2-obj")
            .unwrap()
            .with_solver("simple")
            .unwrap();
        let json = serde_json::to_string(&opts).unwrap();
        let back: AnalysisOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cs, CsVariant::KObj(2));
        assert_eq!(back.solver, SolverKind::Simple);
    }
}
