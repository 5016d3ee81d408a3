//! Taint analysis
//!
//! Driven by a JSON specification of sources, sinks, and transfers.
//! Source methods introduce taint marks at their call-site results;
//! transfer methods move marks between the receiver, arguments, and
//! result of a call; marks reaching a sink argument are reported as
//! flows in the frozen result.
//!
//! Specification format:
//! ```json
//! {
//!   "sources":   [ { "method": "Source.get()", "type": "java.lang.String" } ],
//!   "sinks":     [ { "method": "Sink.leak(java.lang.String)", "index": 0 } ],
//!   "transfers": [ { "method": "java.lang.String.concat(java.lang.String)",
//!                    "from": "base", "to": "result" } ]
//! }
//! ```

use std::path::Path;
use std::str::FromStr;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cs::PointerId;
use crate::errors::{PtaError, Result};
use crate::graph::CallEdge;
use crate::heap::{ObjId, ObjKind};
use crate::ir::{CallSiteId, MethodId, TypeId};
use crate::plugin::{Plugin, PluginContext};

/// One observed source-to-sink flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaintFlow {
    /// Call site where the taint mark was introduced
    pub source_site: CallSiteId,
    /// Call site of the sink
    pub sink_site: CallSiteId,
    /// Which sink argument received the mark
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub method: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSpec {
    pub method: String,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSpec {
    pub method: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaintConfig {
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub sinks: Vec<SinkSpec>,
    #[serde(default)]
    pub transfers: Vec<TransferSpec>,
}

impl TaintConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PtaError::config(format!("cannot read taint config {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| PtaError::config(format!("malformed taint config: {}", e)))
    }
}

/// An endpoint of a taint transfer at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Base,
    Result,
    Arg(usize),
}

impl FromStr for Endpoint {
    type Err = PtaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base" => Ok(Endpoint::Base),
            "result" => Ok(Endpoint::Result),
            other => match other.strip_prefix("arg:") {
                Some(n) => n
                    .parse()
                    .map(Endpoint::Arg)
                    .map_err(|_| PtaError::config(format!("bad transfer endpoint: {}", other))),
                None => Err(PtaError::config(format!(
                    "bad transfer endpoint: {}",
                    other
                ))),
            },
        }
    }
}

#[derive(Default)]
struct ResolvedConfig {
    /// Source method -> type of the introduced mark
    sources: FxHashMap<MethodId, TypeId>,
    /// Sink method -> monitored argument indices
    sinks: FxHashMap<MethodId, Vec<usize>>,
    /// Transfer method -> (from, to) endpoint pairs
    transfers: FxHashMap<MethodId, Vec<(Endpoint, Endpoint)>>,
}

pub struct TaintAnalysis {
    config: TaintConfig,
    resolved: ResolvedConfig,
    /// Watched transfer-source pointer -> destinations
    watched: FxHashMap<PointerId, Vec<PointerId>>,
    reported: FxHashSet<TaintFlow>,
}

impl TaintAnalysis {
    pub fn new(config: TaintConfig) -> Self {
        Self {
            config,
            resolved: ResolvedConfig::default(),
            watched: FxHashMap::default(),
            reported: FxHashSet::default(),
        }
    }

    /// Split `"Class.name(params)"` into class name and subsignature.
    fn split_method(spec: &str) -> Option<(&str, &str)> {
        let paren = spec.find('(')?;
        let dot = spec[..paren].rfind('.')?;
        Some((&spec[..dot], &spec[dot + 1..]))
    }

    fn resolve_method(ctx: &PluginContext<'_>, spec: &str) -> Option<MethodId> {
        let (class_name, subsig_str) = Self::split_method(spec)?;
        let class = ctx.world.types.lookup(class_name)?;
        let subsig = ctx.world.types.subsig(subsig_str);
        ctx.world
            .types
            .declared_method(class, subsig)
            .or_else(|| ctx.world.types.dispatch(class, subsig))
    }

    fn endpoint_pointer(
        ctx: &PluginContext<'_>,
        edge: &CallEdge,
        endpoint: Endpoint,
    ) -> Option<PointerId> {
        let csd = ctx.world.program.call_site(edge.site);
        let var = match endpoint {
            Endpoint::Base => csd.recv,
            Endpoint::Result => csd.result,
            Endpoint::Arg(i) => csd.args.get(i).copied(),
        }?;
        Some(ctx.cs.var_ptr(edge.caller_ctx, var))
    }

    fn taint_marks(ctx: &PluginContext<'_>, set: &crate::collections::PointsToSet) -> Vec<ObjId> {
        set.iter()
            .filter(|&o| matches!(ctx.heap.obj(o).kind, ObjKind::Taint(_)))
            .collect()
    }
}

impl Plugin for TaintAnalysis {
    fn name(&self) -> &'static str {
        "taint-analysis"
    }

    fn on_start(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        let config = self.config.clone();
        for spec in &config.sources {
            let Some(method) = Self::resolve_method(ctx, &spec.method) else {
                warn!(method = %spec.method, "taint source method not found");
                continue;
            };
            let ty = ctx.world.types.ensure_class(&spec.ty);
            self.resolved.sources.insert(method, ty);
        }
        for spec in &config.sinks {
            let Some(method) = Self::resolve_method(ctx, &spec.method) else {
                warn!(method = %spec.method, "taint sink method not found");
                continue;
            };
            self.resolved.sinks.entry(method).or_default().push(spec.index);
        }
        for spec in &config.transfers {
            let Some(method) = Self::resolve_method(ctx, &spec.method) else {
                warn!(method = %spec.method, "taint transfer method not found");
                continue;
            };
            let from = spec.from.parse()?;
            let to = spec.to.parse()?;
            self.resolved
                .transfers
                .entry(method)
                .or_default()
                .push((from, to));
        }
        Ok(())
    }

    fn on_new_call_edge(&mut self, ctx: &mut PluginContext<'_>, edge: CallEdge) -> Result<()> {
        let callee = ctx.cs.method_parts(edge.callee).1;
        if let Some(&ty) = self.resolved.sources.get(&callee) {
            if let Some(result) = ctx.world.program.call_site(edge.site).result {
                let mark = ctx.heap.taint_obj(edge.site, ty);
                let p = ctx.cs.var_ptr(edge.caller_ctx, result);
                ctx.add_points_to(p, vec![mark]);
            }
        }
        if let Some(pairs) = self.resolved.transfers.get(&callee).cloned() {
            for (from, to) in pairs {
                let (Some(from_ptr), Some(to_ptr)) = (
                    Self::endpoint_pointer(ctx, &edge, from),
                    Self::endpoint_pointer(ctx, &edge, to),
                ) else {
                    continue;
                };
                self.watched.entry(from_ptr).or_default().push(to_ptr);
                // Marks that arrived before this edge existed.
                if let Some(pts) = ctx.pts(from_ptr) {
                    let marks = Self::taint_marks(ctx, pts);
                    if !marks.is_empty() {
                        ctx.add_points_to(to_ptr, marks);
                    }
                }
            }
        }
        Ok(())
    }

    fn on_new_points_to_set(
        &mut self,
        ctx: &mut PluginContext<'_>,
        pointer: PointerId,
        delta: &crate::collections::PointsToSet,
    ) -> Result<()> {
        let Some(targets) = self.watched.get(&pointer) else {
            return Ok(());
        };
        let marks = Self::taint_marks(ctx, delta);
        if marks.is_empty() {
            return Ok(());
        }
        for to_ptr in targets.clone() {
            ctx.add_points_to(to_ptr, marks.clone());
        }
        Ok(())
    }

    fn on_finish(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        let edges: Vec<CallEdge> = ctx.call_graph.edges().to_vec();
        for edge in edges {
            let callee = ctx.cs.method_parts(edge.callee).1;
            let Some(indices) = self.resolved.sinks.get(&callee).cloned() else {
                continue;
            };
            for index in indices {
                let Some(arg_ptr) = Self::endpoint_pointer(ctx, &edge, Endpoint::Arg(index)) else {
                    continue;
                };
                let marks = match ctx.pts(arg_ptr) {
                    Some(pts) => Self::taint_marks(ctx, pts),
                    None => continue,
                };
                for mark in marks {
                    let ObjKind::Taint(source_site) = ctx.heap.obj(mark).kind else {
                        continue;
                    };
                    let flow = TaintFlow {
                        source_site,
                        sink_site: edge.site,
                        index,
                    };
                    if self.reported.insert(flow) {
                        ctx.report_taint_flow(flow);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parsing() {
        let json = r#"{
            "sources": [ { "method": "Source.get()", "type": "java.lang.String" } ],
            "sinks": [ { "method": "Sink.leak(java.lang.String)", "index": 0 } ],
            "transfers": [ { "method": "S.concat(S)", "from": "base", "to": "result" } ]
        }"#;
        let config = TaintConfig::from_json(json).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sinks[0].index, 0);
        assert_eq!(config.transfers[0].from, "base");
    }

    #[test]
    fn test_malformed_config_is_config_error() {
        assert!(matches!(
            TaintConfig::from_json("{ not json"),
            Err(PtaError::Config(_))
        ));
    }

    #[test]
    fn test_endpoint_parsing() {
        assert_eq!("base".parse::<Endpoint>().unwrap(), Endpoint::Base);
        assert_eq!("result".parse::<Endpoint>().unwrap(), Endpoint::Result);
        assert_eq!("arg:2".parse::<Endpoint>().unwrap(), Endpoint::Arg(2));
        assert!("argument".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_split_method() {
        assert_eq!(
            TaintAnalysis::split_method("java.lang.String.concat(java.lang.String)"),
            Some(("java.lang.String", "concat(java.lang.String)"))
        );
        assert_eq!(
            TaintAnalysis::split_method("Source.get()"),
            Some(("Source", "get()"))
        );
        assert_eq!(TaintAnalysis::split_method("nodot"), None);
    }
}
