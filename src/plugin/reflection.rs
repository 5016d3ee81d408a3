//! Reflection resolution
//!
//! Two strategies, combinable:
//! - string-constant propagation: literals flowing into
//!   `Class.forName(String)` resolve to class objects (triggering class
//!   initialization); class objects flowing into `Class.newInstance()`
//!   create reflective instances and dispatch their constructors;
//! - log-driven replay: an externally supplied log maps tagged call
//!   sites directly to target classes.

use rustc_hash::{FxHashMap, FxHashSet};

use tracing::warn;

use crate::config::ReflectionInference;
use crate::context::{CtxId, EMPTY_CTX};
use crate::cs::{CsMethodId, PointerId};
use crate::errors::{PtaError, Result};
use crate::heap::{ObjId, ObjKind};
use crate::ir::{CallKind, CallSiteId, Stmt, TypeId};
use crate::plugin::{Plugin, PluginContext};

/// One line of a reflection-resolution log: which tagged call site
/// resolves to which class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionLogEntry {
    pub kind: ReflectiveKind,
    pub tag: String,
    pub class_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectiveKind {
    ForName,
    NewInstance,
}

/// Parse a log of `forName <tag> <class>` / `newInstance <tag> <class>`
/// lines. Blank lines and `#` comments are skipped.
pub fn parse_reflection_log(text: &str) -> Result<Vec<ReflectionLogEntry>> {
    let mut entries = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (kind, tag, class_name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(t), Some(c)) => (k, t, c),
            _ => {
                return Err(PtaError::config(format!(
                    "malformed reflection log line {}: {}",
                    lineno + 1,
                    line
                )))
            }
        };
        let kind = match kind {
            "forName" => ReflectiveKind::ForName,
            "newInstance" => ReflectiveKind::NewInstance,
            other => {
                return Err(PtaError::config(format!(
                    "unknown reflection log kind: {}",
                    other
                )))
            }
        };
        entries.push(ReflectionLogEntry {
            kind,
            tag: tag.to_string(),
            class_name: class_name.to_string(),
        });
    }
    Ok(entries)
}

pub struct ReflectionHandler {
    inference: ReflectionInference,
    log: FxHashMap<String, Vec<ReflectionLogEntry>>,
    processed: FxHashSet<CsMethodId>,
    /// forName argument pointer -> the sites it feeds
    forname_args: FxHashMap<PointerId, Vec<(CallSiteId, CtxId)>>,
    /// newInstance receiver pointer -> the sites it feeds
    newinstance_recvs: FxHashMap<PointerId, Vec<(CallSiteId, CtxId)>>,
}

impl ReflectionHandler {
    pub fn new(inference: ReflectionInference, log_entries: Vec<ReflectionLogEntry>) -> Self {
        let mut log: FxHashMap<String, Vec<ReflectionLogEntry>> = FxHashMap::default();
        for entry in log_entries {
            log.entry(entry.tag.clone()).or_default().push(entry);
        }
        Self {
            inference,
            log,
            processed: FxHashSet::default(),
            forname_args: FxHashMap::default(),
            newinstance_recvs: FxHashMap::default(),
        }
    }

    fn infer_from_strings(&self) -> bool {
        !matches!(self.inference, ReflectionInference::Off)
    }

    /// The named class resolved against the type universe, with class
    /// initialization triggered.
    fn resolve_class(ctx: &mut PluginContext<'_>, name: &str) -> Option<TypeId> {
        let ty = ctx.world.types.lookup(name)?;
        let clinit = ctx.world.types.subsig("<clinit>()");
        if let Some(m) = ctx.world.types.declared_method(ty, clinit) {
            ctx.make_reachable(m, EMPTY_CTX);
        }
        Some(ty)
    }

    fn apply_forname(
        ctx: &mut PluginContext<'_>,
        site: CallSiteId,
        caller_ctx: CtxId,
        class_name: &str,
    ) {
        let Some(ty) = Self::resolve_class(ctx, class_name) else {
            warn!(class = class_name, "reflection target class not in type universe");
            return;
        };
        let result = ctx.world.program.call_site(site).result;
        if let Some(result) = result {
            let obj = ctx.heap.class_obj(ty);
            let p = ctx.cs.var_ptr(caller_ctx, result);
            ctx.add_points_to(p, vec![obj]);
        }
    }

    fn apply_new_instance(
        ctx: &mut PluginContext<'_>,
        site: CallSiteId,
        caller_ctx: CtxId,
        ty: TypeId,
    ) {
        let obj = ctx.heap.reflective_obj(site, ty);
        let world = ctx.world.clone();
        let csd = world.program.call_site(site);
        if let Some(result) = csd.result {
            let p = ctx.cs.var_ptr(caller_ctx, result);
            ctx.add_points_to(p, vec![obj]);
        }
        // Constructor of the instantiated class.
        let init = world.types.subsig("<init>()");
        if let Some(ctor) = world.types.declared_method(ty, init) {
            let callee_ctx = ctx.selector.select_context(site, caller_ctx, Some(obj));
            ctx.add_call_edge(
                site,
                caller_ctx,
                ctor,
                callee_ctx,
                CallKind::Special,
                Some(obj),
                false,
            );
        }
    }

    fn scan_site(&mut self, ctx: &mut PluginContext<'_>, site: CallSiteId, mctx: CtxId) {
        let world = ctx.world.clone();
        let csd = world.program.call_site(site);
        // Log replay works on tagged sites regardless of the inference
        // strategy.
        if let Some(tag) = &csd.tag {
            if let Some(entries) = self.log.get(tag).cloned() {
                for entry in entries {
                    match entry.kind {
                        ReflectiveKind::ForName => {
                            Self::apply_forname(ctx, site, mctx, &entry.class_name);
                        }
                        ReflectiveKind::NewInstance => {
                            if let Some(ty) = Self::resolve_class(ctx, &entry.class_name) {
                                Self::apply_new_instance(ctx, site, mctx, ty);
                            }
                        }
                    }
                }
            }
        }
        if !self.infer_from_strings() {
            return;
        }
        if world.types.name(csd.declared_class) != "java.lang.Class" {
            return;
        }
        let subsig = world.types.subsig_name(csd.subsig);
        if subsig == "forName(java.lang.String)" {
            if let Some(&arg) = csd.args.first() {
                let p = ctx.cs.var_ptr(mctx, arg);
                self.forname_args.entry(p).or_default().push((site, mctx));
                if let Some(pts) = ctx.pts(p) {
                    let objs: Vec<ObjId> = pts.iter().collect();
                    self.forname_objs(ctx, site, mctx, &objs);
                }
            }
        } else if subsig == "newInstance()" {
            if let Some(recv) = csd.recv {
                let p = ctx.cs.var_ptr(mctx, recv);
                self.newinstance_recvs
                    .entry(p)
                    .or_default()
                    .push((site, mctx));
                if let Some(pts) = ctx.pts(p) {
                    let objs: Vec<ObjId> = pts.iter().collect();
                    self.newinstance_objs(ctx, site, mctx, &objs);
                }
            }
        }
    }

    fn forname_objs(
        &mut self,
        ctx: &mut PluginContext<'_>,
        site: CallSiteId,
        caller_ctx: CtxId,
        objs: &[ObjId],
    ) {
        for &obj in objs {
            if let Some(literal) = ctx.heap.literal(obj) {
                Self::apply_forname(ctx, site, caller_ctx, &literal);
            }
        }
    }

    fn newinstance_objs(
        &mut self,
        ctx: &mut PluginContext<'_>,
        site: CallSiteId,
        caller_ctx: CtxId,
        objs: &[ObjId],
    ) {
        for &obj in objs {
            if let ObjKind::Class(ty) = ctx.heap.obj(obj).kind {
                Self::apply_new_instance(ctx, site, caller_ctx, ty);
            }
        }
    }
}

impl Plugin for ReflectionHandler {
    fn name(&self) -> &'static str {
        "reflection-handler"
    }

    fn on_new_cs_method(
        &mut self,
        ctx: &mut PluginContext<'_>,
        cs_method: CsMethodId,
    ) -> Result<()> {
        if !self.processed.insert(cs_method) {
            return Ok(());
        }
        let (mctx, method) = ctx.cs.method_parts(cs_method);
        let world = ctx.world.clone();
        for stmt in &world.program.method(method).stmts {
            if let Stmt::Invoke(site) = stmt {
                self.scan_site(ctx, *site, mctx);
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
        if let Some(sites) = self.forname_args.get(&pointer) {
            let sites = sites.clone();
            let objs: Vec<ObjId> = delta.iter().collect();
            for (site, caller_ctx) in sites {
                self.forname_objs(ctx, site, caller_ctx, &objs);
            }
        }
        if let Some(sites) = self.newinstance_recvs.get(&pointer) {
            let sites = sites.clone();
            let objs: Vec<ObjId> = delta.iter().collect();
            for (site, caller_ctx) in sites {
                self.newinstance_objs(ctx, site, caller_ctx, &objs);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reflection_log() {
        let text = "# resolved offline\nforName cs1 com.example.Widget\nnewInstance cs2 com.example.Widget\n\n";
        let entries = parse_reflection_log(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, ReflectiveKind::ForName);
        assert_eq!(entries[0].tag, "cs1");
        assert_eq!(entries[1].class_name, "com.example.Widget");
    }

    #[test]
    fn test_parse_reflection_log_rejects_garbage() {
        assert!(matches!(
            parse_reflection_log("forName only-two"),
            Err(PtaError::Config(_))
        ));
        assert!(matches!(
            parse_reflection_log("invoke cs1 X"),
            Err(PtaError::Config(_))
        ));
    }
}
