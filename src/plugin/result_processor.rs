//! Result rendering plugin
//!
//! On finish, renders reachable methods, call-graph edges, and the
//! points-to sets of every pointer kind in deterministic (sorted)
//! order into a shared buffer. Tests use the rendered text to diff the
//! two solver implementations.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::Result;
use crate::plugin::{Plugin, PluginContext};
use crate::solver::result::ReportView;

pub struct ResultProcessor {
    out: Arc<Mutex<String>>,
}

impl ResultProcessor {
    /// The plugin and a shared handle to the buffer it renders into.
    pub fn shared() -> (Self, Arc<Mutex<String>>) {
        let out = Arc::new(Mutex::new(String::new()));
        (Self { out: Arc::clone(&out) }, out)
    }
}

impl Plugin for ResultProcessor {
    fn name(&self) -> &'static str {
        "result-processor"
    }

    fn on_finish(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        let view = ReportView {
            world: ctx.world.as_ref(),
            heap: ctx.heap,
            ctxs: ctx.ctxs,
            cs: ctx.cs,
            pts: ctx.graph,
            call_graph: ctx.call_graph,
        };
        *self.out.lock() = view.render();
        Ok(())
    }
}
