//! Wall-time measurement
//!
//! Registered first so the measured span covers every other plugin's
//! work; adds no constraints.

use std::time::{Duration, Instant};

use tracing::info;

use crate::errors::Result;
use crate::plugin::{Plugin, PluginContext};

#[derive(Default)]
pub struct AnalysisTimer {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

impl AnalysisTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }
}

impl Plugin for AnalysisTimer {
    fn name(&self) -> &'static str {
        "analysis-timer"
    }

    fn on_start(&mut self, _ctx: &mut PluginContext<'_>) -> Result<()> {
        self.started = Some(Instant::now());
        Ok(())
    }

    fn on_finish(&mut self, _ctx: &mut PluginContext<'_>) -> Result<()> {
        if let Some(started) = self.started {
            let elapsed = started.elapsed();
            self.elapsed = Some(elapsed);
            info!(elapsed_ms = elapsed.as_millis() as u64, "pointer analysis elapsed time");
        }
        Ok(())
    }
}
