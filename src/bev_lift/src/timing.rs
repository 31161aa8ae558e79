//! Stage timing for the forward pass.
//!
//! Collection is active with the `profiling` feature. Without it the
//! collector and [`time_phase!`](crate::time_phase) compile to no-ops and
//! every reported duration is zero.

use serde::{Deserialize, Serialize};
#[cfg(feature = "profiling")]
use std::time::Instant;

/// Wall-clock breakdown of one `forward` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardTiming {
    pub total_ms: f64,
    /// Frustum to ego-frame points
    pub unproject_ms: f64,
    /// Rank computation, sort and interval detection
    pub plan_ms: f64,
    /// Depth weight production
    pub depth_ms: f64,
    /// Reduction into the BEV grid
    pub pool_ms: f64,
    pub cost_volume_ms: f64,
}

/// Wall-clock timer for one phase.
#[cfg(feature = "profiling")]
pub struct Timer {
    start: Instant,
}

#[cfg(feature = "profiling")]
impl Timer {
    #[inline]
    pub fn new(_phase: &'static str) -> Self {
        Self {
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// No-op timer when profiling is disabled.
#[cfg(not(feature = "profiling"))]
pub struct Timer;

#[cfg(not(feature = "profiling"))]
impl Timer {
    #[inline(always)]
    pub fn new(_phase: &'static str) -> Self {
        Self
    }

    #[inline(always)]
    pub fn elapsed_ms(&self) -> f64 {
        0.0
    }
}

/// Accumulates stage durations across one forward pass.
#[cfg(feature = "profiling")]
#[derive(Debug, Default)]
pub struct TimingCollector {
    forward_start: Option<Instant>,
    timing: ForwardTiming,
}

#[cfg(feature = "profiling")]
impl TimingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_forward(&mut self) {
        self.forward_start = Some(Instant::now());
        self.timing = ForwardTiming::default();
    }

    pub fn record_phase(&mut self, phase: &str, duration_ms: f64) {
        let slot = match phase {
            "unproject" => &mut self.timing.unproject_ms,
            "plan" => &mut self.timing.plan_ms,
            "depth" => &mut self.timing.depth_ms,
            "pool" => &mut self.timing.pool_ms,
            "cost_volume" => &mut self.timing.cost_volume_ms,
            _ => return,
        };
        *slot += duration_ms;
    }

    pub fn finish(&mut self) -> ForwardTiming {
        self.timing.total_ms = self
            .forward_start
            .take()
            .map(|s| s.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        std::mem::take(&mut self.timing)
    }
}

/// No-op collector when profiling is disabled.
#[cfg(not(feature = "profiling"))]
#[derive(Debug, Default)]
pub struct TimingCollector;

#[cfg(not(feature = "profiling"))]
impl TimingCollector {
    #[inline(always)]
    pub fn new() -> Self {
        Self
    }

    #[inline(always)]
    pub fn start_forward(&mut self) {}

    #[inline(always)]
    pub fn record_phase(&mut self, _phase: &str, _duration_ms: f64) {}

    #[inline(always)]
    pub fn finish(&mut self) -> ForwardTiming {
        ForwardTiming::default()
    }
}

/// Time a block and record it under `phase`.
///
/// ```ignore
/// let plan = time_phase!(collector, "plan", { prepare_plan(&points, &grid)? });
/// ```
#[macro_export]
macro_rules! time_phase {
    ($collector:expr, $phase:expr, $block:expr) => {{
        #[cfg(feature = "profiling")]
        let _timer = $crate::timing::Timer::new($phase);

        let result = $block;

        #[cfg(feature = "profiling")]
        $collector.record_phase($phase, _timer.elapsed_ms());

        result
    }};
}
