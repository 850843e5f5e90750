/// Minimum wall time between executed steps (~60 Hz).
pub const FRAME_BUDGET_MS: f64 = 16.0;
/// Delta every executed step hands the physics world, regardless of how
/// much wall time actually passed.
pub const FIXED_TIMESTEP_MS: f32 = 1000.0 / 60.0;

/// Gates display-rate frame callbacks down to fixed simulation steps.
#[derive(Clone, Debug)]
pub struct FrameScheduler {
    frame_budget_ms: f64,
    fixed_timestep_ms: f32,
    last_step_ms: f64,
}

impl FrameScheduler {
    pub fn new(start_ms: f64) -> Self {
        Self::with_budget(start_ms, FRAME_BUDGET_MS, FIXED_TIMESTEP_MS)
    }

    pub fn with_budget(start_ms: f64, frame_budget_ms: f64, fixed_timestep_ms: f32) -> Self {
        Self {
            frame_budget_ms: if frame_budget_ms.is_finite() {
                frame_budget_ms.max(0.0)
            } else {
                FRAME_BUDGET_MS
            },
            fixed_timestep_ms: if fixed_timestep_ms.is_finite() && fixed_timestep_ms > 0.0 {
                fixed_timestep_ms
            } else {
                FIXED_TIMESTEP_MS
            },
            last_step_ms: if start_ms.is_finite() { start_ms } else { 0.0 },
        }
    }

    /// Returns true when a step should run for the frame at `timestamp_ms`,
    /// and records it as the last executed step.
    pub fn should_step(&mut self, timestamp_ms: f64) -> bool {
        if !timestamp_ms.is_finite() {
            return false;
        }
        if timestamp_ms - self.last_step_ms >= self.frame_budget_ms {
            self.last_step_ms = timestamp_ms;
            true
        } else {
            false
        }
    }

    pub fn fixed_timestep_ms(&self) -> f32 {
        self.fixed_timestep_ms
    }

    pub fn last_step_ms(&self) -> f64 {
        self.last_step_ms
    }
}
