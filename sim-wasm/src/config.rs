use serde::{Deserialize, Serialize};

use crate::agent::AgentParams;
use crate::math::clamp_finite;

pub const MIN_AI_FREQUENCY: f32 = 0.01;
pub const MAX_AI_FREQUENCY: f32 = 10.0;
pub const MAX_SWIM_FORCE: f32 = 1.0;
pub const MIN_DENSITY: f32 = 0.0001;
pub const MAX_DENSITY: f32 = 1.0;
pub const MAX_FRICTION_AIR: f32 = 1.0;
pub const MAX_CLICK_RADIUS: f32 = 2_000.0;
pub const MAX_CLICK_FORCE_GAIN: f32 = 1.0;

/// Live tunables the host may change between frames.
///
/// A snapshot of this struct is read by every step, so a change made by the
/// host takes effect on the next executed step and never mid-step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimConfig {
    pub ai_enabled: bool,
    /// Multiplier on each agent's recompute interval; lower is snappier.
    pub ai_frequency: f32,
    pub swim_force: f32,
    pub density: f32,
    pub friction_air: f32,
    /// Use the bucket grid instead of a full scan when gathering neighbours.
    pub spatial_index: bool,
    pub click_radius: f32,
    pub click_force_gain: f32,
    // Presentation toggles, passed through to the render snapshot.
    pub ripples_enabled: bool,
    pub crt_enabled: bool,
    /// Tunables bulk-applied to every fish when they change.
    pub agent: AgentParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ai_enabled: true,
            ai_frequency: 0.3,
            swim_force: 0.01,
            density: 0.005,
            friction_air: 0.12,
            spatial_index: false,
            click_radius: 100.0,
            click_force_gain: 0.05,
            ripples_enabled: true,
            crt_enabled: true,
            agent: AgentParams::default(),
        }
    }
}

impl SimConfig {
    pub fn sanitize(&mut self) {
        self.ai_frequency =
            clamp_finite(self.ai_frequency, MIN_AI_FREQUENCY, MAX_AI_FREQUENCY, 0.3);
        self.swim_force = clamp_finite(self.swim_force, 0.0, MAX_SWIM_FORCE, 0.01);
        self.density = clamp_finite(self.density, MIN_DENSITY, MAX_DENSITY, 0.005);
        self.friction_air = clamp_finite(self.friction_air, 0.0, MAX_FRICTION_AIR, 0.12);
        self.click_radius = clamp_finite(self.click_radius, 0.0, MAX_CLICK_RADIUS, 100.0);
        self.click_force_gain =
            clamp_finite(self.click_force_gain, 0.0, MAX_CLICK_FORCE_GAIN, 0.05);
        self.agent.sanitize();
    }

    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }
}
