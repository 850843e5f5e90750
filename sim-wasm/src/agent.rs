use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::math::{clamp_finite, scale, unit_heading, wrap_phase};
use crate::physics::{BodyHandle, PhysicsError, PhysicsWorld};

pub const MIN_RADIUS: f32 = 1.0;
pub const MAX_RADIUS: f32 = 2_000.0;
pub const MIN_AI_INTERVAL_MS: f32 = 1.0;
pub const MAX_AI_INTERVAL_MS: f32 = 60_000.0;
pub const MAX_SPEED_LIMIT: f32 = 50.0;
pub const MIN_TURN_SMOOTHNESS: f32 = 0.001;
pub const MAX_TURN_SMOOTHNESS: f32 = 1.0;

const SWIM_PHASE_RATE: f32 = 0.1;
const SWIM_PHASE_SPEED_GAIN: f32 = 0.2;

/// Behavioural tunables carried by every fish.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentParams {
    pub ai_update_interval_ms: f32,
    pub max_speed: f32,
    pub turn_smoothness: f32,
    pub neighbor_radius: f32,
    pub separation_radius: f32,
    pub random_jitter: f32,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            ai_update_interval_ms: 1_000.0,
            max_speed: 0.8,
            turn_smoothness: 0.1,
            neighbor_radius: 80.0,
            separation_radius: 30.0,
            random_jitter: 0.1,
        }
    }
}

impl AgentParams {
    pub fn sanitize(&mut self) {
        self.ai_update_interval_ms = clamp_finite(
            self.ai_update_interval_ms,
            MIN_AI_INTERVAL_MS,
            MAX_AI_INTERVAL_MS,
            1_000.0,
        );
        self.max_speed = clamp_finite(self.max_speed, 0.0, MAX_SPEED_LIMIT, 0.8);
        self.turn_smoothness = clamp_finite(
            self.turn_smoothness,
            MIN_TURN_SMOOTHNESS,
            MAX_TURN_SMOOTHNESS,
            0.1,
        );
        self.neighbor_radius = clamp_finite(self.neighbor_radius, MIN_RADIUS, MAX_RADIUS, 80.0);
        self.separation_radius =
            clamp_finite(self.separation_radius, MIN_RADIUS, MAX_RADIUS, 30.0);
        self.random_jitter = clamp_finite(self.random_jitter, 0.0, TAU, 0.1);
    }

    /// Widest radius any flocking rule looks at.
    pub fn query_radius(&self) -> f32 {
        self.neighbor_radius.max(self.separation_radius)
    }
}

/// First-order low-pass from `current` toward `target`.
pub fn smooth_heading(current: f32, target: f32, smoothness: f32) -> f32 {
    current + (target - current) * smoothness
}

/// Outcome of one controller tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SteerOutcome {
    pub angle: f32,
    pub thrust_applied: bool,
}

/// One fish: a physics body plus the state its flocking AI keeps.
#[derive(Clone, Debug)]
pub struct Agent {
    body: BodyHandle,
    target_heading: f32,
    last_ai_update_ms: Option<f64>,
    params: AgentParams,
    swim_phase: f32,
    palette_index: u8,
}

impl Agent {
    pub fn new(
        body: BodyHandle,
        heading: f32,
        params: AgentParams,
        swim_phase: f32,
        palette_index: u8,
    ) -> Self {
        let mut params = params;
        params.sanitize();
        Self {
            body,
            target_heading: if heading.is_finite() { heading } else { 0.0 },
            last_ai_update_ms: None,
            params,
            swim_phase: wrap_phase(swim_phase),
            palette_index,
        }
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn target_heading(&self) -> f32 {
        self.target_heading
    }

    pub fn last_ai_update_ms(&self) -> Option<f64> {
        self.last_ai_update_ms
    }

    pub fn params(&self) -> &AgentParams {
        &self.params
    }

    pub fn swim_phase(&self) -> f32 {
        self.swim_phase
    }

    pub fn palette_index(&self) -> u8 {
        self.palette_index
    }

    pub fn set_params(&mut self, params: AgentParams) {
        self.params = params;
        self.params.sanitize();
    }

    /// Stores a freshly computed heading. Non-finite headings keep the old
    /// target but still restart the throttle.
    pub fn record_recompute(&mut self, heading: f32, now_ms: f64) -> bool {
        self.last_ai_update_ms = Some(now_ms);
        if heading.is_finite() {
            self.target_heading = heading;
            true
        } else {
            false
        }
    }

    /// Nudges the target by `(unit - 0.5) * random_jitter`, `unit` in `[0, 1)`.
    pub fn apply_jitter(&mut self, unit: f32) {
        let nudge = (unit - 0.5) * self.params.random_jitter;
        if nudge.is_finite() {
            self.target_heading += nudge;
        }
    }

    /// Jitters the target, eases the body angle toward it and thrusts
    /// forward while the body is below its speed cap.
    pub fn steer<W: PhysicsWorld>(
        &mut self,
        world: &mut W,
        swim_force: f32,
        jitter_unit: f32,
    ) -> Result<SteerOutcome, PhysicsError> {
        self.apply_jitter(jitter_unit);

        let state = world.body_state(self.body)?;
        let mut angle =
            smooth_heading(state.angle, self.target_heading, self.params.turn_smoothness);
        if angle.is_finite() {
            world.set_angle(self.body, angle)?;
        } else {
            log::warn!(
                "discarding non-finite heading for body {:?}; holding angle {}",
                self.body,
                state.angle
            );
            self.target_heading = state.angle;
            angle = state.angle;
        }

        let thrust_applied = state.speed() < self.params.max_speed;
        if thrust_applied {
            world.apply_force(self.body, scale(unit_heading(angle), swim_force))?;
        }

        Ok(SteerOutcome {
            angle,
            thrust_applied,
        })
    }

    pub fn advance_swim_phase(&mut self, speed: f32) {
        let speed = if speed.is_finite() { speed } else { 0.0 };
        self.swim_phase =
            wrap_phase(self.swim_phase + SWIM_PHASE_RATE + speed * SWIM_PHASE_SPEED_GAIN);
    }
}

#[cfg(test)]
mod tests {
    use super::{smooth_heading, Agent, AgentParams};
    use crate::physics::{BodyOptions, PhysicsWorld, TankWorld, BASE_DELTA_MS};
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn calm_params() -> AgentParams {
        AgentParams {
            random_jitter: 0.0,
            ..AgentParams::default()
        }
    }

    fn frictionless_fish(world: &mut TankWorld, heading: f32, params: AgentParams) -> Agent {
        let body = world.create_circle(
            (500.0, 500.0),
            16.0,
            BodyOptions {
                friction_air: 0.0,
                ..BodyOptions::default()
            },
        );
        Agent::new(body, heading, params, 0.0, 0)
    }

    #[rstest]
    #[case(0.0, 1.0, 0.1, 0.1)]
    #[case(1.0, 0.0, 0.5, 0.5)]
    #[case(-1.0, 1.0, 1.0, 1.0)]
    fn smoothing_moves_a_fraction_of_the_gap(
        #[case] current: f32,
        #[case] target: f32,
        #[case] smoothness: f32,
        #[case] expected: f32,
    ) {
        assert_relative_eq!(smooth_heading(current, target, smoothness), expected);
    }

    #[test]
    fn smoothing_is_idempotent_on_target() {
        assert_eq!(smooth_heading(0.75, 0.75, 0.1), 0.75);

        let mut world = TankWorld::new(1_000.0, 1_000.0);
        let mut fish = frictionless_fish(&mut world, 0.0, calm_params());
        world.set_angle(fish.body(), 0.0).unwrap();

        let outcome = fish.steer(&mut world, 0.0, 0.5).unwrap();
        assert_eq!(outcome.angle, 0.0);
        assert_eq!(world.body_state(fish.body()).unwrap().angle, 0.0);
    }

    #[test]
    fn jitter_is_symmetric_around_zero() {
        let mut world = TankWorld::new(1_000.0, 1_000.0);
        let mut fish = frictionless_fish(&mut world, 1.0, AgentParams::default());

        fish.apply_jitter(0.5);
        assert_eq!(fish.target_heading(), 1.0);

        fish.apply_jitter(0.0);
        assert_relative_eq!(fish.target_heading(), 0.95);

        fish.apply_jitter(1.0);
        assert_relative_eq!(fish.target_heading(), 1.0);
    }

    #[test]
    fn angle_eases_toward_target() {
        let mut world = TankWorld::new(1_000.0, 1_000.0);
        let mut fish = frictionless_fish(&mut world, 1.0, calm_params());

        let outcome = fish.steer(&mut world, 0.01, 0.5).unwrap();
        assert_relative_eq!(outcome.angle, 0.1);
        assert_relative_eq!(world.body_state(fish.body()).unwrap().angle, 0.1);
    }

    #[test]
    fn governor_stops_thrust_at_max_speed() {
        let mut world = TankWorld::new(10_000.0, 10_000.0);
        let mut fish = frictionless_fish(&mut world, 0.0, calm_params());
        let max_speed = fish.params().max_speed;

        let mut thrusting_steps = 0;
        for _ in 0..20 {
            let before = world.body_state(fish.body()).unwrap().speed();
            let outcome = fish.steer(&mut world, 0.001, 0.5).unwrap();
            assert_eq!(outcome.thrust_applied, before < max_speed);
            if outcome.thrust_applied {
                thrusting_steps += 1;
            }
            world.step(BASE_DELTA_MS);
        }

        assert!(thrusting_steps > 0);
        assert!(thrusting_steps < 20);
        let final_speed = world.body_state(fish.body()).unwrap().speed();
        assert!(final_speed >= max_speed);
    }

    #[test]
    fn recompute_keeps_old_target_on_nan() {
        let mut world = TankWorld::new(1_000.0, 1_000.0);
        let mut fish = frictionless_fish(&mut world, 0.3, calm_params());

        assert!(!fish.record_recompute(f32::NAN, 42.0));
        assert_eq!(fish.target_heading(), 0.3);
        assert_eq!(fish.last_ai_update_ms(), Some(42.0));

        assert!(fish.record_recompute(1.2, 50.0));
        assert_eq!(fish.target_heading(), 1.2);
    }

    #[test]
    fn sanitize_clamps_bad_params() {
        let mut params = AgentParams {
            ai_update_interval_ms: -5.0,
            max_speed: f32::NAN,
            turn_smoothness: 7.0,
            neighbor_radius: -80.0,
            separation_radius: f32::INFINITY,
            random_jitter: -1.0,
        };
        params.sanitize();

        assert_eq!(params.ai_update_interval_ms, super::MIN_AI_INTERVAL_MS);
        assert_eq!(params.max_speed, 0.8);
        assert_eq!(params.turn_smoothness, 1.0);
        assert_eq!(params.neighbor_radius, super::MIN_RADIUS);
        assert_eq!(params.separation_radius, 30.0);
        assert_eq!(params.random_jitter, 0.0);
    }

    #[test]
    fn swim_phase_stays_within_one_turn() {
        let mut world = TankWorld::new(1_000.0, 1_000.0);
        let mut fish = frictionless_fish(&mut world, 0.0, calm_params());
        for _ in 0..1_000 {
            fish.advance_swim_phase(3.0);
            assert!((0.0..std::f32::consts::TAU).contains(&fish.swim_phase()));
        }
    }
}
