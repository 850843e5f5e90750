//! The flock, its physics world and the per-step orchestration.
//!
//! An executed step always runs in the same order: advance the physics world
//! by the fixed timestep, then (while AI is enabled) walk the flock in spawn
//! order recomputing due headings and applying jitter, smoothing and thrust,
//! then advance the swim animation. Rendering reads [`Simulation::snapshot`]
//! afterwards.

use std::f32::consts::TAU;
use std::ops::Range;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;

use crate::agent::Agent;
use crate::config::SimConfig;
use crate::flocking::{self, FlockMember};
use crate::math::{distance_sq_2d, Vec2};
use crate::neighbor_grid::NeighborGrid;
use crate::physics::{BodyOptions, PhysicsError, PhysicsWorld};
use crate::scheduler::FrameScheduler;

/// Collision radius of every fish body.
pub const FISH_RADIUS: f32 = 16.0;
/// Upper bound on flock size for browser builds.
pub const MAX_POPULATION: usize = 5_000;
/// Number of colour variants the renderer knows about.
pub const PALETTE_SIZE: u8 = 3;

const FISH_RESTITUTION: f32 = 0.5;

/// Errors surfaced by simulation operations.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Physics(#[from] PhysicsError),
    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),
    #[error("no fish at index {0}")]
    UnknownAgent(usize),
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

/// Render hand-off for one fish.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FishSnapshot {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub angle: f32,
    pub swim_phase: f32,
    pub palette: u8,
}

/// Everything the presentation layers need after a step.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    pub step: u64,
    pub width: f32,
    pub height: f32,
    pub ai_enabled: bool,
    pub ripples_enabled: bool,
    pub crt_enabled: bool,
    pub fish: Vec<FishSnapshot>,
}

pub struct Simulation<W: PhysicsWorld> {
    world: W,
    flock: Vec<Agent>,
    config: SimConfig,
    scheduler: FrameScheduler,
    grid: Option<NeighborGrid>,
    rng: SmallRng,
    step_index: u64,
    members: Vec<FlockMember>,
    candidates: Vec<usize>,
}

impl<W: PhysicsWorld> Simulation<W> {
    pub fn new(world: W, config: SimConfig, seed: u64, start_ms: f64) -> Self {
        Self {
            world,
            flock: Vec::new(),
            config: config.sanitized(),
            scheduler: FrameScheduler::new(start_ms),
            grid: None,
            rng: SmallRng::seed_from_u64(seed),
            step_index: 0,
            members: Vec::new(),
            candidates: Vec::new(),
        }
    }

    pub fn flock(&self) -> &[Agent] {
        &self.flock
    }

    pub fn len(&self) -> usize {
        self.flock.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flock.is_empty()
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    /// Spawns `count` fish at random positions and headings. Requests beyond
    /// [`MAX_POPULATION`] are trimmed. Returns the flock indices of the new
    /// fish.
    pub fn spawn(&mut self, count: usize) -> Range<usize> {
        let room = MAX_POPULATION.saturating_sub(self.flock.len());
        if count > room {
            log::warn!(
                "spawn of {count} fish trimmed to {room} (population cap {MAX_POPULATION})"
            );
        }
        let count = count.min(room);
        let (width, height) = self.world.bounds();

        let start = self.flock.len();
        for _ in 0..count {
            let position = (
                self.rng.random_range(0.0..width.max(f32::EPSILON)),
                self.rng.random_range(0.0..height.max(f32::EPSILON)),
            );
            let heading = self.rng.random_range(0.0..TAU);
            self.spawn_at(position, heading);
        }

        if count > 0 {
            log::info!("spawned {count} fish; flock size {}", self.flock.len());
        }
        start..self.flock.len()
    }

    /// Spawns one fish at `position` facing `heading`. Returns its index.
    pub fn spawn_at(&mut self, position: Vec2, heading: f32) -> usize {
        let body = self.world.create_circle(
            position,
            FISH_RADIUS,
            BodyOptions {
                density: self.config.density,
                friction_air: self.config.friction_air,
                restitution: FISH_RESTITUTION,
            },
        );
        let swim_phase = self.rng.random_range(0.0..TAU);
        let palette_index = self.rng.random_range(0..PALETTE_SIZE);
        self.flock.push(Agent::new(
            body,
            heading,
            self.config.agent,
            swim_phase,
            palette_index,
        ));
        self.flock.len() - 1
    }

    /// Replaces the live configuration. Density, air friction and agent
    /// tunables that changed are pushed to every existing fish.
    pub fn set_config(&mut self, config: SimConfig) -> Result<(), SimError> {
        let config = config.sanitized();
        let previous = std::mem::replace(&mut self.config, config);

        if previous.density != self.config.density {
            for agent in &self.flock {
                self.world.set_density(agent.body(), self.config.density)?;
            }
        }
        if previous.friction_air != self.config.friction_air {
            for agent in &self.flock {
                self.world
                    .set_friction_air(agent.body(), self.config.friction_air)?;
            }
        }
        if previous.agent != self.config.agent {
            for agent in &mut self.flock {
                agent.set_params(self.config.agent);
            }
        }
        if !self.config.spatial_index {
            self.grid = None;
        }
        if previous.ai_enabled != self.config.ai_enabled {
            let state = if self.config.ai_enabled {
                "enabled"
            } else {
                "disabled"
            };
            log::info!("flocking AI {state}");
        }

        log::debug!("config updated: {:?}", self.config);
        Ok(())
    }

    pub fn set_bounds(&mut self, width: f32, height: f32) {
        self.world.set_bounds(width, height);
        let (width, height) = self.world.bounds();
        log::debug!("tank resized to {width}x{height}");
    }

    /// One render-callback attempt. Returns whether a step was executed.
    pub fn frame(&mut self, timestamp_ms: f64) -> Result<bool, SimError> {
        if !self.scheduler.should_step(timestamp_ms) {
            return Ok(false);
        }
        self.step(timestamp_ms)?;
        Ok(true)
    }

    /// Executes one simulation step with `now_ms` as the AI clock.
    pub fn step(&mut self, now_ms: f64) -> Result<(), SimError> {
        self.step_index = self.step_index.wrapping_add(1);
        self.world.step(self.scheduler.fixed_timestep_ms());

        if self.config.ai_enabled {
            self.update_flock(now_ms)?;
        }

        for agent in &mut self.flock {
            let speed = self.world.body_state(agent.body())?.speed();
            agent.advance_swim_phase(speed);
        }

        Ok(())
    }

    fn update_flock(&mut self, now_ms: f64) -> Result<(), SimError> {
        self.capture_members()?;

        let grid = if self.config.spatial_index {
            let (width, height) = self.world.bounds();
            let radius = self.config.agent.query_radius();
            let grid = self
                .grid
                .get_or_insert_with(|| NeighborGrid::new(width, height, radius));
            grid.set_cell_size(radius);
            let positions: Vec<Vec2> = self.members.iter().map(|m| m.position).collect();
            grid.rebuild(&positions, width, height);
            Some(&*grid)
        } else {
            None
        };

        for (i, agent) in self.flock.iter_mut().enumerate() {
            let params = *agent.params();
            if flocking::recompute_due(
                agent.last_ai_update_ms(),
                params.ai_update_interval_ms,
                self.config.ai_frequency,
                now_ms,
            ) {
                let steering = match grid {
                    Some(grid) => {
                        self.candidates.clear();
                        let candidates = &mut self.candidates;
                        grid.for_each_candidate(i, params.query_radius(), |j| candidates.push(j));
                        flocking::steering(i, &self.members, &params, candidates.iter().copied())
                    }
                    None => flocking::steering_full_scan(i, &self.members, &params),
                };

                if !agent.record_recompute(steering.heading(), now_ms) {
                    log::warn!("fish {i} produced a non-finite heading; keeping previous target");
                }
            }

            let jitter_unit = self.rng.random::<f32>();
            agent.steer(&mut self.world, self.config.swim_force, jitter_unit)?;
        }

        Ok(())
    }

    fn capture_members(&mut self) -> Result<(), SimError> {
        self.members.clear();
        for agent in &self.flock {
            let state = self.world.body_state(agent.body())?;
            self.members.push(FlockMember {
                position: state.position,
                angle: state.angle,
            });
        }
        Ok(())
    }

    /// Pushes every fish strictly within the click radius away from the
    /// point. Returns how many fish were pushed.
    pub fn apply_click(&mut self, x: f32, y: f32) -> Result<usize, SimError> {
        if !x.is_finite() || !y.is_finite() {
            return Ok(0);
        }

        let radius_sq = self.config.click_radius * self.config.click_radius;
        let gain = self.config.click_force_gain;
        let mut pushed = 0;
        for agent in &self.flock {
            let (fx, fy) = self.world.body_state(agent.body())?.position;
            if distance_sq_2d(fx, fy, x, y) < radius_sq {
                self.world
                    .apply_force(agent.body(), ((fx - x) * gain, (fy - y) * gain))?;
                pushed += 1;
            }
        }

        log::debug!("click at ({x}, {y}) pushed {pushed} fish");
        Ok(pushed)
    }

    /// Crowding around fish `index`: others within 60 units, divided by 5.
    pub fn swarm_density(&mut self, index: usize) -> Result<f32, SimError> {
        if index >= self.flock.len() {
            return Err(SimError::UnknownAgent(index));
        }
        self.capture_members()?;
        Ok(flocking::swarm_density(index, &self.members))
    }

    pub fn snapshot(&self) -> Result<FrameSnapshot, SimError> {
        let (width, height) = self.world.bounds();
        let mut fish = Vec::with_capacity(self.flock.len());
        for agent in &self.flock {
            let state = self.world.body_state(agent.body())?;
            fish.push(FishSnapshot {
                position: [state.position.0, state.position.1],
                velocity: [state.velocity.0, state.velocity.1],
                angle: state.angle,
                swim_phase: agent.swim_phase(),
                palette: agent.palette_index(),
            });
        }

        Ok(FrameSnapshot {
            step: self.step_index,
            width,
            height,
            ai_enabled: self.config.ai_enabled,
            ripples_enabled: self.config.ripples_enabled,
            crt_enabled: self.config.crt_enabled,
            fish,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{SimError, Simulation, FISH_RADIUS, MAX_POPULATION};
    use crate::agent::AgentParams;
    use crate::config::SimConfig;
    use crate::physics::{PhysicsWorld, TankWorld};
    use crate::scheduler::FIXED_TIMESTEP_MS;
    use approx::assert_relative_eq;

    fn quiet_config() -> SimConfig {
        SimConfig {
            agent: AgentParams {
                random_jitter: 0.0,
                ..AgentParams::default()
            },
            ..SimConfig::default()
        }
    }

    fn tank(config: SimConfig) -> Simulation<TankWorld> {
        Simulation::new(TankWorld::new(1_280.0, 720.0), config, 7, 0.0)
    }

    #[test]
    fn spawn_appends_without_disturbing_existing_fish() {
        let mut sim = tank(SimConfig::default());
        sim.spawn(3);
        let before: Vec<_> = sim.flock().iter().map(|a| a.body()).collect();

        let added = sim.spawn(5);
        assert_eq!(added, 3..8);
        assert_eq!(sim.len(), 8);
        let after: Vec<_> = sim.flock().iter().take(3).map(|a| a.body()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn spawn_respects_population_cap() {
        let mut sim = tank(SimConfig::default());
        let added = sim.spawn(MAX_POPULATION + 10);
        assert_eq!(added.len(), MAX_POPULATION);
        assert!(sim.spawn(1).is_empty());
    }

    #[test]
    fn frames_inside_budget_do_not_step() {
        let mut sim = tank(SimConfig::default());
        sim.spawn(2);

        assert!(!sim.frame(8.0).unwrap());
        assert!(sim.frame(16.0).unwrap());
        assert!(!sim.frame(20.0).unwrap());
        assert!(sim.frame(40.0).unwrap());
        assert_eq!(sim.step_index(), 2);
    }

    #[test]
    fn disabled_ai_leaves_bodies_alone() {
        let mut sim = tank(SimConfig {
            ai_enabled: false,
            ..quiet_config()
        });
        sim.spawn_at((100.0, 100.0), 1.0);

        for n in 1..=10 {
            sim.step(f64::from(n) * 16.0).unwrap();
        }

        let state = sim.world().body_state(sim.flock()[0].body()).unwrap();
        assert_eq!(state.position, (100.0, 100.0));
        assert_eq!(state.angle, 0.0);
        assert_eq!(sim.step_index(), 10);
    }

    #[test]
    fn throttled_fish_keep_target_between_recomputes() {
        let mut sim = tank(SimConfig {
            ai_frequency: 1.0,
            ..quiet_config()
        });
        sim.spawn_at((100.0, 100.0), 2.0);
        sim.spawn_at((110.0, 100.0), 0.5);

        sim.step(16.0).unwrap();
        let recomputed = sim.flock()[0].target_heading();
        assert_eq!(sim.flock()[0].last_ai_update_ms(), Some(16.0));

        sim.step(500.0).unwrap();
        sim.step(1_016.0).unwrap();
        assert_eq!(sim.flock()[0].target_heading(), recomputed);
        assert_eq!(sim.flock()[0].last_ai_update_ms(), Some(16.0));

        sim.step(1_017.0).unwrap();
        assert_eq!(sim.flock()[0].last_ai_update_ms(), Some(1_017.0));
    }

    #[test]
    fn swimming_fish_move_along_their_heading() {
        let mut sim = tank(quiet_config());
        sim.spawn_at((640.0, 360.0), 0.0);

        for n in 1..=30 {
            sim.step(f64::from(n) * f64::from(FIXED_TIMESTEP_MS)).unwrap();
        }

        let state = sim.world().body_state(sim.flock()[0].body()).unwrap();
        assert!(state.position.0 > 640.0);
        assert_relative_eq!(state.position.1, 360.0, epsilon = 1.0e-3);
    }

    #[test]
    fn config_changes_reach_existing_fish() {
        let mut sim = tank(SimConfig {
            ai_enabled: false,
            ..quiet_config()
        });
        let veteran = sim.spawn_at((400.0, 360.0), 0.0);

        let tuned = SimConfig {
            agent: AgentParams {
                max_speed: 2.0,
                ..AgentParams::default()
            },
            ai_enabled: false,
            density: 0.01,
            friction_air: 0.3,
            ..SimConfig::default()
        };
        sim.set_config(tuned).unwrap();
        let newcomer = sim.spawn_at((800.0, 360.0), 0.0);
        assert!(sim.flock().iter().all(|a| a.params().max_speed == 2.0));

        let speed = |sim: &Simulation<TankWorld>, i: usize| {
            sim.world()
                .body_state(sim.flock()[i].body())
                .unwrap()
                .speed()
        };

        for i in [veteran, newcomer] {
            let body = sim.flock()[i].body();
            sim.world.apply_force(body, (0.01, 0.0)).unwrap();
        }
        sim.world.step(FIXED_TIMESTEP_MS);

        let mass = 0.01 * std::f32::consts::PI * FISH_RADIUS * FISH_RADIUS;
        let expected = 0.01 / mass * FIXED_TIMESTEP_MS * FIXED_TIMESTEP_MS;
        let pushed = speed(&sim, veteran);
        assert_relative_eq!(pushed, expected, epsilon = 1.0e-5);
        assert_relative_eq!(pushed, speed(&sim, newcomer), epsilon = 1.0e-6);

        sim.world.step(FIXED_TIMESTEP_MS);
        assert_relative_eq!(speed(&sim, veteran), pushed * 0.7, epsilon = 1.0e-5);
    }

    #[test]
    fn huge_tank_builds_and_steps_without_a_grid() {
        let mut sim = Simulation::new(
            TankWorld::new(1.0e7, 1.0e7),
            SimConfig::default(),
            1,
            0.0,
        );
        assert!(sim.grid.is_none());
        sim.spawn(8);
        sim.step(16.0).unwrap();
        assert!(sim.grid.is_none());

        let mut indexed = sim.config().clone();
        indexed.spatial_index = true;
        sim.set_config(indexed).unwrap();
        sim.set_bounds(f32::MAX, f32::MAX);
        sim.step(32.0).unwrap();
        assert!(sim.grid.is_some());
        assert_eq!(sim.snapshot().unwrap().fish.len(), 8);

        let mut plain = sim.config().clone();
        plain.spatial_index = false;
        sim.set_config(plain).unwrap();
        assert!(sim.grid.is_none());
    }

    #[test]
    fn click_pushes_only_nearby_fish() {
        let mut sim = tank(quiet_config());
        let near = sim.spawn_at((150.0, 100.0), 0.0);
        let edge = sim.spawn_at((200.0, 100.0), 0.0);
        let far = sim.spawn_at((600.0, 600.0), 0.0);

        assert_eq!(sim.apply_click(100.0, 100.0).unwrap(), 1);
        sim.world.step(FIXED_TIMESTEP_MS);

        let speed = |i: usize| {
            sim.world()
                .body_state(sim.flock()[i].body())
                .unwrap()
                .speed()
        };
        assert!(speed(near) > 0.0);
        assert_eq!(speed(edge), 0.0);
        assert_eq!(speed(far), 0.0);
    }

    #[test]
    fn swarm_density_rejects_unknown_index() {
        let mut sim = tank(SimConfig::default());
        sim.spawn_at((100.0, 100.0), 0.0);
        sim.spawn_at((130.0, 100.0), 0.0);

        assert_relative_eq!(sim.swarm_density(0).unwrap(), 0.2);
        assert!(matches!(sim.swarm_density(5), Err(SimError::UnknownAgent(5))));
    }

    #[test]
    fn snapshot_reports_every_fish_in_spawn_order() {
        let mut sim = tank(SimConfig {
            crt_enabled: false,
            ..SimConfig::default()
        });
        sim.spawn_at((10.0 + 16.0, 20.0 + 16.0), 0.0);
        sim.spawn_at((300.0, 200.0), 0.0);

        let snapshot = sim.snapshot().unwrap();
        assert_eq!(snapshot.fish.len(), 2);
        assert_eq!(snapshot.fish[0].position, [26.0, 36.0]);
        assert_eq!(snapshot.fish[1].position, [300.0, 200.0]);
        assert!(!snapshot.crt_enabled);
        assert_eq!((snapshot.width, snapshot.height), (1_280.0, 720.0));
    }
}
