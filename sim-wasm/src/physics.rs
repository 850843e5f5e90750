//! Rigid-body world the fish swim in.
//!
//! [`PhysicsWorld`] is the contract the flock relies on: create circular
//! bodies, push them around with forces, steer their angle and read back
//! where they ended up. [`TankWorld`] is the bundled implementation, a
//! slot-map arena of circles integrated with a fixed delta and kept inside a
//! rectangular tank.
//!
//! Fish bodies sit in a collision category their own mask excludes, so
//! bodies never touch each other and no contact solver exists here.

use std::f32::consts::PI;

use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::math::{clamp_finite, is_finite_vec, Vec2};

new_key_type! {
    /// Stable handle for bodies owned by a physics world.
    pub struct BodyHandle;
}

/// Step length the air-friction coefficient is expressed against.
pub const BASE_DELTA_MS: f32 = 1000.0 / 60.0;

const MIN_RADIUS: f32 = 0.5;
const MIN_DENSITY: f32 = 1.0e-6;
const MIN_EXTENT: f32 = 1.0;

/// Errors raised by physics world operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhysicsError {
    /// The handle does not name a live body in this world.
    #[error("unknown body handle {0:?}")]
    UnknownBody(BodyHandle),
}

/// Material settings for a new body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyOptions {
    pub density: f32,
    pub friction_air: f32,
    pub restitution: f32,
}

impl Default for BodyOptions {
    fn default() -> Self {
        Self {
            density: 0.005,
            friction_air: 0.12,
            restitution: 0.5,
        }
    }
}

/// Read-only view of a body after the last step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    pub position: Vec2,
    /// Displacement per base step, the unit speed caps are expressed in.
    pub velocity: Vec2,
    pub angle: f32,
}

impl BodyState {
    pub fn speed(&self) -> f32 {
        crate::math::magnitude(self.velocity.0, self.velocity.1)
    }
}

/// Operations the simulation issues against the physics engine.
pub trait PhysicsWorld {
    fn create_circle(&mut self, position: Vec2, radius: f32, options: BodyOptions) -> BodyHandle;

    /// Accumulates `force` on the body until the next [`PhysicsWorld::step`].
    fn apply_force(&mut self, handle: BodyHandle, force: Vec2) -> Result<(), PhysicsError>;

    fn set_angle(&mut self, handle: BodyHandle, angle: f32) -> Result<(), PhysicsError>;

    fn set_density(&mut self, handle: BodyHandle, density: f32) -> Result<(), PhysicsError>;

    fn set_friction_air(&mut self, handle: BodyHandle, friction_air: f32)
        -> Result<(), PhysicsError>;

    fn body_state(&self, handle: BodyHandle) -> Result<BodyState, PhysicsError>;

    /// Advances every body by `delta_ms` and clears accumulated forces.
    fn step(&mut self, delta_ms: f32);

    fn set_bounds(&mut self, width: f32, height: f32);

    fn bounds(&self) -> (f32, f32);
}

#[derive(Clone, Debug)]
struct Body {
    position: Vec2,
    velocity: Vec2,
    angle: f32,
    radius: f32,
    inverse_mass: f32,
    friction_air: f32,
    restitution: f32,
    force: Vec2,
}

impl Body {
    fn new(position: Vec2, radius: f32, options: BodyOptions) -> Self {
        let radius = clamp_finite(radius, MIN_RADIUS, f32::MAX, MIN_RADIUS);
        Self {
            position,
            velocity: (0.0, 0.0),
            angle: 0.0,
            radius,
            inverse_mass: inverse_mass(options.density, radius),
            friction_air: clamp_finite(options.friction_air, 0.0, 1.0, 0.12),
            restitution: clamp_finite(options.restitution, 0.0, 1.0, 0.5),
            force: (0.0, 0.0),
        }
    }

    fn integrate(&mut self, delta_ms: f32) {
        let time_ratio = delta_ms / BASE_DELTA_MS;
        let damping = (1.0 - self.friction_air * time_ratio).max(0.0);
        let delta_sq = delta_ms * delta_ms;

        self.velocity.0 = self.velocity.0 * damping + self.force.0 * self.inverse_mass * delta_sq;
        self.velocity.1 = self.velocity.1 * damping + self.force.1 * self.inverse_mass * delta_sq;
        self.position.0 += self.velocity.0 * time_ratio;
        self.position.1 += self.velocity.1 * time_ratio;
        self.force = (0.0, 0.0);
    }
}

fn inverse_mass(density: f32, radius: f32) -> f32 {
    let density = clamp_finite(density, MIN_DENSITY, f32::MAX, 0.005);
    1.0 / (density * PI * radius * radius)
}

/// Keeps a body inside `[0, extent]` on one axis, bouncing it off the wall
/// it crossed with the body's restitution.
fn reflect_axis(
    position: f32,
    velocity: f32,
    radius: f32,
    extent: f32,
    restitution: f32,
) -> (f32, f32) {
    if extent <= radius * 2.0 {
        return (extent * 0.5, 0.0);
    }

    if position - radius < 0.0 {
        let velocity = if velocity < 0.0 {
            -velocity * restitution
        } else {
            velocity
        };
        (radius, velocity)
    } else if position + radius > extent {
        let velocity = if velocity > 0.0 {
            -velocity * restitution
        } else {
            velocity
        };
        (extent - radius, velocity)
    } else {
        (position, velocity)
    }
}

/// Zero-gravity tank of circular bodies.
pub struct TankWorld {
    bodies: SlotMap<BodyHandle, Body>,
    width: f32,
    height: f32,
}

impl TankWorld {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            bodies: SlotMap::with_key(),
            width: clamp_finite(width, MIN_EXTENT, f32::MAX, MIN_EXTENT),
            height: clamp_finite(height, MIN_EXTENT, f32::MAX, MIN_EXTENT),
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut Body, PhysicsError> {
        self.bodies
            .get_mut(handle)
            .ok_or(PhysicsError::UnknownBody(handle))
    }
}

impl PhysicsWorld for TankWorld {
    fn create_circle(&mut self, position: Vec2, radius: f32, options: BodyOptions) -> BodyHandle {
        self.bodies.insert(Body::new(position, radius, options))
    }

    fn apply_force(&mut self, handle: BodyHandle, force: Vec2) -> Result<(), PhysicsError> {
        let body = self.body_mut(handle)?;
        if is_finite_vec(force) {
            body.force.0 += force.0;
            body.force.1 += force.1;
        }
        Ok(())
    }

    fn set_angle(&mut self, handle: BodyHandle, angle: f32) -> Result<(), PhysicsError> {
        let body = self.body_mut(handle)?;
        if angle.is_finite() {
            body.angle = angle;
        }
        Ok(())
    }

    fn set_density(&mut self, handle: BodyHandle, density: f32) -> Result<(), PhysicsError> {
        let body = self.body_mut(handle)?;
        body.inverse_mass = inverse_mass(density, body.radius);
        Ok(())
    }

    fn set_friction_air(
        &mut self,
        handle: BodyHandle,
        friction_air: f32,
    ) -> Result<(), PhysicsError> {
        let body = self.body_mut(handle)?;
        body.friction_air = clamp_finite(friction_air, 0.0, 1.0, body.friction_air);
        Ok(())
    }

    fn body_state(&self, handle: BodyHandle) -> Result<BodyState, PhysicsError> {
        let body = self
            .bodies
            .get(handle)
            .ok_or(PhysicsError::UnknownBody(handle))?;
        Ok(BodyState {
            position: body.position,
            velocity: body.velocity,
            angle: body.angle,
        })
    }

    fn step(&mut self, delta_ms: f32) {
        if !delta_ms.is_finite() || delta_ms <= 0.0 {
            return;
        }

        let (width, height) = (self.width, self.height);
        for body in self.bodies.values_mut() {
            body.integrate(delta_ms);

            let (x, vx) = reflect_axis(
                body.position.0,
                body.velocity.0,
                body.radius,
                width,
                body.restitution,
            );
            let (y, vy) = reflect_axis(
                body.position.1,
                body.velocity.1,
                body.radius,
                height,
                body.restitution,
            );
            body.position = (x, y);
            body.velocity = (vx, vy);
        }
    }

    fn set_bounds(&mut self, width: f32, height: f32) {
        self.width = clamp_finite(width, MIN_EXTENT, f32::MAX, self.width);
        self.height = clamp_finite(height, MIN_EXTENT, f32::MAX, self.height);
    }

    fn bounds(&self) -> (f32, f32) {
        (self.width, self.height)
    }
}
