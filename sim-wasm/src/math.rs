use std::f32::consts::TAU;

pub type Vec2 = (f32, f32);

pub fn distance_sq_2d(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = ax - bx;
    let dy = ay - by;
    dx * dx + dy * dy
}

pub fn magnitude(x: f32, y: f32) -> f32 {
    (x * x + y * y).sqrt()
}

pub fn unit_heading(angle: f32) -> Vec2 {
    (angle.cos(), angle.sin())
}

pub fn add(a: Vec2, b: Vec2) -> Vec2 {
    (a.0 + b.0, a.1 + b.1)
}

pub fn scale(v: Vec2, factor: f32) -> Vec2 {
    (v.0 * factor, v.1 * factor)
}

pub fn is_finite_vec(v: Vec2) -> bool {
    v.0.is_finite() && v.1.is_finite()
}

pub fn wrap_phase(phase: f32) -> f32 {
    if !phase.is_finite() {
        return 0.0;
    }
    phase.rem_euclid(TAU)
}

/// Clamps `value` into `[min, max]`, substituting `fallback` for NaN and
/// infinities before clamping.
pub fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if !value.is_finite() {
        return fallback.clamp(min, max);
    }
    value.clamp(min, max)
}
