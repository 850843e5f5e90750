//! Separation, alignment and cohesion over a captured flock.
//!
//! Every rule reads a [`FlockMember`] slice captured once per AI pass, so
//! headings written earlier in the pass never leak into later neighbours'
//! alignment. Radius tests are strict: an agent exactly on a boundary is not
//! a neighbour.

use crate::agent::AgentParams;
use crate::math::{add, distance_sq_2d, scale, unit_heading, Vec2};

/// Fraction of the centroid offset cohesion pulls with.
pub const COHESION_GAIN: f32 = 0.05;
/// Radius used by the crowding metric exposed to presentation layers.
pub const CROWDING_RADIUS: f32 = 60.0;
/// Neighbour count at which the crowding metric reads 1.0.
pub const CROWDING_NORMALIZER: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlockMember {
    pub position: Vec2,
    pub angle: f32,
}

/// The three steering vectors for one agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Steering {
    pub separation: Vec2,
    pub alignment: Vec2,
    pub cohesion: Vec2,
}

impl Steering {
    /// Unit-weight sum of the three rules.
    pub fn combined(&self) -> Vec2 {
        add(add(self.separation, self.alignment), self.cohesion)
    }

    pub fn heading(&self) -> f32 {
        let (x, y) = self.combined();
        y.atan2(x)
    }
}

/// Computes the steering vectors for `members[index]`, looking only at the
/// indices yielded by `candidates`. Pass `0..members.len()` for a full scan.
pub fn steering<I>(
    index: usize,
    members: &[FlockMember],
    params: &AgentParams,
    candidates: I,
) -> Steering
where
    I: IntoIterator<Item = usize>,
{
    let me = members[index];
    let (px, py) = me.position;
    let separation_radius = params.separation_radius;
    let separation_radius_sq = separation_radius * separation_radius;
    let neighbor_radius_sq = params.neighbor_radius * params.neighbor_radius;

    let mut sep_x = 0.0;
    let mut sep_y = 0.0;
    let mut sep_count = 0usize;

    let mut align_x = 0.0;
    let mut align_y = 0.0;

    let mut centre_x = 0.0;
    let mut centre_y = 0.0;

    let mut neighbor_count = 0usize;

    for j in candidates {
        if j == index {
            continue;
        }
        let Some(other) = members.get(j) else {
            continue;
        };
        let (ox, oy) = other.position;
        let dist_sq = distance_sq_2d(px, py, ox, oy);

        if dist_sq < separation_radius_sq {
            let repel = 1.0 - dist_sq.sqrt() / separation_radius;
            sep_x += (px - ox) * repel;
            sep_y += (py - oy) * repel;
            sep_count += 1;
        }

        if dist_sq < neighbor_radius_sq {
            let (hx, hy) = unit_heading(other.angle);
            align_x += hx;
            align_y += hy;
            centre_x += ox;
            centre_y += oy;
            neighbor_count += 1;
        }
    }

    let separation = if sep_count > 0 {
        let n = sep_count as f32;
        (sep_x / n, sep_y / n)
    } else {
        (0.0, 0.0)
    };

    let (alignment, cohesion) = if neighbor_count > 0 {
        let n = neighbor_count as f32;
        let centroid = (centre_x / n, centre_y / n);
        (
            (align_x / n, align_y / n),
            scale((centroid.0 - px, centroid.1 - py), COHESION_GAIN),
        )
    } else {
        (unit_heading(me.angle), (0.0, 0.0))
    };

    Steering {
        separation,
        alignment,
        cohesion,
    }
}

/// Full O(n) scan for one agent.
pub fn steering_full_scan(
    index: usize,
    members: &[FlockMember],
    params: &AgentParams,
) -> Steering {
    steering(index, members, params, 0..members.len())
}

/// True once more than `interval_ms * frequency` has elapsed since the last
/// recompute. Agents that never recomputed are always due.
pub fn recompute_due(
    last_update_ms: Option<f64>,
    interval_ms: f32,
    frequency: f32,
    now_ms: f64,
) -> bool {
    match last_update_ms {
        None => true,
        Some(last) => now_ms - last > f64::from(interval_ms) * f64::from(frequency),
    }
}

/// Others strictly within [`CROWDING_RADIUS`], scaled so five neighbours read 1.0.
pub fn swarm_density(index: usize, members: &[FlockMember]) -> f32 {
    let Some(me) = members.get(index) else {
        return 0.0;
    };
    let radius_sq = CROWDING_RADIUS * CROWDING_RADIUS;
    let nearby = members
        .iter()
        .enumerate()
        .filter(|(j, other)| {
            *j != index
                && distance_sq_2d(me.position.0, me.position.1, other.position.0, other.position.1)
                    < radius_sq
        })
        .count();
    nearby as f32 / CROWDING_NORMALIZER
}
