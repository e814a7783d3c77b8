//! Observation building from the external simulation's state.
//!
//! The training loop does not run physics. Each tick the driver exposes the
//! agents' bodies through [`Environment`], and the goal and obstacles
//! through [`TickContext`]. This module turns that into the 12-value
//! [`Observation`] an agent acts on.

use geo::algorithm::Distance;
use geo::{Euclidean, Point};
use serde::{Deserialize, Serialize};

use super::agent::{Action, Observation};
use super::brain::OBSERVATION_SIZE;

/// Radius within which obstacles are perceived.
pub const DETECTION_RADIUS: f32 = 200.0;
/// Number of nearby obstacles included in an observation.
pub const MAX_PERCEIVED_OBSTACLES: usize = 3;

/// Kinematic state of an agent's body, as reported by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyState {
    /// Position in world units.
    pub position: [f32; 2],
    /// Velocity in world units per tick.
    pub velocity: [f32; 2],
    /// Whether the body is off the ground.
    pub airborne: bool,
    /// Whether the body is still in play. `false` kills the agent.
    pub alive: bool,
}

/// World state shared by all agents for one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    /// Goal position.
    pub goal: [f32; 2],
    /// Candidate obstacle positions, in the simulation's order.
    pub obstacles: &'a [[f32; 2]],
}

/// The driver side of the simulation: body state in, actions out.
///
/// Agents are addressed by their index in the population.
pub trait Environment {
    /// Error reported by the simulation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Current state of the body driven by agent `index`.
    fn body(&self, index: usize) -> Result<BodyState, Self::Error>;

    /// Applies an action to the body driven by agent `index`.
    fn apply_action(&mut self, index: usize, action: Action) -> Result<(), Self::Error>;
}

/// Euclidean distance between two points.
pub fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    Euclidean.distance(Point::new(a[0], a[1]), Point::new(b[0], b[1]))
}

/// Returns obstacles strictly closer than `radius` to `position`, in input order.
pub fn detect_objects(position: [f32; 2], obstacles: &[[f32; 2]], radius: f32) -> Vec<[f32; 2]> {
    obstacles
        .iter()
        .filter(|obstacle| distance(position, **obstacle) < radius)
        .copied()
        .collect()
}

/// Builds the observation vector for one body.
///
/// Layout: position x/y, velocity x/y, distance to goal, airborne flag, then
/// up to three nearby obstacles' x/y, zero-padded.
pub fn observe(body: &BodyState, distance_to_goal: f32, nearby: &[[f32; 2]]) -> Observation {
    let mut observation = [0.0; OBSERVATION_SIZE];
    observation[0] = body.position[0];
    observation[1] = body.position[1];
    observation[2] = body.velocity[0];
    observation[3] = body.velocity[1];
    observation[4] = distance_to_goal;
    observation[5] = if body.airborne { 1.0 } else { 0.0 };

    for (i, obstacle) in nearby.iter().take(MAX_PERCEIVED_OBSTACLES).enumerate() {
        observation[6 + i * 2] = obstacle[0];
        observation[7 + i * 2] = obstacle[1];
    }

    observation
}
