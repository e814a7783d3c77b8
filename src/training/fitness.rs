//! Reward shaping rules that turn goal distance into fitness changes.
//!
//! Two rules are available. [`ProgressShaper`] is the rule agents use by
//! default and works on the agent's own progress memory. [`GoalShaper`] keeps
//! a private memory and pays larger rewards and penalties. Both sit behind the
//! [`FitnessShaper`] trait and are selected with [`ShaperKind`].

use std::fmt;

use geo::algorithm::Distance;
use geo::{Euclidean, Point};
use serde::{Deserialize, Serialize};

/// Consecutive non-improving ticks tolerated before the stagnation penalty applies.
pub const STAGNATION_THRESHOLD: u32 = 10;
/// Fitness removed each time the stagnation threshold is exceeded.
pub const STAGNATION_PENALTY: f32 = 0.4;
/// Fitness added per improving tick by [`ProgressShaper`].
pub const PROGRESS_REWARD: f32 = 0.2;
/// Reward paid per improving tick by [`GoalShaper`].
pub const GOAL_REWARD: f32 = 2.0;
/// Punishment per non-improving tick by [`GoalShaper`].
pub const GOAL_PUNISHMENT: f32 = 1.0;

/// Best distance seen so far and the ticks spent without beating it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Closest distance to the goal observed so far.
    pub best_distance: f32,
    /// Ticks since `best_distance` last improved.
    pub stagnation_ticks: u32,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            best_distance: f32::INFINITY,
            stagnation_ticks: 0,
        }
    }
}

/// Outcome of feeding one distance sample into a [`Progress`] memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The distance beat the best seen so far.
    Improved,
    /// No improvement, threshold not yet exceeded.
    Stalled,
    /// No improvement and the threshold was exceeded; the counter was reset.
    Penalized,
}

impl Progress {
    /// Records a distance sample and reports what happened.
    pub fn record(&mut self, distance: f32) -> Step {
        if distance < self.best_distance {
            self.best_distance = distance;
            self.stagnation_ticks = 0;
            return Step::Improved;
        }

        self.stagnation_ticks += 1;
        if self.stagnation_ticks > STAGNATION_THRESHOLD {
            self.stagnation_ticks = 0;
            Step::Penalized
        } else {
            Step::Stalled
        }
    }
}

/// A reward rule: maps a distance sample to a fitness delta.
pub trait FitnessShaper: fmt::Debug + Send {
    /// Returns the fitness delta for this tick.
    ///
    /// `progress` is the agent's own memory; rules with a private memory may ignore it.
    fn shape(&mut self, progress: &mut Progress, distance: f32) -> f32;

    /// Which rule this is.
    fn kind(&self) -> ShaperKind;

    /// Progress memory kept by the rule itself, if it does not use the agent's.
    fn private_memory(&self) -> Option<&Progress> {
        None
    }
}

/// Rewards monotonic progress and penalizes long stalls.
///
/// `+0.2` per improving tick; `-0.4` once every 11th consecutive
/// non-improving tick. Uses the agent's progress memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressShaper;

impl FitnessShaper for ProgressShaper {
    fn shape(&mut self, progress: &mut Progress, distance: f32) -> f32 {
        match progress.record(distance) {
            Step::Improved => PROGRESS_REWARD,
            Step::Stalled => 0.0,
            Step::Penalized => -STAGNATION_PENALTY,
        }
    }

    fn kind(&self) -> ShaperKind {
        ShaperKind::Progress
    }
}

/// Alternate rule with its own best-distance memory.
///
/// `+2` on improvement, `-1` otherwise, plus `-0.4` whenever the stagnation
/// threshold is exceeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoalShaper {
    memory: Progress,
}

impl GoalShaper {
    /// Creates a shaper with empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shaper's private progress memory.
    pub fn memory(&self) -> &Progress {
        &self.memory
    }

    /// Computes the reward for an agent at `position` heading to `goal`.
    pub fn reward(&mut self, position: [f32; 2], goal: [f32; 2]) -> f32 {
        let distance = Euclidean.distance(
            Point::new(position[0], position[1]),
            Point::new(goal[0], goal[1]),
        );
        self.reward_distance(distance)
    }

    fn reward_distance(&mut self, distance: f32) -> f32 {
        match self.memory.record(distance) {
            Step::Improved => GOAL_REWARD,
            Step::Stalled => -GOAL_PUNISHMENT,
            Step::Penalized => -GOAL_PUNISHMENT - STAGNATION_PENALTY,
        }
    }
}

impl FitnessShaper for GoalShaper {
    fn shape(&mut self, _progress: &mut Progress, distance: f32) -> f32 {
        self.reward_distance(distance)
    }

    fn kind(&self) -> ShaperKind {
        ShaperKind::Goal
    }

    fn private_memory(&self) -> Option<&Progress> {
        Some(&self.memory)
    }
}

/// Selects which reward rule agents use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaperKind {
    /// [`ProgressShaper`].
    #[default]
    Progress,
    /// [`GoalShaper`].
    Goal,
}

impl ShaperKind {
    /// Creates a fresh shaper of this kind.
    pub fn build(self) -> Box<dyn FitnessShaper> {
        match self {
            Self::Progress => Box::new(ProgressShaper),
            Self::Goal => Box::new(GoalShaper::new()),
        }
    }
}
