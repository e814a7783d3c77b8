//! Agents: a policy plus the fitness-tracking state it is ranked by.

use ndarray::Array1;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::brain::{
    ACTION_SIGNAL_SIZE, Brain, CrossoverOperator, MutationOperator, OBSERVATION_SIZE, Policy,
};
use super::error::{Result, TrainingError};
use super::fitness::{FitnessShaper, Progress, ShaperKind};

/// Fitness every agent starts with.
pub const INITIAL_FITNESS: f32 = 10.0;
/// Magnitude an action signal must exceed to trigger a movement.
pub const ACTION_THRESHOLD: f32 = 0.02;

/// Fixed-size observation fed to an agent each tick.
pub type Observation = [f32; OBSERVATION_SIZE];

/// Discrete movement command applied to an agent's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Action {
    /// Jump.
    pub up: bool,
    /// Move left.
    pub left: bool,
    /// Move right.
    pub right: bool,
}

impl Action {
    /// Discretizes raw policy output.
    ///
    /// `up` reads the first signal; `left`/`right` read the second against
    /// symmetric thresholds, so they never fire together.
    pub fn from_signal(signal: &Array1<f32>, threshold: f32) -> Self {
        Self {
            up: signal[0] > threshold,
            left: signal[1] < -threshold,
            right: signal[1] > threshold,
        }
    }
}

/// A controllable agent with its policy and fitness state.
///
/// `alive` is owned by the external simulation: the training loop only reads
/// it and never sets it back to `true`.
#[derive(Debug)]
pub struct Agent<P: Policy = Brain> {
    policy: P,
    /// Score this agent is ranked by.
    pub fitness: f32,
    progress: Progress,
    alive: bool,
    shaper: Box<dyn FitnessShaper>,
}

impl<P: Policy> Agent<P> {
    /// Wraps a policy in a fresh agent.
    ///
    /// Fails with [`TrainingError::InvalidPolicy`] when the policy does not map
    /// a 12-value observation to 2 action signals.
    pub fn new(policy: P, shaper: ShaperKind) -> Result<Self> {
        let topology = policy.topology();
        if topology.input != OBSERVATION_SIZE || topology.output != ACTION_SIGNAL_SIZE {
            return Err(TrainingError::InvalidPolicy(format!(
                "topology {topology} cannot map {OBSERVATION_SIZE} observations to {ACTION_SIGNAL_SIZE} signals"
            )));
        }

        Ok(Self {
            policy,
            fitness: INITIAL_FITNESS,
            progress: Progress::default(),
            alive: true,
            shaper: shaper.build(),
        })
    }

    /// Builds an agent from serialized policy bytes.
    pub fn from_bytes(bytes: &[u8], shaper: ShaperKind) -> Result<Self> {
        Self::new(P::from_bytes(bytes)?, shaper)
    }

    /// Chooses an action for the given observation.
    pub fn act(&self, observation: &Observation) -> Action {
        self.act_with_threshold(observation, ACTION_THRESHOLD)
    }

    /// Same as [`Agent::act`] with a custom discretization threshold.
    pub fn act_with_threshold(&self, observation: &Observation, threshold: f32) -> Action {
        let signal = self.policy.activate(&Array1::from_vec(observation.to_vec()));
        Action::from_signal(&signal, threshold)
    }

    /// Applies this agent's reward rule to the latest distance to the goal.
    pub fn update_fitness(&mut self, distance_to_goal: f32) {
        self.fitness += self.shaper.shape(&mut self.progress, distance_to_goal);
    }

    /// Independent copy of the policy with fresh fitness state.
    pub fn clone_fresh(&self) -> Result<Self> {
        Self::new(self.policy.clone_policy()?, self.shaper.kind())
    }

    /// Mutates the policy in place.
    pub fn mutate<R: Rng>(&mut self, operator: MutationOperator, rng: &mut R) {
        self.policy.mutate(operator, rng);
    }

    /// Creates a child agent from both parents' policies.
    pub fn crossover<R: Rng>(
        &self,
        other: &Self,
        operator: CrossoverOperator,
        rng: &mut R,
    ) -> Result<Self> {
        let policy = self.policy.crossover(&other.policy, operator, rng)?;
        Self::new(policy, self.shaper.kind())
    }

    /// Marks the agent as dead.
    pub fn kill(&mut self) {
        self.alive = false;
    }

    /// Whether the simulation still considers this agent active.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// The agent's policy.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Progress memory driving the active reward rule.
    fn progress(&self) -> &Progress {
        self.shaper.private_memory().unwrap_or(&self.progress)
    }

    /// Closest distance to the goal seen so far by the active reward rule.
    pub fn best_distance(&self) -> f32 {
        self.progress().best_distance
    }

    /// Ticks since the best distance last improved, per the active reward rule.
    pub fn stagnation_ticks(&self) -> u32 {
        self.progress().stagnation_ticks
    }

    /// Reward rule in use.
    pub fn shaper_kind(&self) -> ShaperKind {
        self.shaper.kind()
    }
}
