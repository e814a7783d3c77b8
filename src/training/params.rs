//! Training parameters: defaults, validation and JSON files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::agent::ACTION_THRESHOLD;
use super::brain::{CrossoverOperator, MutationOperator};
use super::error::{Result, TrainingError};
use super::fitness::ShaperKind;
use super::perception::DETECTION_RADIUS;

/// How the best fitness is reported across generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BestFitnessPolicy {
    /// Each generation replaces the record, even with a lower value.
    #[default]
    Overwrite,
    /// Keep the highest value seen in any generation.
    RunningMax,
}

/// Parameters that control the training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Number of agents per generation.
    pub population_size: usize,
    /// Seed for the shared random source. `None` draws from entropy.
    pub seed: Option<u64>,
    /// Bound of the uniform distribution used for fresh genomes.
    pub init_scale: f32,
    /// Probability that a newly bred agent is mutated.
    pub mutation_probability: f32,
    /// Mutation applied to selected agents.
    pub mutation: MutationOperator,
    /// Recombination used to breed children.
    pub crossover: CrossoverOperator,
    /// Number of top agents copied unchanged into the next generation.
    pub elitism: usize,
    /// Reward rule agents use.
    pub shaper: ShaperKind,
    /// How `best_fitness_ever` is updated.
    pub best_fitness: BestFitnessPolicy,
    /// Radius within which obstacles are perceived.
    pub detection_radius: f32,
    /// Magnitude action signals must exceed.
    pub action_threshold: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            population_size: 10,
            seed: None,
            init_scale: 1.0,
            mutation_probability: 0.2,
            mutation: MutationOperator::default(),
            crossover: CrossoverOperator::default(),
            elitism: 0,
            shaper: ShaperKind::default(),
            best_fitness: BestFitnessPolicy::default(),
            detection_radius: DETECTION_RADIUS,
            action_threshold: ACTION_THRESHOLD,
        }
    }
}

impl Params {
    /// Checks that all values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(TrainingError::InvalidParams(
                "population_size must be positive".to_string(),
            ));
        }
        if !(self.init_scale > 0.0) {
            return Err(TrainingError::InvalidParams(format!(
                "init_scale must be positive, got {}",
                self.init_scale
            )));
        }
        if !(0.0..=1.0).contains(&self.mutation_probability) {
            return Err(TrainingError::InvalidParams(format!(
                "mutation_probability must be in [0, 1], got {}",
                self.mutation_probability
            )));
        }
        if let MutationOperator::Jitter { rate, .. } = self.mutation
            && !(0.0..=1.0).contains(&rate)
        {
            return Err(TrainingError::InvalidParams(format!(
                "jitter rate must be in [0, 1], got {}",
                rate
            )));
        }
        if !(self.mutation.magnitude() > 0.0) {
            return Err(TrainingError::InvalidParams(format!(
                "mutation magnitude must be positive, got {}",
                self.mutation.magnitude()
            )));
        }
        if let CrossoverOperator::Blend { weight } = self.crossover
            && !(0.0..=1.0).contains(&weight)
        {
            return Err(TrainingError::InvalidParams(format!(
                "blend weight must be in [0, 1], got {}",
                weight
            )));
        }
        if self.elitism > self.population_size {
            return Err(TrainingError::InvalidParams(format!(
                "elitism ({}) exceeds population_size ({})",
                self.elitism, self.population_size
            )));
        }
        if !(self.detection_radius >= 0.0) || !(self.action_threshold >= 0.0) {
            return Err(TrainingError::InvalidParams(
                "detection_radius and action_threshold must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves the parameters to a JSON file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads and validates parameters from a JSON file.
    ///
    /// Missing fields take their default values.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let params: Params = serde_json::from_str(&json)?;
        params.validate()?;
        Ok(params)
    }
}
