//! Generation manager: evaluates agents each tick and breeds new generations.
//!
//! A [`Population`] owns every agent. The driver calls
//! [`Population::simulate`] once per simulated tick and
//! [`Population::evolve`] at whatever cadence it likes. Evolution ranks the
//! surviving agents, draws parents with linear ranking selection, breeds a
//! full replacement generation and mutates part of it. All randomness comes
//! from one seeded [`StdRng`], so runs with the same seed and the same
//! simulation are reproducible.

use std::path::Path;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::agent::Agent;
use super::brain::{Brain, Policy, Topology};
use super::error::{Result, TrainingError};
use super::params::{BestFitnessPolicy, Params};
use super::perception::{self, Environment, TickContext};

/// Read-only summary of the population's state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Completed generations.
    pub generation: u32,
    /// Best fitness recorded at the last evolution, `None` before the first.
    pub best_fitness_ever: Option<f32>,
    /// Agents still alive in the current generation.
    pub alive_count: usize,
    /// Target number of agents per generation.
    pub population_size: usize,
    /// Mean fitness of the current generation.
    pub mean_fitness: f32,
}

/// Saved best policy, used to resume training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<P = Brain> {
    /// Generation the checkpoint was taken at.
    pub generation: u32,
    /// Fitness of the best agent.
    pub best_fitness: f32,
    /// When the checkpoint was written.
    pub saved_at: DateTime<Utc>,
    /// Policy of the best agent.
    pub best_policy: P,
}

impl<P: Serialize + DeserializeOwned> Checkpoint<P> {
    /// Saves the checkpoint to a JSON file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads a checkpoint from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let checkpoint = serde_json::from_str(&json)?;
        Ok(checkpoint)
    }
}

/// An evolving population of agents.
#[derive(Debug)]
pub struct Population<P: Policy = Brain> {
    params: Params,
    agents: Vec<Agent<P>>,
    population_size: usize,
    generation: u32,
    best_fitness_ever: f32,
    best_agent: Option<Agent<P>>,
    rng: StdRng,
}

impl<P: Policy> Population<P> {
    /// Creates an empty population. Call [`Population::spawn`] to add agents.
    pub fn new(params: Params) -> Result<Self> {
        params.validate()?;
        let rng = params
            .seed
            .map(StdRng::seed_from_u64)
            .unwrap_or_else(StdRng::from_entropy);

        Ok(Self {
            population_size: params.population_size,
            params,
            agents: Vec::new(),
            generation: 0,
            best_fitness_ever: f32::NEG_INFINITY,
            best_agent: None,
            rng,
        })
    }

    /// Creates an empty population whose random source is seeded with `seed`,
    /// overriding `params.seed`.
    pub fn with_seed(params: Params, seed: u64) -> Result<Self> {
        Self::new(Params {
            seed: Some(seed),
            ..params
        })
    }

    /// Replaces the agents with `size` fresh agents with random policies.
    pub fn spawn(&mut self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(TrainingError::InvalidParams(
                "spawn size must be positive".to_string(),
            ));
        }

        let mut agents = Vec::with_capacity(size);
        for _ in 0..size {
            let policy = P::random(Topology::CONTROL, self.params.init_scale, &mut self.rng);
            agents.push(Agent::new(policy, self.params.shaper)?);
        }

        self.agents = agents;
        self.population_size = size;
        log::debug!("Spawned {} agents", size);
        Ok(())
    }

    /// Runs one tick: every alive agent observes, acts and updates its fitness.
    ///
    /// Dead agents are skipped but stay in the population until the next
    /// [`Population::evolve`]. A body reported as not alive kills its agent.
    pub fn simulate<E: Environment>(&mut self, ctx: &TickContext<'_>, env: &mut E) -> Result<()> {
        for (index, agent) in self.agents.iter_mut().enumerate() {
            if !agent.is_alive() {
                continue;
            }

            let body = env.body(index).map_err(TrainingError::environment)?;
            if !body.alive {
                agent.kill();
                continue;
            }

            let distance = perception::distance(body.position, ctx.goal);
            let nearby =
                perception::detect_objects(body.position, ctx.obstacles, self.params.detection_radius);
            let observation = perception::observe(&body, distance, &nearby);

            let action = agent.act_with_threshold(&observation, self.params.action_threshold);
            agent.update_fitness(distance);
            env.apply_action(index, action)
                .map_err(TrainingError::environment)?;
        }

        Ok(())
    }

    /// Replaces the population with the next generation.
    ///
    /// Does nothing on an empty population. Only alive agents are ranked, but
    /// the new generation is always refilled to the full population size. On
    /// error the current generation is left untouched.
    pub fn evolve(&mut self) -> Result<()> {
        if self.agents.is_empty() {
            return Ok(());
        }

        let survivors: Vec<&Agent<P>> = self.agents.iter().filter(|a| a.is_alive()).collect();
        let Some(best) = best_of(&survivors) else {
            log::warn!(
                "Generation {}: no surviving agents to breed from",
                self.generation
            );
            return Err(TrainingError::EmptyPopulation);
        };
        let best_fitness = best.fitness;
        let snapshot = best.clone_fresh()?;

        let ranked = rank_ascending(&survivors);
        let mut next = Vec::with_capacity(self.population_size);

        let n_elites = self.params.elitism.min(ranked.len()).min(self.population_size);
        for elite in ranked.iter().rev().take(n_elites) {
            next.push(elite.clone_fresh()?);
        }

        while next.len() < self.population_size {
            let parent1 = select_ranked(&ranked, &mut self.rng)?;
            let parent2 = select_ranked(&ranked, &mut self.rng)?;
            next.push(parent1.crossover(parent2, self.params.crossover, &mut self.rng)?);
        }

        let mutation_probability = f64::from(self.params.mutation_probability);
        for agent in next.iter_mut().skip(n_elites) {
            if self.rng.gen_bool(mutation_probability) {
                agent.mutate(self.params.mutation, &mut self.rng);
            }
        }

        let record = match self.params.best_fitness {
            BestFitnessPolicy::Overwrite => true,
            BestFitnessPolicy::RunningMax => {
                self.best_agent.is_none() || best_fitness > self.best_fitness_ever
            }
        };
        if record {
            self.best_fitness_ever = best_fitness;
            self.best_agent = Some(snapshot);
        }

        log::info!(
            "Generation {}: best fitness {:.2}, {} of {} agents survived",
            self.generation,
            best_fitness,
            survivors.len(),
            self.agents.len()
        );

        self.agents = next;
        self.generation += 1;
        Ok(())
    }

    /// Draws one parent from the alive agents by linear ranking selection.
    pub fn select_parent(&mut self) -> Result<&Agent<P>> {
        let survivors: Vec<&Agent<P>> = self.agents.iter().filter(|a| a.is_alive()).collect();
        select_parent(&survivors, &mut self.rng)
    }

    /// Marks agent `index` as dead. Returns `false` if there is no such agent.
    pub fn kill(&mut self, index: usize) -> bool {
        match self.agents.get_mut(index) {
            Some(agent) => {
                agent.kill();
                true
            }
            None => false,
        }
    }

    /// Current agents, in simulation order.
    pub fn agents(&self) -> &[Agent<P>] {
        &self.agents
    }

    /// Completed generations.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Best fitness recorded at the last evolution (`-inf` before the first).
    pub fn best_fitness_ever(&self) -> f32 {
        self.best_fitness_ever
    }

    /// Independent snapshot of the best agent of the last evolution.
    pub fn best_agent(&self) -> Option<&Agent<P>> {
        self.best_agent.as_ref()
    }

    /// Number of agents still alive.
    pub fn alive_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_alive()).count()
    }

    /// Target number of agents per generation.
    pub fn population_size(&self) -> usize {
        self.population_size
    }

    /// Parameters in use.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Summary of the current state.
    pub fn telemetry(&self) -> Telemetry {
        let mean_fitness = if self.agents.is_empty() {
            0.0
        } else {
            self.agents.iter().map(|a| a.fitness).sum::<f32>() / self.agents.len() as f32
        };

        Telemetry {
            generation: self.generation,
            best_fitness_ever: self
                .best_agent
                .as_ref()
                .map(|_| self.best_fitness_ever),
            alive_count: self.alive_count(),
            population_size: self.population_size,
            mean_fitness,
        }
    }
}

impl<P: Policy + Serialize + DeserializeOwned> Population<P> {
    /// Captures the best agent's policy.
    pub fn checkpoint(&self) -> Result<Checkpoint<P>> {
        let best = self.best_agent.as_ref().ok_or(TrainingError::NoCheckpoint)?;
        Ok(Checkpoint {
            generation: self.generation,
            best_fitness: self.best_fitness_ever,
            saved_at: Utc::now(),
            best_policy: best.policy().clone_policy()?,
        })
    }

    /// Writes the best agent's policy to a JSON file.
    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.checkpoint()?.save_to_file(path)?;
        log::debug!("Saved checkpoint for generation {} to {:?}", self.generation, path);
        Ok(())
    }

    /// Builds a population from a checkpoint file written by
    /// [`Population::save_checkpoint`].
    pub fn load_checkpoint(params: Params, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let checkpoint = Checkpoint::<P>::load_from_file(path)?;
        log::debug!("Loaded checkpoint for generation {} from {:?}", checkpoint.generation, path);
        Self::from_checkpoint(params, checkpoint)
    }

    /// Builds a population seeded from a checkpoint.
    ///
    /// The first agent carries the saved policy unchanged; the others are
    /// mutated copies of it.
    pub fn from_checkpoint(params: Params, checkpoint: Checkpoint<P>) -> Result<Self> {
        let mut population = Self::new(params)?;
        let size = population.population_size;

        let mut agents = Vec::with_capacity(size);
        for i in 0..size {
            let mut policy = checkpoint.best_policy.clone_policy()?;
            if i > 0 {
                policy.mutate(population.params.mutation, &mut population.rng);
            }
            agents.push(Agent::new(policy, population.params.shaper)?);
        }

        population.best_agent = Some(Agent::new(
            checkpoint.best_policy,
            population.params.shaper,
        )?);
        population.agents = agents;
        population.generation = checkpoint.generation;
        population.best_fitness_ever = checkpoint.best_fitness;
        Ok(population)
    }
}

/// Agent with the highest fitness; the earliest one wins ties.
fn best_of<'a, P: Policy>(agents: &[&'a Agent<P>]) -> Option<&'a Agent<P>> {
    let mut best: Option<&'a Agent<P>> = None;
    for &agent in agents {
        if best.is_none_or(|b| agent.fitness > b.fitness) {
            best = Some(agent);
        }
    }
    best
}

/// Sorts candidates by ascending fitness; equal fitness keeps the input order.
fn rank_ascending<'a, P: Policy>(candidates: &[&'a Agent<P>]) -> Vec<&'a Agent<P>> {
    let mut ranked = candidates.to_vec();
    ranked.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));
    ranked
}

/// Linear ranking draw over agents already sorted by ascending fitness.
///
/// The agent at rank `r` (1 = worst) is chosen with probability
/// `r / (N(N+1)/2)`.
fn select_ranked<'a, P: Policy, R: Rng>(
    ranked: &[&'a Agent<P>],
    rng: &mut R,
) -> Result<&'a Agent<P>> {
    let n = ranked.len();
    if n == 0 {
        return Err(TrainingError::EmptyPopulation);
    }

    let sum_of_ranks = n * (n + 1) / 2;
    let threshold = rng.gen_range(0..sum_of_ranks);
    let mut running_sum = 0;
    for (i, &agent) in ranked.iter().enumerate() {
        running_sum += i + 1;
        if running_sum > threshold {
            return Ok(agent);
        }
    }

    Ok(ranked[n - 1])
}

/// Draws one parent from `candidates` by linear ranking selection.
pub fn select_parent<'a, P: Policy, R: Rng>(
    candidates: &[&'a Agent<P>],
    rng: &mut R,
) -> Result<&'a Agent<P>> {
    select_ranked(&rank_ascending(candidates), rng)
}
