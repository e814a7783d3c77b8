//! # Neuroevo - Generational Neuroevolution of Control Policies
//!
//! Trains a population of small feed-forward policies with a generational
//! genetic algorithm. Fitness comes from an external physical simulation:
//! each tick the simulation reports where every agent's body is, the agent
//! picks a discrete action, and its fitness is shaped by how much closer to
//! the goal it got.
//!
//! ## Features
//!
//! - Fixed 12-8-2 perceptron policies with tanh activation
//! - Pluggable policy backends through the [`training::brain::Policy`] trait
//! - Linear ranking parent selection, crossover and mutation operators
//! - Selectable reward shaping rules
//! - Optional elitism
//! - Reproducible runs from a single seeded random source
//! - JSON parameters and best-policy checkpoints
//!
//! ## Core Modules
//!
//! - [`training::brain`] - Policy trait and perceptron implementation
//! - [`training::agent`] - Agent state and action selection
//! - [`training::fitness`] - Reward shaping rules
//! - [`training::perception`] - Observations and the simulation interface
//! - [`training::population`] - Generation manager

/// Neuroevolution training loop.
pub mod training {
    /// Agents: policy, fitness state and action selection.
    pub mod agent;
    /// Neural network policies and genetic operators.
    pub mod brain;
    /// Error type for the training loop.
    pub mod error;
    /// Reward shaping rules.
    pub mod fitness;
    /// Training parameters.
    pub mod params;
    /// Observations built from the external simulation.
    ///
    /// The [`perception::Environment`] trait is implemented by the driver to
    /// expose agent bodies and accept actions.
    pub mod perception;
    /// Population management and evolution.
    pub mod population;
}
