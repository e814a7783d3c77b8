//! Neural network policies for agent control.
//!
//! The training loop only talks to policies through the [`Policy`] trait, so
//! any numeric backend with a fixed topology can drive an agent. [`Brain`] is
//! the built-in backend: a two-layer perceptron with tanh on the hidden and
//! output units.

use std::fmt;

use ndarray::Array1;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::{Result, TrainingError};

pub mod mlp;

pub use mlp::Mlp;

/// Number of observation values fed to a policy each tick.
pub const OBSERVATION_SIZE: usize = 12;
/// Number of hidden units in the control policy.
pub const HIDDEN_SIZE: usize = 8;
/// Number of action signals produced by a policy.
pub const ACTION_SIGNAL_SIZE: usize = 2;

/// Layer sizes of a feed-forward policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Input width.
    pub input: usize,
    /// Hidden layer width.
    pub hidden: usize,
    /// Output width.
    pub output: usize,
}

impl Topology {
    /// The 12-8-2 topology used by every agent.
    pub const CONTROL: Topology = Topology {
        input: OBSERVATION_SIZE,
        hidden: HIDDEN_SIZE,
        output: ACTION_SIGNAL_SIZE,
    };

    /// Number of weights and biases in a policy of this shape.
    pub fn gene_count(&self) -> usize {
        (self.input + 1) * self.hidden + (self.hidden + 1) * self.output
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::CONTROL
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.input, self.hidden, self.output)
    }
}

/// How a genome is perturbed during mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationOperator {
    /// Each gene, with probability `rate`, gets `U(-magnitude, magnitude)` added.
    Jitter {
        /// Per-gene mutation probability in `[0, 1]`.
        rate: f32,
        /// Bound of the additive noise.
        magnitude: f32,
    },
    /// Every gene gets `U(-scale, scale)` added.
    Noise {
        /// Bound of the additive noise.
        scale: f32,
    },
    /// One randomly chosen weight or bias gets `U(-magnitude, magnitude)` added.
    SingleGene {
        /// Bound of the additive noise.
        magnitude: f32,
    },
}

impl MutationOperator {
    /// Noise bound used by this operator.
    pub fn magnitude(&self) -> f32 {
        match *self {
            Self::Jitter { magnitude, .. } | Self::SingleGene { magnitude } => magnitude,
            Self::Noise { scale } => scale,
        }
    }
}

impl Default for MutationOperator {
    fn default() -> Self {
        Self::Jitter {
            rate: 0.1,
            magnitude: 0.5,
        }
    }
}

/// How two parent genomes are recombined.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrossoverOperator {
    /// Each gene is taken from either parent with equal probability.
    #[default]
    Uniform,
    /// Each gene is the mean of both parents.
    Average,
    /// Each gene is `weight * p1 + (1 - weight) * p2`.
    Blend {
        /// Share of the first parent in `[0, 1]`.
        weight: f32,
    },
    /// Genes before a random cut point come from the first parent, the rest from the second.
    SinglePoint,
}

/// Capability set every agent policy must provide.
///
/// Implementations keep their topology fixed: neither [`Policy::mutate`] nor
/// [`Policy::crossover`] may change the shape reported by [`Policy::topology`].
pub trait Policy: Sized {
    /// Creates a policy with a random genome drawn from `U(-scale, scale)`.
    fn random<R: Rng>(topology: Topology, scale: f32, rng: &mut R) -> Self;

    /// Shape of this policy.
    fn topology(&self) -> Topology;

    /// Maps an observation to the raw action signals.
    fn activate(&self, observation: &Array1<f32>) -> Array1<f32>;

    /// Perturbs the genome in place.
    fn mutate<R: Rng>(&mut self, operator: MutationOperator, rng: &mut R);

    /// Produces a child genome from `self` and `other`.
    fn crossover<R: Rng>(
        &self,
        other: &Self,
        operator: CrossoverOperator,
        rng: &mut R,
    ) -> Result<Self>;

    /// Encodes the policy into bytes.
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Decodes a policy produced by [`Policy::to_bytes`].
    fn from_bytes(bytes: &[u8]) -> Result<Self>;

    /// Independent copy built through a bytes round trip.
    fn clone_policy(&self) -> Result<Self> {
        Self::from_bytes(&self.to_bytes()?)
    }
}

/// A two-layer perceptron used as the "brain" of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brain {
    /// Input to hidden layer.
    pub hidden: Mlp,
    /// Hidden to output layer.
    pub output: Mlp,
}

impl Brain {
    /// Creates a new brain with random weights.
    pub fn new<R: Rng>(topology: Topology, scale: f32, rng: &mut R) -> Self {
        Self {
            hidden: Mlp::new_random(topology.input, topology.hidden, scale, rng),
            output: Mlp::new_random(topology.hidden, topology.output, scale, rng),
        }
    }

    /// Rebuilds a brain of the given shape from a flat genome.
    pub fn from_flat_vector(topology: Topology, genes: &[f32]) -> Result<Self> {
        if genes.len() != topology.gene_count() {
            return Err(TrainingError::InvalidPolicy(format!(
                "genome of length {} does not fit topology {}",
                genes.len(),
                topology
            )));
        }
        let split = (topology.input + 1) * topology.hidden;
        let hidden = Mlp::from_flat(topology.input, topology.hidden, &genes[..split]);
        let output = Mlp::from_flat(topology.hidden, topology.output, &genes[split..]);
        match (hidden, output) {
            (Some(hidden), Some(output)) => Ok(Self { hidden, output }),
            _ => Err(TrainingError::InvalidPolicy(format!(
                "genome does not fit topology {}",
                topology
            ))),
        }
    }

    /// Flattens all weights and biases into a single vector.
    pub fn to_flat_vector(&self) -> Vec<f32> {
        let mut flat = Vec::with_capacity(self.genome_len());

        for layer in [&self.hidden, &self.output] {
            flat.extend(layer.weights.iter().copied());
            flat.extend(layer.biases.iter().copied());
        }

        flat
    }

    /// Number of genes in this brain.
    pub fn genome_len(&self) -> usize {
        self.hidden.gene_count() + self.output.gene_count()
    }

    /// Calculates the Euclidean distance between two brains.
    ///
    /// Returns `f32::MAX` for brains of different shapes.
    pub fn distance(brain1: &Brain, brain2: &Brain) -> f32 {
        if brain1.topology() != brain2.topology() {
            return f32::MAX;
        }
        brain1
            .to_flat_vector()
            .iter()
            .zip(brain2.to_flat_vector())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    fn validate(&self) -> Result<()> {
        if !self.hidden.is_consistent()
            || !self.output.is_consistent()
            || self.hidden.output_size() != self.output.input_size()
        {
            return Err(TrainingError::InvalidPolicy(
                "layer shapes are inconsistent".to_string(),
            ));
        }
        Ok(())
    }
}

impl Policy for Brain {
    fn random<R: Rng>(topology: Topology, scale: f32, rng: &mut R) -> Self {
        Self::new(topology, scale, rng)
    }

    fn topology(&self) -> Topology {
        Topology {
            input: self.hidden.input_size(),
            hidden: self.hidden.output_size(),
            output: self.output.output_size(),
        }
    }

    #[inline]
    fn activate(&self, observation: &Array1<f32>) -> Array1<f32> {
        self.output.forward(&self.hidden.forward(observation))
    }

    fn mutate<R: Rng>(&mut self, operator: MutationOperator, rng: &mut R) {
        match operator {
            MutationOperator::Jitter { rate, magnitude } => {
                self.hidden.jitter(rate, magnitude, rng);
                self.output.jitter(rate, magnitude, rng);
            }
            MutationOperator::Noise { scale } => {
                self.hidden.add_noise(scale, rng);
                self.output.add_noise(scale, rng);
            }
            MutationOperator::SingleGene { magnitude } => {
                let hidden_genes = self.hidden.gene_count();
                let index = rng.gen_range(0..self.genome_len());
                let gene = if index < hidden_genes {
                    self.hidden.gene_mut(index)
                } else {
                    self.output.gene_mut(index - hidden_genes)
                };
                if let Some(gene) = gene {
                    *gene += rng.gen_range(-magnitude..magnitude);
                }
            }
        }
    }

    fn crossover<R: Rng>(
        &self,
        other: &Self,
        operator: CrossoverOperator,
        rng: &mut R,
    ) -> Result<Self> {
        if !self.hidden.same_shape(&other.hidden) || !self.output.same_shape(&other.output) {
            return Err(TrainingError::TopologyMismatch {
                expected: self.topology(),
                found: other.topology(),
            });
        }

        let child = match operator {
            CrossoverOperator::Uniform => Self {
                hidden: Mlp::crossover_uniform(&self.hidden, &other.hidden, rng),
                output: Mlp::crossover_uniform(&self.output, &other.output, rng),
            },
            CrossoverOperator::Average => Self {
                hidden: Mlp::crossover(&self.hidden, &other.hidden),
                output: Mlp::crossover(&self.output, &other.output),
            },
            CrossoverOperator::Blend { weight } => Self {
                hidden: Mlp::crossover_weighted(&self.hidden, &other.hidden, weight),
                output: Mlp::crossover_weighted(&self.output, &other.output, weight),
            },
            CrossoverOperator::SinglePoint => {
                let mut genes = self.to_flat_vector();
                let cut = rng.gen_range(0..=genes.len());
                genes[cut..].copy_from_slice(&other.to_flat_vector()[cut..]);
                Self::from_flat_vector(self.topology(), &genes)?
            }
        };

        Ok(child)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let brain: Brain = serde_json::from_slice(bytes)
            .map_err(|e| TrainingError::InvalidPolicy(format!("unreadable policy bytes: {e}")))?;
        brain.validate()?;
        Ok(brain)
    }
}
