//! Multi-layer perceptron implementation.

use ndarray::{Array1, Array2};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A single layer of a multi-layer perceptron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    /// Weight matrix (`output_size` × `input_size`).
    pub weights: Array2<f32>,
    /// Bias vector (`output_size`).
    pub biases: Array1<f32>,
}

impl Mlp {
    /// Creates a new layer with weights and biases drawn from `U(-scale, scale)`.
    pub fn new_random<R: Rng>(
        input_size: usize,
        output_size: usize,
        scale: f32,
        rng: &mut R,
    ) -> Self {
        Self {
            weights: Array2::random_using(
                (output_size, input_size),
                Uniform::new(-scale, scale),
                rng,
            ),
            biases: Array1::random_using(output_size, Uniform::new(-scale, scale), rng),
        }
    }

    /// Rebuilds a layer from a flat gene slice (weights row-major, then biases).
    ///
    /// Returns `None` when the slice length does not match the requested shape.
    pub fn from_flat(input_size: usize, output_size: usize, genes: &[f32]) -> Option<Self> {
        let n_weights = input_size * output_size;
        if genes.len() != n_weights + output_size {
            return None;
        }
        let weights =
            Array2::from_shape_vec((output_size, input_size), genes[..n_weights].to_vec()).ok()?;
        let biases = Array1::from_vec(genes[n_weights..].to_vec());
        Some(Self { weights, biases })
    }

    /// Number of inputs this layer consumes.
    pub fn input_size(&self) -> usize {
        self.weights.ncols()
    }

    /// Number of units in this layer.
    pub fn output_size(&self) -> usize {
        self.weights.nrows()
    }

    /// Total number of weights and biases.
    pub fn gene_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    /// Whether the weight matrix and bias vector agree with each other.
    pub fn is_consistent(&self) -> bool {
        self.biases.len() == self.output_size()
    }

    /// Whether both layers have identical weight and bias shapes.
    pub fn same_shape(&self, other: &Mlp) -> bool {
        self.weights.dim() == other.weights.dim() && self.biases.len() == other.biases.len()
    }

    /// Performs forward pass with tanh activation.
    #[inline]
    pub fn forward(&self, inputs: &Array1<f32>) -> Array1<f32> {
        let mut output = self.weights.dot(inputs);
        output += &self.biases;

        output.mapv_inplace(f32::tanh);
        output
    }

    /// Adds `U(-scale, scale)` noise to every weight and bias.
    pub fn add_noise<R: Rng>(&mut self, scale: f32, rng: &mut R) {
        self.weights += &Array2::random_using(self.weights.dim(), Uniform::new(-scale, scale), rng);
        self.biases += &Array1::random_using(self.biases.len(), Uniform::new(-scale, scale), rng);
    }

    /// Perturbs each gene independently with probability `rate` by `U(-magnitude, magnitude)`.
    pub fn jitter<R: Rng>(&mut self, rate: f32, magnitude: f32, rng: &mut R) {
        let rate = f64::from(rate);
        for gene in self.weights.iter_mut().chain(self.biases.iter_mut()) {
            if rng.gen_bool(rate) {
                *gene += rng.gen_range(-magnitude..magnitude);
            }
        }
    }

    /// Mutable access to the gene at `index` in flat order (weights, then biases).
    pub fn gene_mut(&mut self, index: usize) -> Option<&mut f32> {
        self.weights
            .iter_mut()
            .chain(self.biases.iter_mut())
            .nth(index)
    }

    /// Creates a new layer by averaging two parent layers.
    pub fn crossover(parent1: &Mlp, parent2: &Mlp) -> Self {
        Self {
            weights: &parent1.weights * 0.5 + &parent2.weights * 0.5,
            biases: &parent1.biases * 0.5 + &parent2.biases * 0.5,
        }
    }

    /// Creates a new layer by weighted averaging two parent layers.
    pub fn crossover_weighted(parent1: &Mlp, parent2: &Mlp, weight1: f32) -> Self {
        let weight2 = 1.0 - weight1;
        Self {
            weights: &parent1.weights * weight1 + &parent2.weights * weight2,
            biases: &parent1.biases * weight1 + &parent2.biases * weight2,
        }
    }

    /// Creates a new layer taking each gene from either parent with equal probability.
    pub fn crossover_uniform<R: Rng>(parent1: &Mlp, parent2: &Mlp, rng: &mut R) -> Self {
        let weights = Array2::from_shape_fn(parent1.weights.dim(), |idx| {
            if rng.gen_bool(0.5) {
                parent1.weights[idx]
            } else {
                parent2.weights[idx]
            }
        });
        let biases = Array1::from_shape_fn(parent1.biases.len(), |i| {
            if rng.gen_bool(0.5) {
                parent1.biases[i]
            } else {
                parent2.biases[i]
            }
        });
        Self { weights, biases }
    }
}
