//! Error type shared by the training loop.

use super::brain::Topology;

/// Convenience alias for results produced by the training loop.
pub type Result<T> = std::result::Result<T, TrainingError>;

/// Errors raised while building agents or evolving a population.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    /// The policy cannot drive an agent (wrong shape or unreadable bytes).
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),
    /// A parent was requested from an empty candidate set.
    #[error("Cannot select a parent from an empty population")]
    EmptyPopulation,
    /// Crossover between policies of different shapes.
    #[error("Topology mismatch: expected {expected}, found {found}")]
    TopologyMismatch {
        /// Shape of the receiving policy.
        expected: Topology,
        /// Shape of the other parent.
        found: Topology,
    },
    /// No best agent has been recorded yet.
    #[error("No best agent recorded yet")]
    NoCheckpoint,
    /// Parameters failed validation.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    /// JSON encoding or decoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The external simulation reported a failure.
    #[error("Environment error: {0}")]
    Environment(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TrainingError {
    /// Wraps an error coming from the driver's simulation.
    pub fn environment<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Environment(Box::new(err))
    }
}
