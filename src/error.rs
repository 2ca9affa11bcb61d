//! Error types for the latent-distribution test.

/// Everything that can stop a [`crate::inference::LatentDistributionTest`]
/// from producing a p-value.
#[derive(Debug, thiserror::Error)]
pub enum LdtError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Input graphs do not have the same directedness")]
    DirectednessMismatch,

    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("Degenerate input: each sample needs at least 2 points, got N={n} and M={m}")]
    DegenerateInput { n: usize, m: usize },

    #[error("Dimension mismatch in {context}: {left} vs {right}")]
    DimensionMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Cancelled after {completed} bootstrap iterations")]
    Cancelled { completed: usize },
}

impl From<serde_json::Error> for LdtError {
    fn from(e: serde_json::Error) -> Self {
        LdtError::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LdtError>;
