//! # latentdist
//!
//! Nonparametric two-sample test of whether two graphs, or two sets of
//! latent-position embeddings, come from the same latent-position
//! distribution.
//!
//! The entry point is [`inference::LatentDistributionTest`], configured with
//! [`builder::LatentDistributionTestBuilder`]. The building blocks (variance
//! estimation, size correction, kernels, statistic and bootstrap) are public
//! so they can be used on their own.

pub mod align;
pub mod bootstrap;
pub mod builder;
pub mod core;
pub mod correction;
pub mod embed;
pub mod error;
pub mod graph;
pub mod inference;
pub mod kernel;
pub mod operators;
pub mod params;
pub mod statistic;
pub mod variance;

pub use error::{LdtError, Result};
pub use inference::LatentDistributionTest;

#[cfg(test)]
mod tests;
