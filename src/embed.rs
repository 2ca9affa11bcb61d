//! # Spectral embedding and dimension selection
//!
//! The test never looks at edges directly: each graph is first mapped to a
//! cloud of latent-position estimates, one point per vertex. This module
//! defines the two collaborator seams used for that step and ships the
//! default implementation of each.
//!
//! # Stages
//!
//! 1. **Dimension selection** (`DimensionSelector`): when the caller gives no
//!    embedding dimension, each graph proposes an ordered list of candidate
//!    dimensions (profile-likelihood elbows of its singular values). The
//!    orchestrator keeps the last candidate of each graph and takes the max so
//!    both graphs land in a common space.
//! 2. **Embedding** (`Embedder`): the adjacency matrix is decomposed and the
//!    leading `d` components are scaled by the square root of their spectral
//!    magnitude.
//!    - undirected graphs: symmetric eigen decomposition, `X = U |Λ|^{1/2}`
//!    - directed graphs: singular value decomposition, out-positions `U S^{1/2}`
//!      and in-positions `V S^{1/2}`
//!
//! # Usage Example
//!
//! ```ignore
//! use latentdist::embed::{AdjacencySpectralEmbed, DimensionSelector, Embedder, ProfileLikelihood};
//! use latentdist::graph::Graph;
//!
//! let graph = Graph::from_adjacency(&adjacency)?;
//! let elbows = ProfileLikelihood::default().select(&graph)?;
//! let d = *elbows.last().unwrap();
//! let embedding = AdjacencySpectralEmbed::default().embed(&graph, d)?;
//! ```

use std::cmp::Ordering;

use log::{debug, info, trace};
use nalgebra::{DMatrix, SymmetricEigen};

use crate::core::Embedding;
use crate::error::{LdtError, Result};
use crate::graph::Graph;

/// Maps a graph to latent-position estimates in `n_components` dimensions.
pub trait Embedder: Send + Sync {
    /// Embed `graph` into `n_components` dimensions.
    ///
    /// # Returns
    /// `Embedding::Undirected` for symmetric adjacency matrices,
    /// `Embedding::Directed` otherwise.
    fn embed(&self, graph: &Graph, n_components: usize) -> Result<Embedding>;
}

/// Proposes candidate embedding dimensions for a graph.
pub trait DimensionSelector: Send + Sync {
    /// Ordered candidate dimensions; callers use the last one.
    fn select(&self, graph: &Graph) -> Result<Vec<usize>>;
}

/// Adjacency spectral embedding.
#[derive(Clone, Debug)]
pub struct AdjacencySpectralEmbed {
    /// Replace the diagonal with scaled degrees before decomposing.
    pub diag_aug: bool,
}

impl Default for AdjacencySpectralEmbed {
    fn default() -> Self {
        Self { diag_aug: true }
    }
}

impl Embedder for AdjacencySpectralEmbed {
    fn embed(&self, graph: &Graph, n_components: usize) -> Result<Embedding> {
        let n = graph.n_vertices();
        if n_components == 0 || n_components > n {
            return Err(LdtError::Configuration(format!(
                "cannot embed a graph with {} vertices into {} dimensions",
                n, n_components
            )));
        }
        info!(
            "AdjacencySpectralEmbed: n={} vertices into d={} ({})",
            n,
            n_components,
            if graph.is_directed() { "directed" } else { "undirected" }
        );

        let a = if self.diag_aug {
            graph.augment_diagonal()
        } else {
            graph.adjacency.clone()
        };

        if graph.is_directed() {
            let svd = a.svd(true, true);
            let u = svd
                .u
                .ok_or_else(|| LdtError::Numerical("SVD did not return U".into()))?;
            let v_t = svd
                .v_t
                .ok_or_else(|| LdtError::Numerical("SVD did not return Vᵀ".into()))?;
            let order = descending_order(svd.singular_values.as_slice(), |s| s);
            let roots: Vec<f64> = order[..n_components]
                .iter()
                .map(|&k| svd.singular_values[k].sqrt())
                .collect();

            let out = DMatrix::from_fn(n, n_components, |r, c| u[(r, order[c])] * roots[c]);
            let inn = DMatrix::from_fn(n, n_components, |r, c| v_t[(order[c], r)] * roots[c]);
            debug!("Directed embedding: leading singular values {:?}", &roots);
            Ok(Embedding::Directed { out, inn })
        } else {
            let eigen = SymmetricEigen::new(a);
            let order = descending_order(eigen.eigenvalues.as_slice(), f64::abs);
            let roots: Vec<f64> = order[..n_components]
                .iter()
                .map(|&k| eigen.eigenvalues[k].abs().sqrt())
                .collect();

            let x = DMatrix::from_fn(n, n_components, |r, c| {
                eigen.eigenvectors[(r, order[c])] * roots[c]
            });
            debug!("Undirected embedding: leading |λ|^½ {:?}", &roots);
            Ok(Embedding::Undirected(x))
        }
    }
}

/// Indices of `values` sorted by decreasing `key(value)`.
fn descending_order(values: &[f64], key: impl Fn(f64) -> f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| {
        key(values[j])
            .partial_cmp(&key(values[i]))
            .unwrap_or(Ordering::Equal)
    });
    order
}

/// Zhu & Ghodsi profile-likelihood elbow finder.
///
/// Looks at the first `ceil(log2(n))` singular values of the adjacency matrix
/// and returns `n_elbows` successive elbows (fewer when the spectrum runs out).
#[derive(Clone, Debug)]
pub struct ProfileLikelihood {
    pub n_elbows: usize,
}

impl Default for ProfileLikelihood {
    fn default() -> Self {
        Self { n_elbows: 2 }
    }
}

impl DimensionSelector for ProfileLikelihood {
    fn select(&self, graph: &Graph) -> Result<Vec<usize>> {
        let n = graph.n_vertices();
        let mut values: Vec<f64> = graph.adjacency.singular_values().iter().copied().collect();
        values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));

        let keep = ((n as f64).log2().ceil() as usize).clamp(1, values.len());
        values.truncate(keep);

        let elbows = profile_likelihood_elbows(&values, self.n_elbows);
        debug!(
            "ProfileLikelihood: {} singular values considered, elbows {:?}",
            keep, elbows
        );
        Ok(elbows)
    }
}

/// Successive profile-likelihood elbows of a non-increasing sequence.
///
/// Each elbow is a count of leading values (a dimension, starting at 1).
pub fn profile_likelihood_elbows(values: &[f64], n_elbows: usize) -> Vec<usize> {
    let mut elbows = Vec::with_capacity(n_elbows);
    let mut idx = 0;
    for _ in 0..n_elbows {
        let arr = &values[idx..];
        if arr.len() <= 1 {
            break;
        }
        let likelihoods = profile_log_likelihood(arr);
        let best = likelihoods
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
                if v > bv {
                    (i, v)
                } else {
                    (bi, bv)
                }
            })
            .0;
        idx += best + 1;
        trace!("elbow found at {}", idx);
        elbows.push(idx);
    }
    if elbows.is_empty() {
        elbows.push(values.len().max(1));
    }
    elbows
}

/// Log-likelihood of splitting `arr` after each prefix of length `1..=len`,
/// modelling both parts as Gaussians with separate means and a shared variance.
///
/// The shared variance is unbiased: the pooled sum of squares is divided by
/// `n - 2` for a proper split and by `n - 1` when the second part is empty
/// (floored at one degree of freedom).
pub fn profile_log_likelihood(arr: &[f64]) -> Vec<f64> {
    let n = arr.len();
    (1..=n)
        .map(|q| {
            let (s1, s2) = arr.split_at(q);
            let ss = sum_sq_dev(s1) + sum_sq_dev(s2);
            let dof = (n - 1 - usize::from(q < n)).max(1);
            let var = (ss / dof as f64).max(f64::EPSILON);
            -0.5 * n as f64 * (2.0 * std::f64::consts::PI * var).ln() - ss / (2.0 * var)
        })
        .collect()
}

fn sum_sq_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean) * (v - mean)).sum()
}
