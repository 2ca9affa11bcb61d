//! Point clouds and the bridge between the public and the numerical matrix types.
//!
//! The test consumes two point clouds: `X` with `N` rows and `Y` with `M`
//! rows, both in `R^d`. Point `i` is row `i`. At the public boundary point
//! clouds, adjacency matrices and kernel matrices are smartcore
//! `DenseMatrix<f64>` values; the numerical stages (inversions, determinants,
//! decompositions) run on `nalgebra::DMatrix<f64>`. This module owns the
//! conversions and the `Embedding` value returned by an embedder.
//!
//! - `Embedding::Undirected` holds one `n×d` matrix of latent positions.
//! - `Embedding::Directed` holds the out- and in-positions of a directed graph;
//!   they are concatenated column-wise into an `n×2d` cloud before alignment.
//!
//! # Examples
//!
//! ```
//! use latentdist::core::{to_dense, to_dmatrix};
//! use smartcore::linalg::basic::arrays::Array;
//! use smartcore::linalg::basic::matrix::DenseMatrix;
//!
//! let dm = DenseMatrix::from_2d_vec(&vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
//! let na = to_dmatrix(&dm);
//! assert_eq!(na[(1, 0)], 3.0);
//! assert_eq!(*to_dense(&na).get((0, 1)), 2.0);
//! ```

use nalgebra::DMatrix;
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{LdtError, Result};

/// Copy a smartcore matrix into a nalgebra matrix of the same shape.
pub fn to_dmatrix(m: &DenseMatrix<f64>) -> DMatrix<f64> {
    let (n, d) = m.shape();
    DMatrix::from_fn(n, d, |i, j| *m.get((i, j)))
}

/// Copy a nalgebra matrix into a row-major smartcore matrix.
pub fn to_dense(m: &DMatrix<f64>) -> DenseMatrix<f64> {
    let (n, d) = m.shape();
    DenseMatrix::from_iterator(
        (0..n).flat_map(move |i| (0..d).map(move |j| m[(i, j)])),
        n,
        d,
        0,
    )
}

/// Latent positions produced by an embedder for a single graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Embedding {
    Undirected(DMatrix<f64>),
    Directed {
        out: DMatrix<f64>,
        inn: DMatrix<f64>,
    },
}

impl Embedding {
    pub fn is_directed(&self) -> bool {
        matches!(self, Embedding::Directed { .. })
    }

    /// Number of vertices (rows) in the embedding.
    pub fn n_vertices(&self) -> usize {
        match self {
            Embedding::Undirected(x) => x.nrows(),
            Embedding::Directed { out, .. } => out.nrows(),
        }
    }

    /// Flatten into a single point cloud; directed positions become `[out | in]`.
    pub fn into_positions(self) -> DMatrix<f64> {
        match self {
            Embedding::Undirected(x) => x,
            Embedding::Directed { out, inn } => {
                let d = out.ncols();
                DMatrix::from_fn(out.nrows(), d + inn.ncols(), |i, j| {
                    if j < d {
                        out[(i, j)]
                    } else {
                        inn[(i, j - d)]
                    }
                })
            }
        }
    }
}

/// Turn the two embeddings of a test into the point clouds `X` and `Y`.
///
/// Both must be directed or both undirected.
pub fn joint_positions(a: Embedding, b: Embedding) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    if a.is_directed() != b.is_directed() {
        return Err(LdtError::DirectednessMismatch);
    }
    Ok((a.into_positions(), b.into_positions()))
}

/// Check that two point clouds live in the same space.
pub fn check_same_width(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<usize> {
    if x.ncols() != y.ncols() {
        return Err(LdtError::DimensionMismatch {
            context: "embedding width",
            left: x.ncols(),
            right: y.ncols(),
        });
    }
    Ok(x.ncols())
}
