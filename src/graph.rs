use nalgebra::DMatrix;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::core::to_dmatrix;
use crate::error::{LdtError, Result};

use log::{debug, trace};

/// Entries closer than this are treated as equal when checking symmetry.
pub const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// A validated adjacency matrix.
///
/// Edge weights are passed through untouched; a graph is directed when its
/// adjacency matrix is not symmetric.
#[derive(Debug, Clone)]
pub struct Graph {
    pub adjacency: DMatrix<f64>,
    directed: bool,
}

impl Graph {
    /// Validate and wrap an adjacency matrix.
    ///
    /// Fails when the matrix is empty, not square or holds non-finite weights.
    pub fn from_adjacency(adjacency: &DenseMatrix<f64>) -> Result<Self> {
        Self::from_dmatrix(to_dmatrix(adjacency))
    }

    pub fn from_dmatrix(adjacency: DMatrix<f64>) -> Result<Self> {
        let (rows, cols) = adjacency.shape();
        if rows == 0 {
            return Err(LdtError::InvalidGraph("adjacency matrix is empty".into()));
        }
        if rows != cols {
            return Err(LdtError::InvalidGraph(format!(
                "adjacency matrix must be square, got {}×{}",
                rows, cols
            )));
        }
        if let Some(bad) = adjacency.iter().find(|v| !v.is_finite()) {
            return Err(LdtError::InvalidGraph(format!(
                "adjacency matrix holds a non-finite weight ({})",
                bad
            )));
        }

        let directed = !is_symmetric(&adjacency);
        debug!(
            "Imported graph: {} vertices, {}",
            rows,
            if directed { "directed" } else { "undirected" }
        );
        Ok(Self {
            adjacency,
            directed,
        })
    }

    pub fn n_vertices(&self) -> usize {
        self.adjacency.nrows()
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Copy of the adjacency matrix with the diagonal replaced by the scaled
    /// degree `deg(i) / (n - 1)`.
    ///
    /// For directed graphs the degree is the mean of in- and out-weight.
    pub fn augment_diagonal(&self) -> DMatrix<f64> {
        let n = self.n_vertices();
        let mut out = self.adjacency.clone();
        if n < 2 {
            return out;
        }
        let divisor = (n - 1) as f64;
        for i in 0..n {
            let mut row = 0.0;
            let mut col = 0.0;
            for j in 0..n {
                if j != i {
                    row += self.adjacency[(i, j)];
                    col += self.adjacency[(j, i)];
                }
            }
            let degree = if self.directed { 0.5 * (row + col) } else { row };
            out[(i, i)] = degree / divisor;
        }
        trace!("Augmented diagonal for {} vertices", n);
        out
    }
}

/// Symmetric up to `SYMMETRY_TOLERANCE`.
pub fn is_symmetric(m: &DMatrix<f64>) -> bool {
    let n = m.nrows();
    if n != m.ncols() {
        return false;
    }
    (0..n).all(|i| (i + 1..n).all(|j| (m[(i, j)] - m[(j, i)]).abs() <= SYMMETRY_TOLERANCE))
}
