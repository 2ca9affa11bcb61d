//! Alignment of two latent-position clouds.
//!
//! Spectral embeddings are only identified up to an orthogonal transform, so
//! before comparing `X` and `Y` the test rotates `Y` onto `X`. An aligner
//! returns the `d×d` orthogonal matrix `Q`; the caller applies `Y ← Y·Q`.
//!
//! - `SignFlips`: per-dimension reflection so that the column medians of both
//!   clouds share a sign. Cheap and exact when the embeddings only differ by
//!   eigenvector signs.
//! - `SeedlessProcrustes`: expectation-maximisation over an entropic optimal
//!   transport plan between the clouds and the orthogonal Procrustes solution
//!   for that plan, started from the sign-flip solution. Handles general
//!   rotations; costs `O(N·M)` per Sinkhorn sweep.

use log::{debug, info, trace};
use nalgebra::DMatrix;

use crate::core::check_same_width;
use crate::error::{LdtError, Result};
use crate::operators::{column_median, sq_distance};

/// Computes the orthogonal `Q` that aligns `y` to `x`.
pub trait Aligner: Send + Sync {
    fn align(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SignFlips;

impl Aligner for SignFlips {
    fn align(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_same_width(x, y)?;
        Ok(sign_flips(x, y))
    }
}

/// Diagonal `Q` with `Q_kk = +1` when `median X_k · median Y_k > 0` and `-1`
/// otherwise, so a zero median flips its dimension.
pub fn sign_flips(x: &DMatrix<f64>, y: &DMatrix<f64>) -> DMatrix<f64> {
    let d = x.ncols();
    let flips: Vec<f64> = (0..d)
        .map(|k| {
            if column_median(x, k) * column_median(y, k) > 0.0 {
                1.0
            } else {
                -1.0
            }
        })
        .collect();
    trace!("sign flips: {:?}", flips);
    DMatrix::from_fn(d, d, |i, j| if i == j { flips[i] } else { 0.0 })
}

/// EM seedless Procrustes alignment.
#[derive(Clone, Debug)]
pub struct SeedlessProcrustes {
    /// Entropic regularisation of the transport problem.
    pub optimal_transport_lambda: f64,
    /// Sinkhorn stops once the row marginals are this close (L1).
    pub optimal_transport_eps: f64,
    pub optimal_transport_num_reps: usize,
    pub iterative_num_reps: usize,
    /// EM stops once `‖Q_{t+1} − Q_t‖_F` falls below this.
    pub iterative_eps: f64,
}

impl Default for SeedlessProcrustes {
    fn default() -> Self {
        Self {
            optimal_transport_lambda: 0.1,
            optimal_transport_eps: 0.01,
            optimal_transport_num_reps: 1000,
            iterative_num_reps: 100,
            iterative_eps: 1e-6,
        }
    }
}

impl Aligner for SeedlessProcrustes {
    fn align(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_same_width(x, y)?;
        info!(
            "SeedlessProcrustes: N={}, M={}, d={}, lambda={}",
            x.nrows(),
            y.nrows(),
            x.ncols(),
            self.optimal_transport_lambda
        );

        let mut q = sign_flips(x, y);
        for iteration in 0..self.iterative_num_reps {
            let aligned = y * &q;
            let plan = self.transport_plan(x, &aligned);
            let next = procrustes(x, y, &plan)?;
            let delta = (&next - &q).norm();
            q = next;
            trace!("EM iteration {}: ‖ΔQ‖={:.3e}", iteration, delta);
            if delta < self.iterative_eps {
                debug!("SeedlessProcrustes converged after {} iterations", iteration + 1);
                break;
            }
        }
        Ok(q)
    }
}

impl SeedlessProcrustes {
    /// Entropic transport plan between uniform measures on the rows of `x`
    /// and `y`, with squared Euclidean cost. Log-domain Sinkhorn.
    pub fn transport_plan(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> DMatrix<f64> {
        let (n, m) = (x.nrows(), y.nrows());
        let eps = self.optimal_transport_lambda;
        let cost = DMatrix::from_fn(n, m, |i, j| sq_distance(x, i, y, j));
        let log_a = -(n as f64).ln();
        let log_b = -(m as f64).ln();

        let mut f = vec![0.0; n];
        let mut g = vec![0.0; m];
        for sweep in 0..self.optimal_transport_num_reps {
            for (i, fi) in f.iter_mut().enumerate() {
                *fi = eps * log_a - eps * log_sum_exp((0..m).map(|j| (g[j] - cost[(i, j)]) / eps));
            }
            for (j, gj) in g.iter_mut().enumerate() {
                *gj = eps * log_b - eps * log_sum_exp((0..n).map(|i| (f[i] - cost[(i, j)]) / eps));
            }

            let a = 1.0 / n as f64;
            let row_err: f64 = (0..n)
                .map(|i| {
                    let mass: f64 = (0..m)
                        .map(|j| ((f[i] + g[j] - cost[(i, j)]) / eps).exp())
                        .sum();
                    (mass - a).abs()
                })
                .sum();
            if row_err < self.optimal_transport_eps {
                trace!("Sinkhorn converged after {} sweeps", sweep + 1);
                break;
            }
        }

        DMatrix::from_fn(n, m, |i, j| ((f[i] + g[j] - cost[(i, j)]) / eps).exp())
    }
}

/// Orthogonal `Q` maximising `tr(Qᵀ Yᵀ Pᵀ X)`.
pub fn procrustes(x: &DMatrix<f64>, y: &DMatrix<f64>, plan: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let cross = y.transpose() * plan.transpose() * x;
    let svd = cross.svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| LdtError::Numerical("Procrustes SVD did not return U".into()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| LdtError::Numerical("Procrustes SVD did not return Vᵀ".into()))?;
    Ok(u * v_t)
}

fn log_sum_exp(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.map(|v| (v - max).exp()).sum::<f64>().ln()
}
