//! Plug-in estimator of the RDPG central-limit-theorem covariance.
//!
//! For an adjacency spectral embedding `X` (`n×d`), the asymptotic covariance
//! of the estimated latent position at `x` is estimated by
//!
//! ```text
//! Δ        = (1/n) XᵀX
//! middle_x = Σ_i [ (x·X_i) − (x·X_i)² ] X_i X_iᵀ
//! cov(x)   = Δ⁻¹ (middle_x / n) Δ⁻¹
//! ```
//!
//! (Athreya et al., RDPG survey, eq. 10). The middle term is evaluated as
//! `Xᵀ diag(w) X` with `w_i = (x·X_i) − (x·X_i)²`, one query point per rayon task.

use log::{debug, info};
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::error::{LdtError, Result};
use crate::operators::reciprocal_condition;

/// `Δ` whose reciprocal condition number falls below this is rejected.
pub const MIN_RECIPROCAL_CONDITION: f64 = 1e-12;

#[derive(Clone, Debug)]
pub struct PlugInVarianceEstimator {
    positions: DMatrix<f64>,
    delta_inverse: DMatrix<f64>,
}

impl PlugInVarianceEstimator {
    /// Fit on the embedding `x`.
    ///
    /// Fails with `LdtError::Numerical` when `XᵀX/n` is singular or too
    /// ill-conditioned to invert; no regularisation is attempted.
    pub fn fit(x: &DMatrix<f64>) -> Result<Self> {
        let (n, d) = x.shape();
        if n == 0 || d == 0 {
            return Err(LdtError::Numerical(format!(
                "cannot fit a variance estimator on a {}×{} embedding",
                n, d
            )));
        }
        let delta = x.transpose() * x / n as f64;

        let rcond = reciprocal_condition(&delta);
        if rcond < MIN_RECIPROCAL_CONDITION {
            return Err(LdtError::Numerical(format!(
                "second-moment matrix is singular or ill-conditioned (rcond={:.3e})",
                rcond
            )));
        }
        let delta_inverse = delta.try_inverse().ok_or_else(|| {
            LdtError::Numerical("second-moment matrix could not be inverted".into())
        })?;

        info!("Fitted plug-in variance estimator on n={} points, d={}", n, d);
        debug!("rcond(Δ)={:.3e}", rcond);
        Ok(Self {
            positions: x.clone(),
            delta_inverse,
        })
    }

    pub fn dim(&self) -> usize {
        self.positions.ncols()
    }

    /// One `d×d` covariance per row of `points`.
    pub fn estimate(&self, points: &DMatrix<f64>) -> Result<Vec<DMatrix<f64>>> {
        if points.ncols() != self.dim() {
            return Err(LdtError::DimensionMismatch {
                context: "variance estimator query",
                left: points.ncols(),
                right: self.dim(),
            });
        }
        let n = self.positions.nrows() as f64;
        let x = &self.positions;
        // (k×n) matrix of inner products between query points and fitted points
        let dots = points * x.transpose();

        let covariances: Vec<DMatrix<f64>> = (0..points.nrows())
            .into_par_iter()
            .map(|b| {
                let weights = dots.row(b).map(|p| p - p * p);
                let mut weighted = x.clone();
                for (i, mut row) in weighted.row_iter_mut().enumerate() {
                    row *= weights[i];
                }
                let middle = x.transpose() * weighted / n;
                &self.delta_inverse * middle * &self.delta_inverse
            })
            .collect();
        Ok(covariances)
    }

    /// Covariance at a single point (promoted to a `1×d` query).
    pub fn estimate_point(&self, point: &[f64]) -> Result<DMatrix<f64>> {
        let query = DMatrix::from_row_slice(1, point.len(), point);
        let mut out = self.estimate(&query)?;
        out.pop()
            .ok_or_else(|| LdtError::Numerical("empty covariance estimate".into()))
    }
}
