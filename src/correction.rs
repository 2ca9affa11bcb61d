//! Correction for unequal sample sizes.
//!
//! The embedding of a larger graph is less noisy than that of a smaller one,
//! which breaks the exchangeability the permutation test relies on. The gap
//! is closed by giving every point of the larger sample an extra covariance
//! of `(N − M)/(N·M)` times its asymptotic variance, either by sampling that
//! noise (`sample_modified_ase`) or by integrating it out in the kernel
//! (`KernelKind::Expected`).
//!
//! Two ways of estimating the per-point variance are available:
//! - `Isotropic` (default): the asymptotic variance is replaced by `I_d`, so
//!   every point of the larger sample gets `(N − M)/(N·M) · I_d`. This is a
//!   constant approximation, not the per-point plug-in value.
//! - `PlugIn { pooled }`: the plug-in RDPG estimate from `variance`, fitted on
//!   both samples together (`pooled`) or on the larger sample alone.

use log::{debug, info, trace};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::core::check_same_width;
use crate::error::Result;
use crate::operators::psd_sqrt;
use crate::variance::PlugInVarianceEstimator;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionVariance {
    #[default]
    Isotropic,
    PlugIn { pooled: bool },
}

/// Per-point correction covariances for both samples.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionVariances {
    pub x: Vec<DMatrix<f64>>,
    pub y: Vec<DMatrix<f64>>,
}

impl CorrectionVariances {
    /// All-zero covariances: no correction.
    pub fn zeros(n: usize, m: usize, d: usize) -> Self {
        Self {
            x: vec![DMatrix::zeros(d, d); n],
            y: vec![DMatrix::zeros(d, d); m],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x.iter().chain(self.y.iter()).all(|s| s.iter().all(|&v| v == 0.0))
    }
}

/// Correction covariances for `x_hat` (`N×d`) and `y_hat` (`M×d`).
///
/// Only the larger sample receives non-zero covariances; equal sizes give
/// all-zero covariances.
pub fn estimate_correction_variances(
    x_hat: &DMatrix<f64>,
    y_hat: &DMatrix<f64>,
    method: CorrectionVariance,
) -> Result<CorrectionVariances> {
    let d = check_same_width(x_hat, y_hat)?;
    let (n, m) = (x_hat.nrows(), y_hat.nrows());
    let mut out = CorrectionVariances::zeros(n, m, d);
    if n == m {
        debug!("Equal sample sizes ({}), no size correction", n);
        return Ok(out);
    }

    let (larger, smaller) = if n > m { (x_hat, y_hat) } else { (y_hat, x_hat) };
    let factor = (n.abs_diff(m)) as f64 / (n * m) as f64;
    info!(
        "Size correction {:?}: N={}, M={}, factor={:.6}",
        method, n, m, factor
    );

    let sigmas = match method {
        CorrectionVariance::Isotropic => {
            vec![DMatrix::identity(d, d) * factor; larger.nrows()]
        }
        CorrectionVariance::PlugIn { pooled } => {
            let estimator = if pooled {
                let mut both = DMatrix::zeros(n + m, d);
                both.rows_mut(0, larger.nrows()).copy_from(larger);
                both.rows_mut(larger.nrows(), smaller.nrows()).copy_from(smaller);
                PlugInVarianceEstimator::fit(&both)?
            } else {
                PlugInVarianceEstimator::fit(larger)?
            };
            estimator
                .estimate(larger)?
                .into_iter()
                .map(|s| s * factor)
                .collect()
        }
    };

    if n > m {
        out.x = sigmas;
    } else {
        out.y = sigmas;
    }
    Ok(out)
}

/// Add one `N(0, Σ_i)` draw to every point of the larger sample.
///
/// The smaller sample is returned unchanged; equal sizes return both inputs
/// unchanged.
pub fn sample_modified_ase<R: Rng + ?Sized>(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    method: CorrectionVariance,
    rng: &mut R,
) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    check_same_width(x, y)?;
    let (n, m) = (x.nrows(), y.nrows());
    if n == m {
        return Ok((x.clone(), y.clone()));
    }
    let variances = estimate_correction_variances(x, y, method)?;
    if n > m {
        Ok((perturb(x, &variances.x, rng)?, y.clone()))
    } else {
        Ok((x.clone(), perturb(y, &variances.y, rng)?))
    }
}

fn perturb<R: Rng + ?Sized>(
    points: &DMatrix<f64>,
    sigmas: &[DMatrix<f64>],
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    let d = points.ncols();
    let mut out = points.clone();
    for (i, sigma) in sigmas.iter().enumerate() {
        let root = psd_sqrt(sigma)?;
        let z: DVector<f64> = DVector::from_fn(d, |_, _| StandardNormal.sample(&mut *rng));
        let noise = root * z;
        for k in 0..d {
            out[(i, k)] += noise[k];
        }
    }
    trace!("Perturbed {} points", sigmas.len());
    Ok(out)
}
