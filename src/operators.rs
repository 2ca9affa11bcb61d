//! Small dense linear-algebra helpers shared by the estimator, the kernels and
//! the aligners.
//!
//! - squared Euclidean distance between rows of two point clouds
//! - symmetric square root of a PSD covariance (for Gaussian draws)
//! - reciprocal condition number from singular values
//! - median of a column

use nalgebra::{DMatrix, SymmetricEigen};

use crate::error::{LdtError, Result};

/// Relative size of a negative eigenvalue still treated as round-off.
pub const PSD_TOLERANCE: f64 = 1e-8;

/// Squared Euclidean distance between row `i` of `x` and row `j` of `y`.
#[inline]
pub fn sq_distance(x: &DMatrix<f64>, i: usize, y: &DMatrix<f64>, j: usize) -> f64 {
    debug_assert_eq!(x.ncols(), y.ncols());
    (0..x.ncols())
        .map(|k| {
            let diff = x[(i, k)] - y[(j, k)];
            diff * diff
        })
        .sum()
}

/// Symmetric square root `S` with `S Sᵀ = sigma` for a PSD matrix.
///
/// Eigenvalues slightly below zero are clamped; anything more negative than
/// `PSD_TOLERANCE` relative to the spectrum fails.
pub fn psd_sqrt(sigma: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let eigen = SymmetricEigen::new(sigma.clone());
    let scale = eigen
        .eigenvalues
        .iter()
        .fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let mut roots = eigen.eigenvalues.clone();
    for v in roots.iter_mut() {
        if *v < -PSD_TOLERANCE * scale {
            return Err(LdtError::Numerical(format!(
                "covariance is not positive semi-definite (eigenvalue {:.3e})",
                v
            )));
        }
        *v = v.max(0.0).sqrt();
    }
    let q = &eigen.eigenvectors;
    Ok(q * DMatrix::from_diagonal(&roots) * q.transpose())
}

/// Ratio of smallest to largest singular value; `0.0` for a singular matrix.
pub fn reciprocal_condition(m: &DMatrix<f64>) -> f64 {
    let sv = m.singular_values();
    let max = sv.iter().cloned().fold(0.0_f64, f64::max);
    let min = sv.iter().cloned().fold(f64::INFINITY, f64::min);
    if max <= 0.0 || !min.is_finite() {
        0.0
    } else {
        min / max
    }
}

/// Median of column `k`, averaging the two middle values for even lengths.
pub fn column_median(m: &DMatrix<f64>, k: usize) -> f64 {
    let mut v: Vec<f64> = m.column(k).iter().copied().collect();
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid]
    } else {
        0.5 * (v[mid - 1] + v[mid])
    }
}
