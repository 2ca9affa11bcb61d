//! # Gaussian kernel matrices over the union of two samples
//!
//! ## Kernels
//!
//! 1. **Regular RBF**: `k(x, y) = exp(−‖x − y‖² / (2h²))` for bandwidth `h`.
//! 2. **Expected RBF**: the expectation of the regular kernel when the
//!    difference `Z = x − y` is Gaussian, `Z ~ N(μ, Σ)` with `μ = x − y` and
//!    `Σ = Σ_x + Σ_y`. With `c = 1/(2h²)`:
//!
//!    ```text
//!    E[exp(−c‖Z‖²)] = exp(−c μᵀ(I + 2cΣ)⁻¹μ) / det(I + 2cΣ)^{1/2}
//!    ```
//!
//!    `I + 2cΣ` is factored once per pair (Cholesky); its square-root
//!    determinant is the product of the factor's diagonal. With `Σ = 0` this
//!    is the regular kernel.
//!
//! ## Layout
//!
//! The assembled matrix is `(N+M)×(N+M)`:
//!
//! ```text
//! [ K_XX   K_XY ]
//! [ K_XYᵀ  K_YY ]
//! ```
//!
//! The diagonals of `K_XX` and `K_YY` are set to exactly `1`. Within-sample
//! blocks are computed on the upper triangle and mirrored, so the result is
//! exactly symmetric. Rows are computed in parallel.
//!
//! ## Complexity
//! - Regular: `O((N+M)² d)`
//! - Expected: `O((N+M)² d³)` (one `d×d` factorisation per pair)

use log::{debug, info, trace};
use nalgebra::{Cholesky, DMatrix, DVector};
use rayon::prelude::*;
use smartcore::linalg::basic::arrays::Array2;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::core::check_same_width;
use crate::correction::CorrectionVariances;
use crate::error::{LdtError, Result};
use crate::operators::sq_distance;

/// Which kernel to evaluate; chosen once per fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelKind {
    Regular,
    Expected,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelBuilder {
    pub kind: KernelKind,
    pub bandwidth: f64,
}

impl KernelBuilder {
    pub fn new(kind: KernelKind, bandwidth: f64) -> Self {
        Self { kind, bandwidth }
    }

    /// Assemble the joint kernel matrix of `x` (first `N` rows) and `y`.
    ///
    /// `variances` is ignored by the regular kernel.
    pub fn kernel_matrix(
        &self,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
        variances: &CorrectionVariances,
    ) -> Result<DenseMatrix<f64>> {
        check_same_width(x, y)?;
        let (n, m) = (x.nrows(), y.nrows());
        info!(
            "Building {:?} kernel matrix: N={}, M={}, d={}, bandwidth={}",
            self.kind,
            n,
            m,
            x.ncols(),
            self.bandwidth
        );

        let (xx, yy, xy) = match self.kind {
            KernelKind::Regular => (
                regular_block(x, x, self.bandwidth, true),
                regular_block(y, y, self.bandwidth, true),
                regular_block(x, y, self.bandwidth, false),
            ),
            KernelKind::Expected => (
                expected_block(x, x, &variances.x, &variances.x, self.bandwidth, true)?,
                expected_block(y, y, &variances.y, &variances.y, self.bandwidth, true)?,
                expected_block(x, y, &variances.x, &variances.y, self.bandwidth, false)?,
            ),
        };

        let kernel = assemble(&xx, &yy, &xy);
        debug!("Kernel matrix assembled: {}×{}", n + m, n + m);
        Ok(kernel)
    }
}

/// Regular RBF kernel between every row of `x` and every row of `y`.
pub fn rbf_regular(x: &DMatrix<f64>, y: &DMatrix<f64>, bandwidth: f64) -> DMatrix<f64> {
    regular_block(x, y, bandwidth, false)
}

/// Expected RBF kernel between every row of `x` and every row of `y`.
pub fn rbf_expected(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    x_sigmas: &[DMatrix<f64>],
    y_sigmas: &[DMatrix<f64>],
    bandwidth: f64,
) -> Result<DMatrix<f64>> {
    expected_block(x, y, x_sigmas, y_sigmas, bandwidth, false)
}

fn regular_block(x: &DMatrix<f64>, y: &DMatrix<f64>, bandwidth: f64, within: bool) -> DMatrix<f64> {
    let c = 0.5 / (bandwidth * bandwidth);
    let rows: Vec<Vec<f64>> = (0..x.nrows())
        .into_par_iter()
        .map(|i| {
            let start = if within { i + 1 } else { 0 };
            (start..y.nrows())
                .map(|j| (-c * sq_distance(x, i, y, j)).exp())
                .collect()
        })
        .collect();
    fill_block(rows, x.nrows(), y.nrows(), within)
}

fn expected_block(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    x_sigmas: &[DMatrix<f64>],
    y_sigmas: &[DMatrix<f64>],
    bandwidth: f64,
    within: bool,
) -> Result<DMatrix<f64>> {
    check_same_width(x, y)?;
    check_sigmas(x_sigmas, x.nrows(), x.ncols())?;
    check_sigmas(y_sigmas, y.nrows(), y.ncols())?;

    let c = 0.5 / (bandwidth * bandwidth);
    let d = x.ncols();
    let identity = DMatrix::<f64>::identity(d, d);

    let rows: Vec<Vec<f64>> = (0..x.nrows())
        .into_par_iter()
        .map(|i| {
            let start = if within { i + 1 } else { 0 };
            (start..y.nrows())
                .map(|j| {
                    let mu = DVector::from_fn(d, |k, _| x[(i, k)] - y[(j, k)]);
                    let a = &identity + (&x_sigmas[i] + &y_sigmas[j]) * (2.0 * c);
                    expected_pair(&mu, a, c)
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;
    Ok(fill_block(rows, x.nrows(), y.nrows(), within))
}

/// One `d×d` covariance per point.
fn check_sigmas(sigmas: &[DMatrix<f64>], n: usize, d: usize) -> Result<()> {
    if sigmas.len() != n {
        return Err(LdtError::DimensionMismatch {
            context: "correction variance count vs points",
            left: sigmas.len(),
            right: n,
        });
    }
    if let Some(bad) = sigmas.iter().find(|s| s.shape() != (d, d)) {
        return Err(LdtError::DimensionMismatch {
            context: "correction variance shape vs embedding width",
            left: bad.nrows().max(bad.ncols()),
            right: d,
        });
    }
    Ok(())
}

/// `exp(−c μᵀA⁻¹μ) / det(A)^{1/2}` for `A = I + 2cΣ`.
fn expected_pair(mu: &DVector<f64>, a: DMatrix<f64>, c: f64) -> Result<f64> {
    let chol = Cholesky::new(a).ok_or_else(|| {
        LdtError::Numerical("I + 2cΣ is not positive definite".into())
    })?;
    let sqrt_det: f64 = chol.l_dirty().diagonal().iter().product();
    let quad = mu.dot(&chol.solve(mu));
    Ok((-c * quad).exp() / sqrt_det)
}

/// Place computed rows into an `n×m` block; within-sample blocks hold only
/// the strict upper triangle and get a unit diagonal.
fn fill_block(rows: Vec<Vec<f64>>, n: usize, m: usize, within: bool) -> DMatrix<f64> {
    let mut block = DMatrix::zeros(n, m);
    for (i, row) in rows.into_iter().enumerate() {
        let start = if within { i + 1 } else { 0 };
        for (offset, v) in row.into_iter().enumerate() {
            let j = start + offset;
            block[(i, j)] = v;
            if within {
                block[(j, i)] = v;
            }
        }
        if within {
            block[(i, i)] = 1.0;
        }
    }
    trace!("Filled {}×{} kernel block (within={})", n, m, within);
    block
}

fn assemble(xx: &DMatrix<f64>, yy: &DMatrix<f64>, xy: &DMatrix<f64>) -> DenseMatrix<f64> {
    let n = xx.nrows();
    let total = n + yy.nrows();
    DenseMatrix::from_iterator(
        (0..total).flat_map(move |i| {
            (0..total).map(move |j| match (i < n, j < n) {
                (true, true) => xx[(i, j)],
                (true, false) => xy[(i, j - n)],
                (false, true) => xy[(j, i - n)],
                (false, false) => yy[(i - n, j - n)],
            })
        }),
        total,
        total,
        0,
    )
}
