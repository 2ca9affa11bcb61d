//! Unbiased two-sample statistic on a joint kernel matrix.
//!
//! With the first `N` rows/columns of `K` belonging to `X` and the remaining
//! `M` to `Y`:
//!
//! ```text
//! U = [ΣK_XX − N] / (N(N−1)) − 2 ΣK_XY / (N·M) + [ΣK_YY − M] / (M(M−1))
//! ```
//!
//! Subtracting `N` and `M` removes the unit diagonals of the within-sample
//! blocks.

use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{LdtError, Result};

/// `U` for the kernel matrix in its original order.
pub fn u_statistic(kernel: &DenseMatrix<f64>, n: usize, m: usize) -> Result<f64> {
    check_kernel(kernel, n, m)?;
    let order: Vec<usize> = (0..n + m).collect();
    Ok(permuted_u_statistic(kernel, &order, n))
}

/// Validate sample sizes and the kernel shape for a `(N, M)` split.
pub fn check_kernel(kernel: &DenseMatrix<f64>, n: usize, m: usize) -> Result<()> {
    if n < 2 || m < 2 {
        return Err(LdtError::DegenerateInput { n, m });
    }
    let (rows, cols) = kernel.shape();
    if rows != cols {
        return Err(LdtError::DimensionMismatch {
            context: "kernel matrix rows vs columns",
            left: rows,
            right: cols,
        });
    }
    if rows != n + m {
        return Err(LdtError::DimensionMismatch {
            context: "kernel matrix size vs N+M",
            left: rows,
            right: n + m,
        });
    }
    Ok(())
}

/// `U` for the kernel matrix with rows and columns reordered by `order`.
///
/// `order[..n]` are the indices treated as `X`, `order[n..]` as `Y`. The
/// matrix is read through the index map; no permuted copy is built. Inputs
/// are assumed valid (see `check_kernel`).
pub fn permuted_u_statistic(kernel: &DenseMatrix<f64>, order: &[usize], n: usize) -> f64 {
    let (xs, ys) = order.split_at(n);
    let m = ys.len();

    let block_sum = |rows: &[usize], cols: &[usize]| -> f64 {
        rows.iter()
            .map(|&i| cols.iter().map(|&j| *kernel.get((i, j))).sum::<f64>())
            .sum()
    };

    let (nf, mf) = (n as f64, m as f64);
    let x_stat = (block_sum(xs, xs) - nf) / (nf * (nf - 1.0));
    let y_stat = (block_sum(ys, ys) - mf) / (mf * (mf - 1.0));
    let xy_stat = block_sum(ys, xs) / (nf * mf);
    x_stat - 2.0 * xy_stat + y_stat
}
