use approx::assert_abs_diff_eq;
use nalgebra::DMatrix;

use crate::align::*;
use crate::error::LdtError;
use crate::tests::init;
use crate::tests::test_data::{gaussian_cloud, rotation};

use log::debug;

/// Anisotropic cloud whose column medians are clearly positive.
fn skewed_cloud(n: usize, seed: u64) -> DMatrix<f64> {
    let mut x = gaussian_cloud(n, &[0.0, 0.0], 1.0, seed);
    for i in 0..n {
        x[(i, 0)] = 2.0 + 1.0 * x[(i, 0)];
        x[(i, 1)] = 1.0 + 0.3 * x[(i, 1)];
    }
    x
}

fn assert_orthogonal(q: &DMatrix<f64>) {
    let qtq = q.transpose() * q;
    let identity = DMatrix::<f64>::identity(q.nrows(), q.ncols());
    for (a, b) in qtq.iter().zip(identity.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn test_sign_flips_undo_reflected_columns() {
    init();
    let x = skewed_cloud(15, 1);
    let mut y = x.clone();
    for i in 0..15 {
        y[(i, 1)] = -y[(i, 1)];
    }
    let q = SignFlips.align(&x, &y).unwrap();
    assert_eq!(q, DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]));
    assert_eq!(&y * &q, x);
}

#[test]
fn test_sign_flips_zero_median_flips() {
    let x = DMatrix::from_row_slice(3, 2, &[-1.0, 1.0, 0.0, 2.0, 1.0, 3.0]);
    let y = DMatrix::from_row_slice(3, 2, &[2.0, 1.0, 3.0, 2.0, 4.0, 3.0]);
    let q = sign_flips(&x, &y);
    // first column of x has median 0
    assert_eq!(q[(0, 0)], -1.0);
    assert_eq!(q[(1, 1)], 1.0);
}

#[test]
fn test_procrustes_recovers_rotation_with_known_matching() {
    let x = skewed_cloud(12, 2);
    let y = &x * rotation(0.7);
    let plan = DMatrix::<f64>::identity(12, 12) / 12.0;
    let q = procrustes(&x, &y, &plan).unwrap();

    assert_orthogonal(&q);
    let aligned = &y * &q;
    assert_abs_diff_eq!((aligned - &x).norm(), 0.0, epsilon = 1e-9);
}

#[test]
fn test_transport_plan_marginals() {
    init();
    let x = skewed_cloud(8, 3);
    let y = skewed_cloud(5, 4);
    let aligner = SeedlessProcrustes::default();
    let plan = aligner.transport_plan(&x, &y);

    assert_eq!(plan.shape(), (8, 5));
    // the final Sinkhorn half-step fixes the column marginals exactly
    for j in 0..5 {
        assert_abs_diff_eq!(plan.column(j).sum(), 1.0 / 5.0, epsilon = 1e-9);
    }
    let row_err: f64 = (0..8).map(|i| (plan.row(i).sum() - 1.0 / 8.0).abs()).sum();
    assert!(row_err < aligner.optimal_transport_eps + 1e-9, "row error {}", row_err);
}

#[test]
fn test_seedless_procrustes_undoes_rotation() {
    init();
    let x = skewed_cloud(30, 5);
    let y = &x * rotation(0.2);
    let aligner = SeedlessProcrustes {
        optimal_transport_lambda: 0.01,
        ..SeedlessProcrustes::default()
    };
    let q = aligner.align(&x, &y).unwrap();
    assert_orthogonal(&q);

    let before = (&y - &x).norm();
    let after = (&y * &q - &x).norm();
    debug!("alignment error before {:.4}, after {:.4}", before, after);
    assert!(after < before);
    assert!(after / x.norm() < 0.1);
}

#[test]
fn test_aligners_reject_width_mismatch() {
    let x = DMatrix::<f64>::zeros(4, 2);
    let y = DMatrix::<f64>::zeros(4, 3);
    assert!(matches!(SignFlips.align(&x, &y), Err(LdtError::DimensionMismatch { .. })));
    assert!(matches!(
        SeedlessProcrustes::default().align(&x, &y),
        Err(LdtError::DimensionMismatch { .. })
    ));
}
