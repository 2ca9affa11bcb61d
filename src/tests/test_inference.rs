use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::bootstrap::CancellationToken;
use crate::core::to_dense;
use crate::correction::CorrectionVariance;
use crate::error::LdtError;
use crate::inference::{FitStage, LatentDistributionTest};
use crate::params::{Alignment, SizeCorrection};
use crate::tests::init;
use crate::tests::test_data::{directed_erdos_renyi, erdos_renyi, gaussian_cloud_dense};

use log::debug;

fn embedding_test(n_bootstraps: i64) -> LatentDistributionTest {
    LatentDistributionTest::builder()
        .with_pass_graph(false)
        .with_alignment(None)
        .with_n_bootstraps(n_bootstraps)
        .with_seed(2024)
        .build()
        .unwrap()
}

fn assert_valid_p(p: f64, n_bootstraps: usize) {
    assert!(p > 0.0 && p <= 1.0, "p={} out of (0, 1]", p);
    let scaled = p * (n_bootstraps + 1) as f64;
    assert_abs_diff_eq!(scaled, scaled.round(), epsilon = 1e-9);
}

fn assert_same_kernel(a: &DenseMatrix<f64>, b: &DenseMatrix<f64>) {
    assert_eq!(a.shape(), b.shape());
    let (rows, cols) = a.shape();
    for i in 0..rows {
        for j in 0..cols {
            assert_eq!(a.get((i, j)), b.get((i, j)), "kernels differ at ({}, {})", i, j);
        }
    }
}

#[test]
fn test_identical_clouds_are_not_rejected() {
    init();
    let x = gaussian_cloud_dense(20, &[0.0, 0.0], 1.0, 1);
    let mut ldt = embedding_test(100);
    let p = ldt.fit(&x, &x).unwrap();
    let u = ldt.sample_t_statistic().unwrap();
    debug!("identical clouds: U={:.6}, p={:.4}", u, p);

    // duplicated points: U lies in [-2/N, 0]
    assert!(u <= 1e-12 && u >= -0.1 - 1e-12);
    assert!(p > 0.5);
    assert_valid_p(p, 100);
    assert_eq!(ldt.stage(), FitStage::Done);
}

#[test]
fn test_separated_clusters_are_rejected() {
    init();
    let x = gaussian_cloud_dense(20, &[0.0, 0.0], 0.1, 2);
    let y = gaussian_cloud_dense(20, &[5.0, 5.0], 0.1, 3);
    let mut ldt = embedding_test(100);
    let p = ldt.fit(&x, &y).unwrap();
    let u = ldt.sample_t_statistic().unwrap();
    debug!("separated clusters: U={:.6}, p={:.4}", u, p);

    assert!(u > 1.0);
    assert!(p < 0.05);
    assert_valid_p(p, 100);
}

#[test]
fn test_outcome_shapes() {
    init();
    let x = gaussian_cloud_dense(12, &[0.0, 0.0], 1.0, 4);
    let y = gaussian_cloud_dense(9, &[0.3, 0.0], 1.0, 5);
    let mut ldt = LatentDistributionTest::builder()
        .with_pass_graph(false)
        .with_n_bootstraps(40)
        .with_seed(1)
        .build()
        .unwrap();
    let p = ldt.fit(&x, &y).unwrap();

    assert_valid_p(p, 40);
    assert_eq!(ldt.null_distribution().unwrap().len(), 40);
    let kernel = ldt.kernel_matrix().unwrap();
    assert_eq!(kernel.shape(), (21, 21));
    for i in 0..21 {
        assert_eq!(*kernel.get((i, i)), 1.0);
        for j in 0..21 {
            assert_eq!(kernel.get((i, j)), kernel.get((j, i)));
        }
    }
    let outcome = ldt.outcome().unwrap();
    assert_eq!(outcome.resolved.n_components, 2);
    assert_eq!(outcome.resolved.alignment, Some(Alignment::SignFlips));
}

#[test]
fn test_same_seed_same_result() {
    let x = gaussian_cloud_dense(10, &[0.0, 0.0], 1.0, 6);
    let y = gaussian_cloud_dense(14, &[0.5, 0.5], 1.0, 7);
    let mut first = embedding_test(30);
    let mut second = embedding_test(30);
    assert_eq!(first.fit(&x, &y).unwrap(), second.fit(&x, &y).unwrap());
    assert_eq!(first.null_distribution(), second.null_distribution());
}

#[test]
fn test_swapping_inputs_keeps_statistic() {
    init();
    let x = gaussian_cloud_dense(20, &[0.0, 0.0], 1.0, 8);
    let y = gaussian_cloud_dense(15, &[0.5, 0.0], 1.0, 9);
    let mut forward = embedding_test(10);
    let mut backward = embedding_test(10);
    forward.fit(&x, &y).unwrap();
    backward.fit(&y, &x).unwrap();
    assert_abs_diff_eq!(
        forward.sample_t_statistic().unwrap(),
        backward.sample_t_statistic().unwrap(),
        epsilon = 1e-12
    );
}

#[test]
fn test_equal_sizes_size_correction_is_identity() {
    init();
    let x = gaussian_cloud_dense(10, &[0.0, 0.0], 1.0, 10);
    let y = gaussian_cloud_dense(10, &[1.0, 0.0], 1.0, 11);
    let mut plain = embedding_test(10);
    plain.fit(&x, &y).unwrap();

    for correction in [SizeCorrection::Expected, SizeCorrection::Sampling] {
        let mut corrected = LatentDistributionTest::builder()
            .with_pass_graph(false)
            .with_alignment(None)
            .with_n_bootstraps(10)
            .with_size_correction(Some(correction))
            .with_n_samples(3)
            .with_seed(2024)
            .build()
            .unwrap();
        corrected.fit(&x, &y).unwrap();
        assert_same_kernel(plain.kernel_matrix().unwrap(), corrected.kernel_matrix().unwrap());
        assert_eq!(plain.sample_t_statistic(), corrected.sample_t_statistic());
    }
}

#[test]
fn test_sampling_with_zero_draws_is_uncorrected() {
    let x = gaussian_cloud_dense(12, &[0.0, 0.0], 1.0, 12);
    let y = gaussian_cloud_dense(6, &[0.0, 0.0], 1.0, 13);
    let mut plain = embedding_test(10);
    plain.fit(&x, &y).unwrap();

    let mut zero_draws = LatentDistributionTest::builder()
        .with_pass_graph(false)
        .with_alignment(None)
        .with_n_bootstraps(10)
        .with_size_correction(Some(SizeCorrection::Sampling))
        .with_n_samples(0)
        .with_seed(2024)
        .build()
        .unwrap();
    zero_draws.fit(&x, &y).unwrap();
    assert_same_kernel(plain.kernel_matrix().unwrap(), zero_draws.kernel_matrix().unwrap());
}

#[test]
fn test_size_corrections_with_unequal_sizes() {
    init();
    let x = gaussian_cloud_dense(25, &[0.4, 0.3], 0.1, 14);
    let y = gaussian_cloud_dense(10, &[0.4, 0.3], 0.1, 15);
    let cases = [
        (SizeCorrection::Expected, CorrectionVariance::Isotropic),
        (SizeCorrection::Expected, CorrectionVariance::PlugIn { pooled: true }),
        (SizeCorrection::Sampling, CorrectionVariance::Isotropic),
        (SizeCorrection::Sampling, CorrectionVariance::PlugIn { pooled: false }),
    ];
    for (correction, variance) in cases {
        let mut ldt = LatentDistributionTest::builder()
            .with_pass_graph(false)
            .with_n_bootstraps(20)
            .with_size_correction(Some(correction))
            .with_correction_variance(variance)
            .with_n_samples(3)
            .with_seed(5)
            .build()
            .unwrap();
        let p = ldt.fit(&x, &y).unwrap();
        debug!("{:?}/{:?}: U={:?}, p={}", correction, variance, ldt.sample_t_statistic(), p);
        assert_valid_p(p, 20);

        let kernel = ldt.kernel_matrix().unwrap();
        assert_eq!(kernel.shape(), (35, 35));
        for i in 0..35 {
            assert_abs_diff_eq!(*kernel.get((i, i)), 1.0, epsilon = 1e-12);
            for j in 0..35 {
                let v = *kernel.get((i, j));
                assert!(v > 0.0 && v <= 1.0 + 1e-12);
            }
        }
    }
}

#[test]
fn test_seedless_procrustes_pipeline() {
    init();
    let x = gaussian_cloud_dense(15, &[1.0, 0.5], 0.3, 16);
    let y = gaussian_cloud_dense(12, &[1.0, 0.5], 0.3, 17);
    let mut ldt = LatentDistributionTest::builder()
        .with_pass_graph(false)
        .with_alignment(Some(Alignment::SeedlessProcrustes))
        .with_n_bootstraps(20)
        .with_seed(3)
        .build()
        .unwrap();
    let p = ldt.fit(&x, &y).unwrap();
    assert_valid_p(p, 20);
}

#[test]
fn test_degenerate_input() {
    let x = gaussian_cloud_dense(1, &[0.0, 0.0], 1.0, 18);
    let y = gaussian_cloud_dense(5, &[0.0, 0.0], 1.0, 19);
    let mut ldt = embedding_test(10);
    assert!(matches!(
        ldt.fit(&x, &y),
        Err(LdtError::DegenerateInput { n: 1, m: 5 })
    ));
    assert!(ldt.outcome().is_none());
}

#[test]
fn test_embedding_width_mismatch() {
    let x = gaussian_cloud_dense(5, &[0.0, 0.0], 1.0, 20);
    let y = gaussian_cloud_dense(5, &[0.0, 0.0, 0.0], 1.0, 21);
    let mut ldt = embedding_test(10);
    assert!(matches!(ldt.fit(&x, &y), Err(LdtError::DimensionMismatch { .. })));
}

#[test]
fn test_cancellation_surfaces_from_fit() {
    init();
    let token = CancellationToken::new();
    token.cancel();
    let mut ldt = LatentDistributionTest::builder()
        .with_pass_graph(false)
        .with_n_bootstraps(10)
        .with_cancellation(token)
        .build()
        .unwrap();
    let x = gaussian_cloud_dense(5, &[0.0, 0.0], 1.0, 22);
    let result = ldt.fit(&x, &x);
    assert!(matches!(result, Err(LdtError::Cancelled { completed: 0 })));
    assert_eq!(ldt.stage(), FitStage::KernelBuilt);
}

#[test]
fn test_graphs_from_different_models_are_rejected() {
    init();
    let a = erdos_renyi(50, 0.8, 30);
    let b = erdos_renyi(50, 0.3, 31);
    let mut ldt = LatentDistributionTest::builder()
        .with_n_components(Some(1))
        .with_n_bootstraps(100)
        .with_seed(8)
        .build()
        .unwrap();
    let p = ldt.fit(&a, &b).unwrap();
    debug!("ER(0.8) vs ER(0.3): U={:?}, p={}", ldt.sample_t_statistic(), p);
    assert!(p < 0.05);
    assert_eq!(ldt.kernel_matrix().unwrap().shape(), (100, 100));
}

#[test]
fn test_graphs_with_selected_dimension() {
    init();
    let a = erdos_renyi(40, 0.5, 32);
    let b = erdos_renyi(30, 0.5, 33);
    let mut ldt = LatentDistributionTest::builder()
        .with_n_bootstraps(30)
        .with_seed(9)
        .build()
        .unwrap();
    let p = ldt.fit(&a, &b).unwrap();
    assert_valid_p(p, 30);

    let d = ldt.outcome().unwrap().resolved.n_components;
    debug!("selected dimension {}", d);
    assert!(d >= 1 && d <= 6);
    assert_eq!(ldt.kernel_matrix().unwrap().shape(), (70, 70));
}

#[test]
fn test_directed_graphs() {
    init();
    let a = directed_erdos_renyi(20, 0.3, 34);
    let b = directed_erdos_renyi(25, 0.3, 35);
    let mut ldt = LatentDistributionTest::builder()
        .with_n_components(Some(1))
        .with_n_bootstraps(20)
        .with_seed(10)
        .build()
        .unwrap();
    let p = ldt.fit(&a, &b).unwrap();
    assert_valid_p(p, 20);
    assert_eq!(ldt.kernel_matrix().unwrap().shape(), (45, 45));
}

#[test]
fn test_directedness_mismatch() {
    init();
    let a = erdos_renyi(20, 0.3, 36);
    let b = directed_erdos_renyi(20, 0.3, 37);
    let mut ldt = LatentDistributionTest::builder()
        .with_n_components(Some(1))
        .with_n_bootstraps(10)
        .build()
        .unwrap();
    assert!(matches!(ldt.fit(&a, &b), Err(LdtError::DirectednessMismatch)));
}

#[test]
fn test_invalid_adjacency_is_rejected() {
    let mut ldt = LatentDistributionTest::builder()
        .with_n_components(Some(1))
        .with_n_bootstraps(10)
        .build()
        .unwrap();
    let rectangular = to_dense(&nalgebra::DMatrix::zeros(4, 3));
    let square = erdos_renyi(4, 0.5, 38);
    assert!(matches!(
        ldt.fit(&rectangular, &square),
        Err(LdtError::InvalidGraph(_))
    ));
}

#[test]
fn test_fit_with_explicit_rng() {
    let x = gaussian_cloud_dense(8, &[0.0, 0.0], 1.0, 39);
    let y = gaussian_cloud_dense(8, &[1.0, 0.0], 1.0, 40);
    let mut ldt = embedding_test(15);
    let p1 = ldt.fit_with_rng(&x, &y, &mut ChaCha8Rng::seed_from_u64(4)).unwrap();
    let p2 = ldt.fit_with_rng(&x, &y, &mut ChaCha8Rng::seed_from_u64(4)).unwrap();
    assert_eq!(p1, p2);
    assert_valid_p(p1, 15);
}
