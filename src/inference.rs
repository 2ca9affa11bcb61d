//! # Latent distribution test
//!
//! Two-sample hypothesis test of whether two random dot product graphs share
//! the same distribution of latent positions (Tang et al., 2017, "A
//! nonparametric two-sample hypothesis testing problem for random graphs").
//! No vertex correspondence is needed and the graphs may have different
//! numbers of vertices.
//!
//! # Pipeline
//!
//! ```text
//! Unconfigured → EmbeddingSelected → Aligned → KernelBuilt → Bootstrapped → Done
//! ```
//!
//! 1. **Embedding**: resolve the dimension (max of the two graphs' last
//!    profile-likelihood elbows when unset) and embed both graphs; skipped
//!    when the inputs already are embeddings (`pass_graph = false`).
//! 2. **Alignment**: rotate `Y` onto `X` (`Y ← Y·Q`).
//! 3. **Kernel**: joint Gaussian kernel matrix, with the size correction
//!    selected by the configuration.
//! 4. **Statistic**: unbiased `U` on the unpermuted kernel matrix.
//! 5. **Bootstrap**: null distribution from random permutations of the same
//!    kernel matrix.
//! 6. **p-value**: `(#{null ≥ U} + 1) / (n_bootstraps + 1)`.
//!
//! # Usage Example
//!
//! ```ignore
//! use latentdist::inference::LatentDistributionTest;
//! use latentdist::params::Alignment;
//!
//! let mut ldt = LatentDistributionTest::builder()
//!     .with_n_bootstraps(500)
//!     .with_alignment(Some(Alignment::SignFlips))
//!     .with_seed(7)
//!     .build()?;
//!
//! let p = ldt.fit(&adjacency_a, &adjacency_b)?;
//! println!("U = {:?}, p = {}", ldt.sample_t_statistic(), p);
//! ```
//!
//! Randomness (noise injection and permutations) comes from the RNG passed to
//! `fit_with_rng`, or from a `ChaCha8Rng` seeded with `TestParams::seed`
//! (fresh entropy when unset) in `fit`.

use std::fmt;

use log::{debug, info, trace};
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::align::{Aligner, SeedlessProcrustes, SignFlips};
use crate::bootstrap::{p_value, CancellationToken, PermutationBootstrap};
use crate::builder::LatentDistributionTestBuilder;
use crate::core::{check_same_width, joint_positions, to_dense, to_dmatrix};
use crate::correction::{estimate_correction_variances, sample_modified_ase, CorrectionVariances};
use crate::embed::{DimensionSelector, Embedder};
use crate::error::{LdtError, Result};
use crate::graph::Graph;
use crate::kernel::{KernelBuilder, KernelKind};
use crate::params::{Alignment, ResolvedParams, TestParams};
use crate::statistic::u_statistic;

/// Last stage a fit reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitStage {
    Unconfigured,
    EmbeddingSelected,
    Aligned,
    KernelBuilt,
    Bootstrapped,
    Done,
}

impl fmt::Display for FitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FitStage::Unconfigured => "unconfigured",
            FitStage::EmbeddingSelected => "embedding-selected",
            FitStage::Aligned => "aligned",
            FitStage::KernelBuilt => "kernel-built",
            FitStage::Bootstrapped => "bootstrapped",
            FitStage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Results of a completed fit.
#[derive(Clone, Debug)]
pub struct TestOutcome {
    /// `U` on the unpermuted kernel matrix.
    pub sample_t_statistic: f64,
    pub p_value: f64,
    /// One statistic per bootstrap permutation, in draw order.
    pub null_distribution: Vec<f64>,
    /// Joint `(N+M)×(N+M)` kernel matrix the test ran on.
    pub kernel_matrix: DenseMatrix<f64>,
    pub resolved: ResolvedParams,
}

pub struct LatentDistributionTest {
    params: TestParams,
    embedder: Box<dyn Embedder>,
    selector: Box<dyn DimensionSelector>,
    procrustes: SeedlessProcrustes,
    cancel: Option<CancellationToken>,

    stage: FitStage,
    outcome: Option<TestOutcome>,
}

impl LatentDistributionTest {
    pub fn builder() -> LatentDistributionTestBuilder {
        LatentDistributionTestBuilder::new()
    }

    pub(crate) fn new(
        params: TestParams,
        embedder: Box<dyn Embedder>,
        selector: Box<dyn DimensionSelector>,
        procrustes: SeedlessProcrustes,
        cancel: Option<CancellationToken>,
    ) -> Self {
        Self {
            params,
            embedder,
            selector,
            procrustes,
            cancel,
            stage: FitStage::Unconfigured,
            outcome: None,
        }
    }

    pub fn params(&self) -> &TestParams {
        &self.params
    }

    pub fn stage(&self) -> FitStage {
        self.stage
    }

    pub fn outcome(&self) -> Option<&TestOutcome> {
        self.outcome.as_ref()
    }

    pub fn sample_t_statistic(&self) -> Option<f64> {
        self.outcome.as_ref().map(|o| o.sample_t_statistic)
    }

    pub fn p_value(&self) -> Option<f64> {
        self.outcome.as_ref().map(|o| o.p_value)
    }

    pub fn null_distribution(&self) -> Option<&[f64]> {
        self.outcome.as_ref().map(|o| o.null_distribution.as_slice())
    }

    pub fn kernel_matrix(&self) -> Option<&DenseMatrix<f64>> {
        self.outcome.as_ref().map(|o| &o.kernel_matrix)
    }

    /// Run the test on `a` and `b` and return the p-value.
    ///
    /// `a` and `b` are adjacency matrices, or `N×d` / `M×d` embeddings when
    /// `pass_graph` is false.
    pub fn fit(&mut self, a: &DenseMatrix<f64>, b: &DenseMatrix<f64>) -> Result<f64> {
        let seed = self.params.seed.unwrap_or_else(rand::random);
        debug!("Seeding fit with {}", seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.fit_with_rng(a, b, &mut rng)
    }

    /// `fit` with an explicit random source.
    pub fn fit_with_rng<R: Rng + ?Sized>(
        &mut self,
        a: &DenseMatrix<f64>,
        b: &DenseMatrix<f64>,
        rng: &mut R,
    ) -> Result<f64> {
        self.outcome = None;
        self.stage = FitStage::Unconfigured;

        let (x, y, n_components) = self.positions(a, b)?;
        let resolved = ResolvedParams::resolve(&self.params, n_components);
        self.advance(FitStage::EmbeddingSelected);
        debug!("Resolved parameters: {:?}", resolved);

        let (n, m) = (x.nrows(), y.nrows());
        if n < 2 || m < 2 {
            return Err(LdtError::DegenerateInput { n, m });
        }

        let y = self.align(&x, y, resolved.alignment)?;
        self.advance(FitStage::Aligned);

        let kernel = self.build_kernel(&x, &y, &resolved, rng)?;
        self.advance(FitStage::KernelBuilt);

        let u = u_statistic(&kernel, n, m)?;
        info!("Observed statistic U={:.6}", u);

        let null = PermutationBootstrap::new(resolved.n_bootstraps)
            .with_cancellation(self.cancel.clone())
            .null_distribution(&kernel, n, m, rng)?;
        self.advance(FitStage::Bootstrapped);

        let p = p_value(u, &null);
        info!(
            "Latent distribution test complete: N={}, M={}, U={:.6}, p={:.4}",
            n, m, u, p
        );

        self.outcome = Some(TestOutcome {
            sample_t_statistic: u,
            p_value: p,
            null_distribution: null,
            kernel_matrix: kernel,
            resolved,
        });
        self.advance(FitStage::Done);
        Ok(p)
    }

    fn advance(&mut self, stage: FitStage) {
        trace!("fit stage: {} → {}", self.stage, stage);
        self.stage = stage;
    }

    /// Point clouds `X`, `Y` and the embedding dimension they were built with.
    fn positions(
        &self,
        a: &DenseMatrix<f64>,
        b: &DenseMatrix<f64>,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>, usize)> {
        if !self.params.pass_graph {
            let x = to_dmatrix(a);
            let y = to_dmatrix(b);
            let d = check_same_width(&x, &y)?;
            debug!("Using precomputed embeddings: N={}, M={}, d={}", x.nrows(), y.nrows(), d);
            return Ok((x, y, d));
        }

        let ga = Graph::from_adjacency(a)?;
        let gb = Graph::from_adjacency(b)?;

        let d = match self.params.n_components {
            Some(d) => d as usize,
            None => {
                let da = self.last_elbow(&ga)?;
                let db = self.last_elbow(&gb)?;
                info!("Selected dimensions {} and {}, embedding into {}", da, db, da.max(db));
                da.max(db)
            }
        };

        let ea = self.embedder.embed(&ga, d)?;
        let eb = self.embedder.embed(&gb, d)?;
        let (x, y) = joint_positions(ea, eb)?;
        check_same_width(&x, &y)?;
        Ok((x, y, d))
    }

    fn last_elbow(&self, graph: &Graph) -> Result<usize> {
        self.selector
            .select(graph)?
            .last()
            .copied()
            .ok_or_else(|| LdtError::Numerical("dimension selection produced no candidate".into()))
    }

    fn align(&self, x: &DMatrix<f64>, y: DMatrix<f64>, alignment: Option<Alignment>) -> Result<DMatrix<f64>> {
        let q = match alignment {
            None => {
                debug!("No alignment requested");
                return Ok(y);
            }
            Some(Alignment::SignFlips) => SignFlips.align(x, &y)?,
            Some(Alignment::SeedlessProcrustes) => self.procrustes.align(x, &y)?,
        };
        info!("Aligned Y onto X with {}", alignment.map(|a| a.to_string()).unwrap_or_default());
        Ok(y * q)
    }

    fn build_kernel<R: Rng + ?Sized>(
        &self,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
        resolved: &ResolvedParams,
        rng: &mut R,
    ) -> Result<DenseMatrix<f64>> {
        let (n, m, d) = (x.nrows(), y.nrows(), x.ncols());
        let regular = KernelBuilder::new(KernelKind::Regular, resolved.bandwidth);
        let no_correction = CorrectionVariances::zeros(n, m, d);

        match resolved.kernel {
            KernelKind::Expected => {
                let variances =
                    estimate_correction_variances(x, y, resolved.correction_variance)?;
                if variances.is_zero() {
                    return regular.kernel_matrix(x, y, &no_correction);
                }
                KernelBuilder::new(KernelKind::Expected, resolved.bandwidth)
                    .kernel_matrix(x, y, &variances)
            }
            KernelKind::Regular if resolved.n_samples == 0 || n == m => {
                regular.kernel_matrix(x, y, &no_correction)
            }
            KernelKind::Regular => {
                info!("Averaging kernel over {} noisy draws", resolved.n_samples);
                let mut acc = DMatrix::<f64>::zeros(n + m, n + m);
                for draw in 0..resolved.n_samples {
                    let (xs, ys) =
                        sample_modified_ase(x, y, resolved.correction_variance, &mut *rng)?;
                    acc += to_dmatrix(&regular.kernel_matrix(&xs, &ys, &no_correction)?);
                    trace!("kernel draw {} accumulated", draw);
                }
                Ok(to_dense(&(acc / resolved.n_samples as f64)))
            }
        }
    }
}
