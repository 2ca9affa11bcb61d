use crate::align::SeedlessProcrustes;
use crate::bootstrap::CancellationToken;
use crate::correction::CorrectionVariance;
use crate::embed::{AdjacencySpectralEmbed, DimensionSelector, Embedder, ProfileLikelihood};
use crate::error::Result;
use crate::inference::LatentDistributionTest;
use crate::params::{Alignment, SizeCorrection, TestParams};

use log::{debug, info};

pub struct LatentDistributionTestBuilder {
    params: TestParams,

    // Collaborators
    embedder: Box<dyn Embedder>,
    selector: Box<dyn DimensionSelector>,
    procrustes: SeedlessProcrustes,

    cancel: Option<CancellationToken>,
}

impl Default for LatentDistributionTestBuilder {
    fn default() -> Self {
        debug!("Creating LatentDistributionTestBuilder with default parameters");
        Self {
            params: TestParams::default(),
            embedder: Box::new(AdjacencySpectralEmbed::default()),
            selector: Box::new(ProfileLikelihood::default()),
            procrustes: SeedlessProcrustes::default(),
            cancel: None,
        }
    }
}

impl LatentDistributionTestBuilder {
    pub fn new() -> Self {
        info!("Initializing new LatentDistributionTestBuilder");
        Self::default()
    }

    /// Start from a complete parameter set, e.g. one read with `TestParams::from_json`.
    pub fn from_params(params: TestParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    // -------------------- Test parameters --------------------

    /// Embedding dimension; `None` selects it from the graphs.
    pub fn with_n_components(mut self, n_components: Option<i64>) -> Self {
        info!("Setting n_components: {:?}", n_components);
        self.params.n_components = n_components;
        self
    }

    pub fn with_n_bootstraps(mut self, n_bootstraps: i64) -> Self {
        info!("Setting n_bootstraps: {}", n_bootstraps);
        self.params.n_bootstraps = n_bootstraps;
        self
    }

    /// Gaussian kernel bandwidth; `None` uses the default of 0.5.
    pub fn with_bandwidth(mut self, bandwidth: Option<f64>) -> Self {
        info!("Setting bandwidth: {:?}", bandwidth);
        self.params.bandwidth = bandwidth;
        self
    }

    /// `false` makes `fit` treat its inputs as embeddings instead of adjacency matrices.
    pub fn with_pass_graph(mut self, pass_graph: bool) -> Self {
        info!("Setting pass_graph: {}", pass_graph);
        self.params.pass_graph = pass_graph;
        self
    }

    pub fn with_alignment(mut self, alignment: Option<Alignment>) -> Self {
        info!("Setting alignment: {:?}", alignment);
        self.params.alignment = alignment;
        self
    }

    pub fn with_size_correction(mut self, size_correction: Option<SizeCorrection>) -> Self {
        info!("Setting size correction: {:?}", size_correction);
        self.params.size_correction = size_correction;
        self
    }

    pub fn with_correction_variance(mut self, method: CorrectionVariance) -> Self {
        info!("Setting correction variance: {:?}", method);
        self.params.correction_variance = method;
        self
    }

    /// Noisy draws averaged by the sampling size correction.
    pub fn with_n_samples(mut self, n_samples: i64) -> Self {
        info!("Setting n_samples: {}", n_samples);
        self.params.n_samples = n_samples;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        info!("Setting seed: {}", seed);
        self.params.seed = Some(seed);
        self
    }

    // -------------------- Collaborators --------------------

    pub fn with_embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_dimension_selector(mut self, selector: Box<dyn DimensionSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Tuning of the EM solver used by `Alignment::SeedlessProcrustes`.
    pub fn with_procrustes(mut self, procrustes: SeedlessProcrustes) -> Self {
        self.procrustes = procrustes;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    // -------------------- Build --------------------

    /// Validate the configuration and build the test.
    ///
    /// Every configuration error surfaces here, before any fit.
    pub fn build(self) -> Result<LatentDistributionTest> {
        self.params.validate()?;
        info!(
            "Built LatentDistributionTest: n_bootstraps={}, bandwidth={}, alignment={:?}, size_correction={:?}",
            self.params.n_bootstraps,
            self.params.bandwidth_or_default(),
            self.params.alignment,
            self.params.size_correction
        );
        Ok(LatentDistributionTest::new(
            self.params,
            self.embedder,
            self.selector,
            self.procrustes,
            self.cancel,
        ))
    }
}
