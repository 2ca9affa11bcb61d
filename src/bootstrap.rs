//! Permutation bootstrap of the null distribution.
//!
//! Under the null both samples come from the same distribution, so the
//! `N + M` points are exchangeable. Each iteration draws a uniform random
//! permutation of the joint index set (Fisher–Yates), treats the first `N`
//! permuted indices as `X` and recomputes `U` on the fixed kernel matrix.
//! Iterations run sequentially on a single random source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, trace};
use rand::seq::SliceRandom;
use rand::Rng;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{LdtError, Result};
use crate::statistic::{check_kernel, permuted_u_statistic};

/// Cooperative cancellation flag, polled once per bootstrap iteration.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct PermutationBootstrap {
    pub n_bootstraps: usize,
    cancel: Option<CancellationToken>,
}

impl PermutationBootstrap {
    pub fn new(n_bootstraps: usize) -> Self {
        Self {
            n_bootstraps,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Statistic values under `n_bootstraps` independent random permutations.
    ///
    /// # Returns
    /// A vector of exactly `n_bootstraps` values, in draw order.
    pub fn null_distribution<R: Rng + ?Sized>(
        &self,
        kernel: &DenseMatrix<f64>,
        n: usize,
        m: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        check_kernel(kernel, n, m)?;
        info!(
            "Running {} permutation bootstraps over N={}, M={}",
            self.n_bootstraps, n, m
        );

        let mut order: Vec<usize> = (0..n + m).collect();
        let mut statistics = Vec::with_capacity(self.n_bootstraps);
        for iteration in 0..self.n_bootstraps {
            if let Some(token) = &self.cancel {
                if token.is_cancelled() {
                    debug!("Bootstrap cancelled at iteration {}", iteration);
                    return Err(LdtError::Cancelled {
                        completed: iteration,
                    });
                }
            }
            order.shuffle(rng);
            let stat = permuted_u_statistic(kernel, &order, n);
            trace!("bootstrap {}: U*={:.6}", iteration, stat);
            statistics.push(stat);
        }
        Ok(statistics)
    }
}

/// `(#{null ≥ statistic} + 1) / (len(null) + 1)`; never zero.
pub fn p_value(statistic: f64, null: &[f64]) -> f64 {
    let exceed = null.iter().filter(|&&v| v >= statistic).count();
    (exceed + 1) as f64 / (null.len() + 1) as f64
}
