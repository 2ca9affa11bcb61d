use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::correction::CorrectionVariance;
use crate::error::{LdtError, Result};
use crate::kernel::KernelKind;

use log::debug;

pub const DEFAULT_BANDWIDTH: f64 = 0.5;
pub const DEFAULT_N_BOOTSTRAPS: i64 = 200;

/// How `Y` is rotated onto `X` before comparing them.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    SignFlips,
    SeedlessProcrustes,
}

/// How unequal sample sizes are compensated.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SizeCorrection {
    /// Inject noise into the larger sample and average the kernel over draws.
    Sampling,
    /// Integrate the noise out analytically in the kernel.
    Expected,
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alignment::SignFlips => write!(f, "sign_flips"),
            Alignment::SeedlessProcrustes => write!(f, "seedless_procrustes"),
        }
    }
}

impl FromStr for Alignment {
    type Err = LdtError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sign_flips" => Ok(Alignment::SignFlips),
            "seedless_procrustes" => Ok(Alignment::SeedlessProcrustes),
            other => Err(LdtError::Configuration(format!(
                "unsupported alignment '{}', supported alignments are sign_flips, seedless_procrustes",
                other
            ))),
        }
    }
}

impl fmt::Display for SizeCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeCorrection::Sampling => write!(f, "sampling"),
            SizeCorrection::Expected => write!(f, "expected"),
        }
    }
}

impl FromStr for SizeCorrection {
    type Err = LdtError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sampling" => Ok(SizeCorrection::Sampling),
            "expected" => Ok(SizeCorrection::Expected),
            other => Err(LdtError::Configuration(format!(
                "unsupported size correction '{}', supported size corrections are sampling, expected",
                other
            ))),
        }
    }
}

/// User configuration of the test, exactly as given.
///
/// Counts are signed so that negative values read from configuration are
/// rejected by `validate` instead of being unrepresentable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TestParams {
    pub n_components: Option<i64>,
    pub n_bootstraps: i64,
    pub bandwidth: Option<f64>,
    pub pass_graph: bool,
    pub alignment: Option<Alignment>,
    pub size_correction: Option<SizeCorrection>,
    pub correction_variance: CorrectionVariance,
    pub n_samples: i64,
    pub seed: Option<u64>,
}

impl Default for TestParams {
    fn default() -> Self {
        Self {
            n_components: None,
            n_bootstraps: DEFAULT_N_BOOTSTRAPS,
            bandwidth: None,
            pass_graph: true,
            alignment: Some(Alignment::SignFlips),
            size_correction: None,
            correction_variance: CorrectionVariance::Isotropic,
            n_samples: 1,
            seed: None,
        }
    }
}

// Approximate equality on the bandwidth, exact on everything else
impl PartialEq for TestParams {
    fn eq(&self, other: &Self) -> bool {
        self.n_components == other.n_components
            && self.n_bootstraps == other.n_bootstraps
            && match (self.bandwidth, other.bandwidth) {
                (None, None) => true,
                (Some(a), Some(b)) => approx::relative_eq!(a, b),
                _ => false,
            }
            && self.pass_graph == other.pass_graph
            && self.alignment == other.alignment
            && self.size_correction == other.size_correction
            && self.correction_variance == other.correction_variance
            && self.n_samples == other.n_samples
            && self.seed == other.seed
    }
}

impl TestParams {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: TestParams = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(d) = self.n_components {
            if d < 1 {
                return Err(LdtError::Configuration(format!(
                    "{} is an invalid number of components, must be at least 1",
                    d
                )));
            }
        }
        if self.n_bootstraps < 1 {
            return Err(LdtError::Configuration(format!(
                "{} is an invalid number of bootstraps, must be at least 1",
                self.n_bootstraps
            )));
        }
        if let Some(h) = self.bandwidth {
            if !h.is_finite() || h <= 0.0 {
                return Err(LdtError::Configuration(format!(
                    "{} is an invalid bandwidth, must be finite and positive",
                    h
                )));
            }
        }
        if self.n_samples < 0 {
            return Err(LdtError::Configuration(format!(
                "{} is an invalid number of samples, must be non-negative",
                self.n_samples
            )));
        }
        debug!("TestParams validated: {:?}", self);
        Ok(())
    }

    pub fn bandwidth_or_default(&self) -> f64 {
        self.bandwidth.unwrap_or(DEFAULT_BANDWIDTH)
    }
}

/// Everything a single fit needs, resolved once from `TestParams` and the inputs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedParams {
    pub n_components: usize,
    pub n_bootstraps: usize,
    pub bandwidth: f64,
    pub alignment: Option<Alignment>,
    pub kernel: KernelKind,
    /// Number of noisy draws to average; zero unless sampling correction is active.
    pub n_samples: usize,
    pub correction_variance: CorrectionVariance,
}

impl ResolvedParams {
    /// Resolve against the embedding dimension actually used.
    pub fn resolve(params: &TestParams, n_components: usize) -> Self {
        let (kernel, n_samples) = match params.size_correction {
            Some(SizeCorrection::Expected) => (KernelKind::Expected, 0),
            Some(SizeCorrection::Sampling) => (KernelKind::Regular, params.n_samples.max(0) as usize),
            None => (KernelKind::Regular, 0),
        };
        Self {
            n_components,
            n_bootstraps: params.n_bootstraps.max(1) as usize,
            bandwidth: params.bandwidth_or_default(),
            alignment: params.alignment,
            kernel,
            n_samples,
            correction_variance: params.correction_variance,
        }
    }
}
