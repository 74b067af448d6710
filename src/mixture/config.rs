//! Estimator configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Constraint family for the per-component covariance matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CovarianceType {
    /// One unconstrained matrix per component.
    Full,
    /// One diagonal (per-feature variance vector) per component.
    Diag,
    /// One scalar variance per component.
    Spherical,
    /// A single full matrix shared by all components.
    Tied,
}

impl FromStr for CovarianceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(CovarianceType::Full),
            "diag" => Ok(CovarianceType::Diag),
            "spherical" => Ok(CovarianceType::Spherical),
            "tied" => Ok(CovarianceType::Tied),
            other => Err(Error::UnknownVariant {
                name: "covariance type",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CovarianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CovarianceType::Full => "full",
            CovarianceType::Diag => "diag",
            CovarianceType::Spherical => "spherical",
            CovarianceType::Tied => "tied",
        })
    }
}

/// How the responsibilities of each restart are seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitStrategy {
    /// Hard one-hot assignment from a k-means run over the embeddings.
    Kmeans,
    /// Uniform random responsibilities, row-normalized.
    Random,
    /// Responsibilities from the label ⊗ prediction outer product, so that
    /// components start out separated by error type.
    Error,
}

impl FromStr for InitStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kmeans" => Ok(InitStrategy::Kmeans),
            "random" => Ok(InitStrategy::Random),
            "error" => Ok(InitStrategy::Error),
            other => Err(Error::UnknownVariant {
                name: "init strategy",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for InitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitStrategy::Kmeans => "kmeans",
            InitStrategy::Random => "random",
            InitStrategy::Error => "error",
        })
    }
}

/// Configuration for [`JointMixture`](super::JointMixture).
///
/// Built with `with_*` setters; checked by [`MixtureConfig::validate`] before
/// any computation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureConfig {
    /// Number of mixture components.
    pub n_components: usize,
    /// Covariance structure.
    pub covariance_type: CovarianceType,
    /// Responsibility initialization.
    pub init: InitStrategy,
    /// Weight on the true-label log-likelihood term.
    pub y_weight: f64,
    /// Weight on the predicted-label log-likelihood term.
    pub y_hat_weight: f64,
    /// Convergence threshold on the change of the lower bound.
    pub tol: f64,
    /// Non-negative regularization added to covariance diagonals.
    pub reg_covar: f64,
    /// EM iteration cap per restart.
    pub max_iter: usize,
    /// Number of independent initializations; the best lower bound wins.
    pub n_restarts: usize,
    /// Master seed for all restarts.
    pub seed: Option<u64>,
    /// Resume from the fitted parameters on the next `fit`.
    pub warm_start: bool,
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            n_components: 1,
            covariance_type: CovarianceType::Full,
            init: InitStrategy::Kmeans,
            y_weight: 1.0,
            y_hat_weight: 1.0,
            tol: 1e-3,
            reg_covar: 1e-6,
            max_iter: 100,
            n_restarts: 1,
            seed: None,
            warm_start: false,
        }
    }
}

impl MixtureConfig {
    /// Default configuration with `n_components` components.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            ..Self::default()
        }
    }

    /// Set number of components.
    pub fn with_n_components(mut self, n: usize) -> Self {
        self.n_components = n;
        self
    }

    /// Set covariance structure.
    pub fn with_covariance_type(mut self, covariance_type: CovarianceType) -> Self {
        self.covariance_type = covariance_type;
        self
    }

    /// Set initialization strategy.
    pub fn with_init(mut self, init: InitStrategy) -> Self {
        self.init = init;
        self
    }

    /// Set the weight of both label terms at once.
    pub fn with_label_weight(mut self, weight: f64) -> Self {
        self.y_weight = weight;
        self.y_hat_weight = weight;
        self
    }

    /// Set the weight of the true-label term only.
    pub fn with_y_weight(mut self, weight: f64) -> Self {
        self.y_weight = weight;
        self
    }

    /// Set the weight of the predicted-label term only.
    pub fn with_y_hat_weight(mut self, weight: f64) -> Self {
        self.y_hat_weight = weight;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set covariance regularization.
    pub fn with_reg_covar(mut self, reg_covar: f64) -> Self {
        self.reg_covar = reg_covar;
        self
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set number of restarts.
    pub fn with_n_restarts(mut self, n_restarts: usize) -> Self {
        self.n_restarts = n_restarts;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enable or disable warm starts.
    pub fn with_warm_start(mut self, warm_start: bool) -> Self {
        self.warm_start = warm_start;
        self
    }

    /// Check every option that does not depend on the data.
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(Error::InvalidParameter {
                name: "n_components",
                message: "must be > 0",
            });
        }
        if self.n_restarts == 0 {
            return Err(Error::InvalidParameter {
                name: "n_restarts",
                message: "must be > 0",
            });
        }
        if self.max_iter == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be > 0",
            });
        }
        for (name, value) in [
            ("y_weight", self.y_weight),
            ("y_hat_weight", self.y_hat_weight),
            ("tol", self.tol),
            ("reg_covar", self.reg_covar),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidParameter {
                    name,
                    message: "must be finite and non-negative",
                });
            }
        }
        Ok(())
    }
}
