//! The fitted parameter tuple.

use super::config::CovarianceType;
use super::covariance::Covariances;
use super::estimate::Estimates;
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Weights, means, covariances and the two categorical tables of a joint
/// mixture, plus the precision factors derived from the covariances.
///
/// Immutable once built: every M-step produces a fresh value that replaces
/// the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureParams {
    weights: Array1<f64>,
    means: Array2<f64>,
    covariances: Covariances,
    y_probs: Array2<f64>,
    y_hat_probs: Array2<f64>,
    precisions_cholesky: Covariances,
}

impl MixtureParams {
    /// Assemble parameters from their parts, checking that the shapes agree.
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] when the parts disagree on the number of
    /// components, features or classes; [`Error::InvalidParameter`] for
    /// non-finite means, or weights and table rows that are not probability
    /// vectors; [`Error::InversionFailed`] when the covariances are not
    /// positive-definite.
    pub fn new(
        weights: Array1<f64>,
        means: Array2<f64>,
        covariances: Covariances,
        y_probs: Array2<f64>,
        y_hat_probs: Array2<f64>,
    ) -> Result<Self> {
        let (k, d) = means.dim();
        let c = y_probs.ncols();

        let cov_ok = match &covariances {
            Covariances::Full(a) => a.dim() == (k, d, d),
            Covariances::Tied(a) => a.dim() == (d, d),
            Covariances::Diag(a) => a.dim() == (k, d),
            Covariances::Spherical(a) => a.len() == k,
        };
        if weights.len() != k || !cov_ok || y_probs.nrows() != k || y_hat_probs.dim() != (k, c) {
            return Err(Error::ShapeMismatch {
                expected: format!("{k} components over {d} features and {c} classes"),
                actual: format!(
                    "weights {:?}, covariances {:?}, y_probs {:?}, y_hat_probs {:?}",
                    weights.dim(),
                    covariances.covariance_type(),
                    y_probs.dim(),
                    y_hat_probs.dim()
                ),
            });
        }

        check_distribution("weights", weights.view())?;
        if means.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "means",
                message: "must be finite",
            });
        }
        for row in y_probs.rows() {
            check_distribution("y_probs", row)?;
        }
        for row in y_hat_probs.rows() {
            check_distribution("y_hat_probs", row)?;
        }

        let precisions_cholesky = covariances.precision_cholesky()?;
        Ok(Self {
            weights,
            means,
            covariances,
            y_probs,
            y_hat_probs,
            precisions_cholesky,
        })
    }

    /// Turn raw kernel output into parameters; weights become `nk / n_samples`.
    pub fn from_estimates(est: Estimates, n_samples: usize) -> Result<Self> {
        let precisions_cholesky = est.covariances.precision_cholesky()?;
        Ok(Self {
            weights: est.nk / n_samples as f64,
            means: est.means,
            covariances: est.covariances,
            y_probs: est.y_probs,
            y_hat_probs: est.y_hat_probs,
            precisions_cholesky,
        })
    }

    /// Mixture weights, `(k,)`.
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Component means, `(k, d)`.
    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    /// Regularized covariances.
    pub fn covariances(&self) -> &Covariances {
        &self.covariances
    }

    /// True-label distribution per component, `(k, c)`.
    pub fn y_probs(&self) -> &Array2<f64> {
        &self.y_probs
    }

    /// Predicted-label distribution per component, `(k, c)`.
    pub fn y_hat_probs(&self) -> &Array2<f64> {
        &self.y_hat_probs
    }

    /// Precision Cholesky factors.
    pub fn precisions_cholesky(&self) -> &Covariances {
        &self.precisions_cholesky
    }

    /// Precision matrices.
    pub fn precisions(&self) -> Covariances {
        self.precisions_cholesky.precisions_from_cholesky()
    }

    /// Covariance structure of these parameters.
    pub fn covariance_type(&self) -> CovarianceType {
        self.covariances.covariance_type()
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.means.nrows()
    }

    /// Embedding dimension.
    pub fn n_features(&self) -> usize {
        self.means.ncols()
    }

    /// Width of the categorical tables.
    pub fn n_classes(&self) -> usize {
        self.y_probs.ncols()
    }

    /// Free parameters: covariances, means, `k - 1` weights and one extra per
    /// component for each categorical table.
    pub fn n_parameters(&self) -> usize {
        let (k, d) = self.means.dim();
        Covariances::n_parameters(self.covariance_type(), k, d) + k * d + (k - 1) + 2 * k
    }

    /// Per-sample, per-component weighted joint log-probability:
    ///
    /// ```text
    /// log N(x | k) + log πₖ + w_y · log(y · p(y)ₖ + ε) + w_ŷ · log(ŷ · p(ŷ)ₖ + ε)
    /// ```
    ///
    /// A missing label channel contributes nothing.
    pub fn weighted_log_prob(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<ArrayView2<'_, f64>>,
        y_hat: Option<ArrayView2<'_, f64>>,
        y_weight: f64,
        y_hat_weight: f64,
    ) -> Array2<f64> {
        let mut log_prob = self
            .precisions_cholesky
            .estimate_log_gaussian_prob(x, &self.means);
        log_prob += &self.weights.mapv(f64::ln);

        if let Some(y) = y {
            log_prob += &(categorical_log_prob(y, &self.y_probs) * y_weight);
        }
        if let Some(y_hat) = y_hat {
            log_prob += &(categorical_log_prob(y_hat, &self.y_hat_probs) * y_hat_weight);
        }
        log_prob
    }

    /// Per-sample log-normalizer and log-responsibilities.
    pub fn log_prob_resp(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<ArrayView2<'_, f64>>,
        y_hat: Option<ArrayView2<'_, f64>>,
        y_weight: f64,
        y_hat_weight: f64,
    ) -> (Array1<f64>, Array2<f64>) {
        log_normalize(self.weighted_log_prob(x, y, y_hat, y_weight, y_hat_weight))
    }
}

/// Entries finite and non-negative, summing to 1.
fn check_distribution(name: &'static str, values: ArrayView1<'_, f64>) -> Result<()> {
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(Error::InvalidParameter {
            name,
            message: "entries must be finite and non-negative",
        });
    }
    if (values.sum() - 1.0).abs() > 1e-6 {
        return Err(Error::InvalidParameter {
            name,
            message: "entries must sum to 1",
        });
    }
    Ok(())
}

/// `log(labels · tableᵀ + ε)`, `(n_samples, n_components)`.
fn categorical_log_prob(labels: ArrayView2<'_, f64>, table: &Array2<f64>) -> Array2<f64> {
    labels.dot(&table.t()).mapv(|p| (p + f64::EPSILON).ln())
}

/// Row-wise log-sum-exp; returns the normalizers and `weighted - normalizer`.
pub(crate) fn log_normalize(mut weighted: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let log_norm = weighted.map_axis(Axis(1), |row| {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        if max == f64::NEG_INFINITY {
            return max;
        }
        max + row.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
    });
    weighted -= &log_norm.view().insert_axis(Axis(1));
    (log_norm, weighted)
}
