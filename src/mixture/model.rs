//! The joint mixture estimator.

use super::config::{InitStrategy, MixtureConfig};
use super::covariance::Covariances;
use super::estimate::estimate_parameters;
use super::init::{error_init_required, initial_responsibilities};
use super::params::MixtureParams;
use crate::error::{Error, Result};
use crate::labels::{binarize, Targets};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Lower-bound history of one restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartTrace {
    /// Lower bound after each EM iteration.
    pub lower_bounds: Vec<f64>,
    /// Iterations run.
    pub n_iter: usize,
    /// Whether the change in lower bound fell below `tol`.
    pub converged: bool,
}

/// Outcome of the last `fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// True if any restart converged.
    pub converged: bool,
    /// Iterations of the winning restart.
    pub n_iter: usize,
    /// Lower bound of the winning restart.
    pub lower_bound: f64,
    /// Index of the winning restart.
    pub best_restart: usize,
    /// One trace per restart, in restart order.
    pub restarts: Vec<RestartTrace>,
    /// Set when no restart converged.
    pub warning: Option<String>,
}

#[derive(Debug, Clone)]
struct Fitted {
    params: MixtureParams,
    report: FitReport,
}

struct RestartOutcome {
    params: MixtureParams,
    lower_bound: f64,
    trace: RestartTrace,
}

/// Expectation-maximization over embeddings, true labels and predictions.
///
/// Each component couples a Gaussian over the embedding space with two
/// categorical distributions: one over the true class and one over the
/// predicted class. Components that separate `p(y)` from `p(ŷ)` are the
/// regions where the model errs.
///
/// # Example
///
/// ```rust
/// use ndarray::array;
/// use sliver::mixture::{CovarianceType, JointMixture, MixtureConfig};
///
/// let x = array![[0.0, 0.1], [0.2, 0.0], [5.0, 5.1], [5.2, 4.9]];
/// let y = vec![0, 0, 1, 1];
/// let y_hat = vec![0, 0, 1, 0];
///
/// let mut model = JointMixture::new(
///     MixtureConfig::new(2)
///         .with_covariance_type(CovarianceType::Diag)
///         .with_reg_covar(1e-3)
///         .with_seed(0),
/// );
/// let labels = model.fit_predict(x.view(), &y, &y_hat).unwrap();
/// assert_eq!(labels[0], labels[1]);
/// ```
#[derive(Debug, Clone)]
pub struct JointMixture {
    config: MixtureConfig,
    fitted: Option<Fitted>,
}

impl JointMixture {
    /// Unfitted estimator.
    pub fn new(config: MixtureConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    /// Restore a fitted estimator from previously computed parameters.
    ///
    /// The report is marked converged, with no iterations and no restart traces.
    pub fn from_params(config: MixtureConfig, params: MixtureParams) -> Result<Self> {
        config.validate()?;
        if params.n_components() != config.n_components {
            return Err(Error::DimensionMismatch {
                expected: config.n_components,
                found: params.n_components(),
            });
        }
        if params.covariance_type() != config.covariance_type {
            return Err(Error::InvalidParameter {
                name: "covariance_type",
                message: "does not match the parameter layout",
            });
        }
        let report = FitReport {
            converged: true,
            n_iter: 0,
            lower_bound: f64::NEG_INFINITY,
            best_restart: 0,
            restarts: Vec::new(),
            warning: None,
        };
        Ok(Self {
            config,
            fitted: Some(Fitted { params, report }),
        })
    }

    /// Configuration used by the next `fit`.
    pub fn config(&self) -> &MixtureConfig {
        &self.config
    }

    /// True once `fit` has succeeded or parameters were restored.
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fit the mixture.
    ///
    /// # Errors
    ///
    /// Configuration errors from [`MixtureConfig::validate`], validation
    /// errors for the inputs, [`Error::TooFewComponents`] for error-driven
    /// initialization with too few components, and
    /// [`Error::InversionFailed`] if a covariance degenerates despite
    /// regularization. Non-convergence is not an error; see [`FitReport`].
    pub fn fit<'y, 'h>(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: impl Into<Targets<'y>>,
        y_hat: impl Into<Targets<'h>>,
    ) -> Result<&mut Self> {
        self.fit_log_resp(x, y.into(), y_hat.into())?;
        Ok(self)
    }

    /// Fit, then return the most likely component of every sample.
    ///
    /// Always agrees with [`predict`](Self::predict) on the same inputs.
    pub fn fit_predict<'y, 'h>(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: impl Into<Targets<'y>>,
        y_hat: impl Into<Targets<'h>>,
    ) -> Result<Vec<usize>> {
        let log_resp = self.fit_log_resp(x, y.into(), y_hat.into())?;
        Ok(argmax_rows(&log_resp))
    }

    /// Posterior component probabilities; rows sum to 1.
    ///
    /// Either label channel may be omitted.
    pub fn predict_proba(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<Targets<'_>>,
        y_hat: Option<Targets<'_>>,
    ) -> Result<Array2<f64>> {
        let (_, log_resp) = self.log_prob_resp(x, y, y_hat)?;
        Ok(log_resp.mapv(f64::exp))
    }

    /// Most likely component per sample.
    pub fn predict(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<Targets<'_>>,
        y_hat: Option<Targets<'_>>,
    ) -> Result<Vec<usize>> {
        let (_, log_resp) = self.log_prob_resp(x, y, y_hat)?;
        Ok(argmax_rows(&log_resp))
    }

    /// Weighted joint log-likelihood of each sample.
    pub fn score_samples(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<Targets<'_>>,
        y_hat: Option<Targets<'_>>,
    ) -> Result<Array1<f64>> {
        let (log_norm, _) = self.log_prob_resp(x, y, y_hat)?;
        Ok(log_norm)
    }

    /// Mean weighted joint log-likelihood.
    pub fn score(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<Targets<'_>>,
        y_hat: Option<Targets<'_>>,
    ) -> Result<f64> {
        let samples = self.score_samples(x, y, y_hat)?;
        Ok(samples.sum() / samples.len() as f64)
    }

    /// Bayesian information criterion; lower is better.
    pub fn bic(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<Targets<'_>>,
        y_hat: Option<Targets<'_>>,
    ) -> Result<f64> {
        let n = x.nrows() as f64;
        let score = self.score(x, y, y_hat)?;
        Ok(-2.0 * score * n + self.n_parameters()? as f64 * n.ln())
    }

    /// Akaike information criterion; lower is better.
    pub fn aic(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<Targets<'_>>,
        y_hat: Option<Targets<'_>>,
    ) -> Result<f64> {
        let n = x.nrows() as f64;
        let score = self.score(x, y, y_hat)?;
        Ok(-2.0 * score * n + 2.0 * self.n_parameters()? as f64)
    }

    /// Free parameters of the fitted model.
    pub fn n_parameters(&self) -> Result<usize> {
        Ok(self.params()?.n_parameters())
    }

    /// Fitted parameter tuple.
    pub fn params(&self) -> Result<&MixtureParams> {
        self.fitted.as_ref().map(|f| &f.params).ok_or(Error::NotFitted)
    }

    /// Report of the last fit.
    pub fn report(&self) -> Result<&FitReport> {
        self.fitted.as_ref().map(|f| &f.report).ok_or(Error::NotFitted)
    }

    /// Mixture weights, `(k,)`.
    pub fn weights(&self) -> Result<&Array1<f64>> {
        Ok(self.params()?.weights())
    }

    /// Component means, `(k, d)`.
    pub fn means(&self) -> Result<&Array2<f64>> {
        Ok(self.params()?.means())
    }

    /// Regularized covariances in their structure's layout.
    pub fn covariances(&self) -> Result<&Covariances> {
        Ok(self.params()?.covariances())
    }

    /// True-label distribution per component, `(k, c)`.
    pub fn y_probs(&self) -> Result<&Array2<f64>> {
        Ok(self.params()?.y_probs())
    }

    /// Predicted-label distribution per component, `(k, c)`.
    pub fn y_hat_probs(&self) -> Result<&Array2<f64>> {
        Ok(self.params()?.y_hat_probs())
    }

    /// Precision Cholesky factors.
    pub fn precisions_cholesky(&self) -> Result<&Covariances> {
        Ok(self.params()?.precisions_cholesky())
    }

    /// Precision matrices.
    pub fn precisions(&self) -> Result<Covariances> {
        Ok(self.params()?.precisions())
    }

    /// Whether any restart of the last fit converged.
    pub fn converged(&self) -> Result<bool> {
        Ok(self.report()?.converged)
    }

    /// EM iterations of the winning restart.
    pub fn n_iter(&self) -> Result<usize> {
        Ok(self.report()?.n_iter)
    }

    /// Lower bound of the winning restart.
    pub fn lower_bound(&self) -> Result<f64> {
        Ok(self.report()?.lower_bound)
    }

    fn fit_log_resp(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: Targets<'_>,
        y_hat: Targets<'_>,
    ) -> Result<Array2<f64>> {
        self.config.validate()?;
        let k = self.config.n_components;
        check_embeddings(x, k)?;

        let warm = match (&self.fitted, self.config.warm_start) {
            (Some(fitted), true) => Some(fitted),
            _ => None,
        };
        if let Some(fitted) = warm {
            if fitted.params.n_features() != x.ncols() {
                return Err(Error::DimensionMismatch {
                    expected: fitted.params.n_features(),
                    found: x.ncols(),
                });
            }
        }

        let n_classes = warm.map(|f| f.params.n_classes());
        let y = binarize(y, n_classes)?;
        let y_hat = binarize(y_hat, Some(y.ncols()))?;
        check_rows(&y, x.nrows())?;
        check_rows(&y_hat, x.nrows())?;

        if warm.is_none() && self.config.init == InitStrategy::Error {
            let required = error_init_required(y.ncols());
            if k < required {
                return Err(Error::TooFewComponents {
                    n_components: k,
                    required,
                });
            }
        }

        let mut master = StdRng::seed_from_u64(self.config.seed.unwrap_or_else(|| rand::rng().random()));
        let start = warm.map(|f| (f.params.clone(), f.report.lower_bound));
        let n_restarts = if start.is_some() { 1 } else { self.config.n_restarts };
        let seeds: Vec<u64> = (0..n_restarts).map(|_| master.random()).collect();

        debug!(
            n_samples = x.nrows(),
            n_features = x.ncols(),
            n_classes = y.ncols(),
            n_components = k,
            n_restarts,
            warm_start = start.is_some(),
            "fitting joint mixture"
        );

        let run = |(restart, &seed): (usize, &u64)| {
            self.run_restart(restart, seed, x, y.view(), y_hat.view(), start.as_ref())
        };

        #[cfg(feature = "parallel")]
        let outcomes = seeds
            .par_iter()
            .enumerate()
            .map(run)
            .collect::<Result<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let outcomes = seeds.iter().enumerate().map(run).collect::<Result<Vec<_>>>()?;

        let converged = outcomes.iter().any(|o| o.trace.converged);
        let mut best: Option<usize> = None;
        let mut best_lower_bound = f64::NEG_INFINITY;
        for (i, outcome) in outcomes.iter().enumerate() {
            if outcome.lower_bound > best_lower_bound {
                best_lower_bound = outcome.lower_bound;
                best = Some(i);
            }
        }
        let best_restart = best.unwrap_or(0);

        let mut restarts = Vec::with_capacity(outcomes.len());
        let mut best_params = None;
        for (i, outcome) in outcomes.into_iter().enumerate() {
            if i == best_restart {
                best_params = Some(outcome.params);
            }
            restarts.push(outcome.trace);
        }
        let params = best_params.ok_or_else(|| Error::Other("no restart produced parameters".into()))?;

        let warning = if converged {
            None
        } else {
            let message = format!(
                "none of {} restarts converged within {} iterations; \
                 try a different init, a larger max_iter or tol, or check for degenerate data",
                restarts.len(),
                self.config.max_iter
            );
            warn!(
                n_restarts = restarts.len(),
                max_iter = self.config.max_iter,
                lower_bound = best_lower_bound,
                "joint mixture did not converge"
            );
            Some(message)
        };

        let report = FitReport {
            converged,
            n_iter: restarts[best_restart].n_iter,
            lower_bound: best_lower_bound,
            best_restart,
            restarts,
            warning,
        };
        debug!(
            best_restart,
            lower_bound = report.lower_bound,
            n_iter = report.n_iter,
            converged,
            "joint mixture fitted"
        );

        // Final E-step so that fit_predict agrees with predict.
        let (_, log_resp) = params.log_prob_resp(
            x,
            Some(y.view()),
            Some(y_hat.view()),
            self.config.y_weight,
            self.config.y_hat_weight,
        );
        self.fitted = Some(Fitted { params, report });
        Ok(log_resp)
    }

    fn run_restart(
        &self,
        restart: usize,
        seed: u64,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        y_hat: ArrayView2<'_, f64>,
        start: Option<&(MixtureParams, f64)>,
    ) -> Result<RestartOutcome> {
        let cfg = &self.config;

        // One component: every responsibility is 1 and the estimate is closed-form.
        if cfg.n_components == 1 {
            let resp = Array2::ones((x.nrows(), 1));
            let params = self.m_step(x, y, y_hat, resp.view())?;
            let (log_norm, _) = self.e_step(&params, x, y, y_hat);
            let lower_bound = mean(&log_norm);
            return Ok(RestartOutcome {
                params,
                lower_bound,
                trace: RestartTrace {
                    lower_bounds: vec![lower_bound],
                    n_iter: 1,
                    converged: true,
                },
            });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let (mut params, mut lower_bound) = match start {
            Some((params, lower_bound)) => (params.clone(), *lower_bound),
            None => {
                let resp = initial_responsibilities(cfg.init, x, y, y_hat, cfg.n_components, &mut rng)?;
                (self.m_step(x, y, y_hat, resp.view())?, f64::NEG_INFINITY)
            }
        };

        let mut lower_bounds = Vec::with_capacity(cfg.max_iter);
        let mut converged = false;
        let mut n_iter = 0;
        for iter in 1..=cfg.max_iter {
            let previous = lower_bound;
            let (log_norm, log_resp) = self.e_step(&params, x, y, y_hat);
            params = self.m_step(x, y, y_hat, log_resp.mapv(f64::exp).view())?;
            lower_bound = mean(&log_norm);
            lower_bounds.push(lower_bound);
            n_iter = iter;

            let change = lower_bound - previous;
            debug!(restart, iter, lower_bound, change, "em iteration");
            if change.abs() < cfg.tol {
                converged = true;
                break;
            }
        }

        Ok(RestartOutcome {
            params,
            lower_bound,
            trace: RestartTrace {
                lower_bounds,
                n_iter,
                converged,
            },
        })
    }

    fn e_step(
        &self,
        params: &MixtureParams,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        y_hat: ArrayView2<'_, f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        params.log_prob_resp(
            x,
            Some(y),
            Some(y_hat),
            self.config.y_weight,
            self.config.y_hat_weight,
        )
    }

    fn m_step(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        y_hat: ArrayView2<'_, f64>,
        resp: ArrayView2<'_, f64>,
    ) -> Result<MixtureParams> {
        let est = estimate_parameters(
            x,
            y,
            y_hat,
            resp,
            self.config.reg_covar,
            self.config.covariance_type,
        );
        MixtureParams::from_estimates(est, x.nrows())
    }

    fn log_prob_resp(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<Targets<'_>>,
        y_hat: Option<Targets<'_>>,
    ) -> Result<(Array1<f64>, Array2<f64>)> {
        let params = self.params()?;
        if x.nrows() == 0 {
            return Err(Error::EmptyInput);
        }
        if x.ncols() != params.n_features() {
            return Err(Error::DimensionMismatch {
                expected: params.n_features(),
                found: x.ncols(),
            });
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFinite { name: "embeddings" });
        }

        let n_classes = Some(params.n_classes());
        let y = y.map(|t| binarize(t, n_classes)).transpose()?;
        let y_hat = y_hat.map(|t| binarize(t, n_classes)).transpose()?;
        for channel in [&y, &y_hat].into_iter().flatten() {
            check_rows(channel, x.nrows())?;
        }

        Ok(params.log_prob_resp(
            x,
            y.as_ref().map(|a| a.view()),
            y_hat.as_ref().map(|a| a.view()),
            self.config.y_weight,
            self.config.y_hat_weight,
        ))
    }
}

fn check_embeddings(x: ArrayView2<'_, f64>, n_components: usize) -> Result<()> {
    let (n_samples, n_features) = x.dim();
    if n_samples == 0 || n_features == 0 {
        return Err(Error::EmptyInput);
    }
    let required = n_components.max(2);
    if n_samples < required {
        return Err(Error::TooFewSamples {
            n_samples,
            required,
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::NonFinite { name: "embeddings" });
    }
    Ok(())
}

fn check_rows(channel: &Array2<f64>, n_samples: usize) -> Result<()> {
    if channel.nrows() != n_samples {
        return Err(Error::DimensionMismatch {
            expected: n_samples,
            found: channel.nrows(),
        });
    }
    Ok(())
}

fn mean(values: &Array1<f64>) -> f64 {
    values.sum() / values.len() as f64
}

fn argmax_rows(m: &Array2<f64>) -> Vec<usize> {
    m.axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            for (k, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = k;
                }
            }
            best
        })
        .collect()
}
