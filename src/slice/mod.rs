//! Error-slice discovery on top of the joint mixture.
//!
//! [`ErrorSlicer`] reduces embeddings with [`Pca`], fits a
//! [`JointMixture`], and keeps the components whose true-label and
//! predicted-label distributions disagree the most:
//!
//! ```text
//! disparity(k) = | p(y = 1 | k) - p(ŷ = 1 | k) |
//! ```
//!
//! A component full of false negatives has `p(y = 1) ≈ 1` and
//! `p(ŷ = 1) ≈ 0`, so it ranks near the top; a component the model gets
//! right has the two close together and ranks low.

mod pca;
mod traits;

pub use pca::Pca;
pub use traits::SliceDiscovery;

use crate::error::{Error, Result};
use crate::labels::Targets;
use crate::mixture::{CovarianceType, InitStrategy, JointMixture, MixtureConfig};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::{debug, info};

/// Per-component `|p(y = 1) - p(ŷ = 1)|`.
///
/// # Errors
///
/// [`Error::ShapeMismatch`] if the tables differ in shape and
/// [`Error::DimensionMismatch`] if they have fewer than two classes.
pub fn disparity_scores(
    y_probs: ArrayView2<'_, f64>,
    y_hat_probs: ArrayView2<'_, f64>,
) -> Result<Array1<f64>> {
    if y_probs.dim() != y_hat_probs.dim() {
        return Err(Error::ShapeMismatch {
            expected: format!("{:?}", y_probs.dim()),
            actual: format!("{:?}", y_hat_probs.dim()),
        });
    }
    if y_probs.ncols() < 2 {
        return Err(Error::DimensionMismatch {
            expected: 2,
            found: y_probs.ncols(),
        });
    }
    Ok((&y_probs.column(1) - &y_hat_probs.column(1)).mapv(f64::abs))
}

/// Indices of the `n_slices` highest scores, highest first.
///
/// Ties keep component order.
pub fn rank_slices(scores: ArrayView1<'_, f64>, n_slices: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.truncate(n_slices);
    order
}

#[derive(Debug, Clone)]
struct FittedSlicer {
    pca: Option<Pca>,
    mixture: JointMixture,
    disparity: Array1<f64>,
    slice_indices: Vec<usize>,
}

/// Slice discovery by joint mixture modelling.
///
/// # Example
///
/// ```rust,no_run
/// use ndarray::Array2;
/// use sliver::slice::{ErrorSlicer, SliceDiscovery};
/// use sliver::Targets;
///
/// # let embeddings = Array2::<f64>::zeros((500, 256));
/// # let labels = vec![0usize; 500];
/// # let probs = ndarray::Array1::<f64>::zeros(500);
/// let mut slicer = ErrorSlicer::new().with_n_slices(3).with_seed(0);
/// slicer.fit(embeddings.view(), Targets::from(&labels), Targets::from(&probs))?;
/// let membership = slicer.transform(embeddings.view(), None, None)?;
/// assert_eq!(membership.ncols(), 3);
/// # Ok::<(), sliver::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ErrorSlicer {
    n_slices: usize,
    n_pca_components: Option<usize>,
    mixture: MixtureConfig,
    fitted: Option<FittedSlicer>,
}

impl Default for ErrorSlicer {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorSlicer {
    /// Five slices over a 25-component diagonal mixture with error-driven
    /// initialization, after reducing to 128 principal components.
    pub fn new() -> Self {
        Self {
            n_slices: 5,
            n_pca_components: Some(128),
            mixture: MixtureConfig::new(25)
                .with_covariance_type(CovarianceType::Diag)
                .with_init(InitStrategy::Error)
                .with_label_weight(1.0)
                .with_max_iter(100),
            fitted: None,
        }
    }

    /// Set number of slices returned.
    pub fn with_n_slices(mut self, n: usize) -> Self {
        self.n_slices = n;
        self
    }

    /// Set PCA width; `None` fits the mixture on the raw embeddings.
    pub fn with_pca_components(mut self, n: Option<usize>) -> Self {
        self.n_pca_components = n;
        self
    }

    /// Replace the whole mixture configuration.
    pub fn with_mixture_config(mut self, config: MixtureConfig) -> Self {
        self.mixture = config;
        self
    }

    /// Set number of mixture components.
    pub fn with_n_components(mut self, n: usize) -> Self {
        self.mixture.n_components = n;
        self
    }

    /// Set covariance structure of the mixture.
    pub fn with_covariance_type(mut self, covariance_type: CovarianceType) -> Self {
        self.mixture.covariance_type = covariance_type;
        self
    }

    /// Set mixture initialization strategy.
    pub fn with_init(mut self, init: InitStrategy) -> Self {
        self.mixture.init = init;
        self
    }

    /// Set weight of the true-label term.
    pub fn with_y_weight(mut self, weight: f64) -> Self {
        self.mixture.y_weight = weight;
        self
    }

    /// Set weight of the predicted-label term.
    pub fn with_y_hat_weight(mut self, weight: f64) -> Self {
        self.mixture.y_hat_weight = weight;
        self
    }

    /// Set EM iteration cap.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.mixture.max_iter = max_iter;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.mixture.seed = Some(seed);
        self
    }

    /// Mixture configuration used by the next `fit`.
    pub fn mixture_config(&self) -> &MixtureConfig {
        &self.mixture
    }

    /// Check the slicer options and the mixture options.
    pub fn validate(&self) -> Result<()> {
        self.mixture.validate()?;
        if self.n_slices == 0 {
            return Err(Error::InvalidParameter {
                name: "n_slices",
                message: "must be > 0",
            });
        }
        if self.n_slices > self.mixture.n_components {
            return Err(Error::InvalidParameter {
                name: "n_slices",
                message: "must not exceed the number of mixture components",
            });
        }
        if self.n_pca_components == Some(0) {
            return Err(Error::InvalidParameter {
                name: "n_pca_components",
                message: "must be > 0",
            });
        }
        Ok(())
    }

    /// Ranked component indices chosen as slices.
    pub fn slice_indices(&self) -> Result<&[usize]> {
        Ok(&self.fitted()?.slice_indices)
    }

    /// Disparity of every mixture component.
    pub fn disparity(&self) -> Result<&Array1<f64>> {
        Ok(&self.fitted()?.disparity)
    }

    /// The fitted mixture.
    pub fn mixture(&self) -> Result<&JointMixture> {
        Ok(&self.fitted()?.mixture)
    }

    /// The fitted PCA, if reduction is enabled.
    pub fn pca(&self) -> Result<Option<&Pca>> {
        Ok(self.fitted()?.pca.as_ref())
    }

    fn fitted(&self) -> Result<&FittedSlicer> {
        self.fitted.as_ref().ok_or(Error::NotFitted)
    }
}

impl SliceDiscovery for ErrorSlicer {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: Targets<'_>, y_hat: Targets<'_>) -> Result<()> {
        self.validate()?;

        let (pca, reduced) = match self.n_pca_components {
            Some(k) => {
                let mut pca = Pca::new(k);
                let reduced = pca.fit_transform(x)?;
                (Some(pca), reduced)
            }
            None => (None, x.to_owned()),
        };

        let mut mixture = JointMixture::new(self.mixture.clone());
        mixture.fit(reduced.view(), y, y_hat)?;

        let disparity = disparity_scores(mixture.y_probs()?.view(), mixture.y_hat_probs()?.view())?;
        let slice_indices = rank_slices(disparity.view(), self.n_slices);
        debug!(?disparity, "component disparity");
        info!(
            n_samples = x.nrows(),
            n_features = reduced.ncols(),
            ?slice_indices,
            converged = mixture.converged()?,
            "error slices fitted"
        );

        self.fitted = Some(FittedSlicer {
            pca,
            mixture,
            disparity,
            slice_indices,
        });
        Ok(())
    }

    fn transform(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<Targets<'_>>,
        y_hat: Option<Targets<'_>>,
    ) -> Result<Array2<f64>> {
        let fitted = self.fitted()?;
        let proba = match &fitted.pca {
            Some(pca) => fitted.mixture.predict_proba(pca.transform(x)?.view(), y, y_hat)?,
            None => fitted.mixture.predict_proba(x, y, y_hat)?,
        };
        Ok(proba.select(Axis(1), &fitted.slice_indices))
    }

    fn n_slices(&self) -> usize {
        self.n_slices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_disparity_is_positive_class_gap() {
        let y = array![[0.0, 1.0], [0.5, 0.5], [1.0, 0.0]];
        let y_hat = array![[0.9, 0.1], [0.5, 0.5], [0.2, 0.8]];
        let d = disparity_scores(y.view(), y_hat.view()).unwrap();
        assert!((d[0] - 0.9).abs() < 1e-12);
        assert_eq!(d[1], 0.0);
        assert!((d[2] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_disparity_shape_errors() {
        let a = array![[1.0, 0.0]];
        let b = array![[1.0, 0.0], [0.0, 1.0]];
        assert!(matches!(
            disparity_scores(a.view(), b.view()),
            Err(Error::ShapeMismatch { .. })
        ));
        let single = array![[1.0]];
        assert!(matches!(
            disparity_scores(single.view(), single.view()),
            Err(Error::DimensionMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_rank_is_descending_and_stable() {
        let scores = Array1::from(vec![0.2, 0.9, 0.2, 0.9, 0.5]);
        assert_eq!(rank_slices(scores.view(), 3), vec![1, 3, 4]);
        assert_eq!(rank_slices(scores.view(), 5), vec![1, 3, 4, 0, 2]);
        assert_eq!(rank_slices(scores.view(), 10).len(), 5);
    }

    #[test]
    fn test_validate() {
        assert!(ErrorSlicer::new().validate().is_ok());
        assert!(ErrorSlicer::new().with_n_slices(26).validate().is_err());
        assert!(ErrorSlicer::new().with_n_slices(0).validate().is_err());
        assert!(ErrorSlicer::new()
            .with_pca_components(Some(0))
            .validate()
            .is_err());
        assert!(ErrorSlicer::new()
            .with_n_components(3)
            .with_n_slices(3)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_unfitted_transform() {
        let slicer = ErrorSlicer::new();
        let x = array![[0.0, 1.0]];
        assert_eq!(slicer.transform(x.view(), None, None).unwrap_err(), Error::NotFitted);
        assert_eq!(slicer.n_slices(), 5);
    }

    #[test]
    fn test_fit_transform_selects_ranked_columns() {
        // Two groups of 30; predictions are wrong on every odd row.
        let n = 60;
        let x = Array2::from_shape_fn((n, 4), |(i, j)| {
            let base = if i < 30 { 0.0 } else { 8.0 };
            base + ((i * 7 + j * 3) % 11) as f64 * 0.1
        });
        let y: Vec<usize> = (0..n).map(|i| usize::from(i < 30)).collect();
        let y_hat = Array1::from_shape_fn(n, |i| {
            let correct = i % 2 == 0;
            if (y[i] == 1) == correct {
                0.9
            } else {
                0.1
            }
        });

        let mut slicer = ErrorSlicer::new()
            .with_pca_components(Some(2))
            .with_n_components(4)
            .with_n_slices(2)
            .with_seed(3);
        slicer
            .fit(x.view(), Targets::from(&y), Targets::from(&y_hat))
            .unwrap();

        let indices = slicer.slice_indices().unwrap().to_vec();
        assert_eq!(indices.len(), 2);
        let disparity = slicer.disparity().unwrap();
        assert!(disparity[indices[0]] >= disparity[indices[1]]);
        for k in 0..4 {
            if !indices.contains(&k) {
                assert!(disparity[k] <= disparity[indices[1]]);
            }
        }

        let membership = slicer
            .transform(x.view(), Some(Targets::from(&y)), Some(Targets::from(&y_hat)))
            .unwrap();
        let full = slicer
            .mixture()
            .unwrap()
            .predict_proba(
                slicer.pca().unwrap().unwrap().transform(x.view()).unwrap().view(),
                Some(Targets::from(&y)),
                Some(Targets::from(&y_hat)),
            )
            .unwrap();
        assert_eq!(membership.dim(), (n, 2));
        for (j, &k) in indices.iter().enumerate() {
            assert_eq!(membership.column(j), full.column(k));
        }
    }

    #[test]
    fn test_pca_wider_than_data_is_rejected() {
        let x = Array2::from_shape_fn((10, 3), |(i, j)| (i + j) as f64);
        let y = vec![0usize; 10];
        let mut slicer = ErrorSlicer::new().with_n_components(4).with_n_slices(2);
        assert!(matches!(
            slicer.fit(x.view(), Targets::from(&y), Targets::from(&y)),
            Err(Error::InvalidParameter {
                name: "n_pca_components",
                ..
            })
        ));
    }
}
