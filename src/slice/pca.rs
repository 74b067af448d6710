//! Principal component analysis for embedding reduction.
//!
//! High-dimensional embeddings make full and even diagonal covariances
//! expensive and poorly conditioned. Projecting onto the top principal
//! directions first keeps the mixture tractable.
//!
//! ```text
//! C = (X - μ)ᵀ (X - μ) / (n - 1)      sample covariance
//! C = V Λ Vᵀ                           symmetric eigendecomposition
//! Z = (X - μ) V_k                      scores on the top-k directions
//! ```
//!
//! Each direction's sign is fixed so that its largest-magnitude loading is
//! positive, making the projection deterministic.

use crate::error::{Error, Result};
use faer::{Mat, Side};
use ndarray::{Array1, Array2, ArrayView2, Axis};

#[derive(Debug, Clone)]
struct PcaFit {
    mean: Array1<f64>,
    /// `(n_components, n_features)`, one direction per row.
    components: Array2<f64>,
    explained_variance: Array1<f64>,
}

/// Centered PCA via a dense symmetric eigendecomposition.
#[derive(Debug, Clone)]
pub struct Pca {
    n_components: usize,
    fitted: Option<PcaFit>,
}

impl Pca {
    /// Keep the top `n_components` directions.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            fitted: None,
        }
    }

    /// Number of directions kept.
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Learn the mean and principal directions of `x`.
    ///
    /// # Errors
    ///
    /// - [`Error::TooFewSamples`] for fewer than two rows.
    /// - [`Error::InvalidParameter`] unless `1 ≤ n_components ≤ min(n_samples, n_features)`.
    /// - [`Error::NonFinite`] for NaN or infinite input.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<&mut Self> {
        let (n, d) = x.dim();
        if n < 2 {
            return Err(Error::TooFewSamples {
                n_samples: n,
                required: 2,
            });
        }
        if self.n_components == 0 || self.n_components > n.min(d) {
            return Err(Error::InvalidParameter {
                name: "n_pca_components",
                message: "must be between 1 and min(n_samples, n_features)",
            });
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFinite { name: "embeddings" });
        }

        let mean = x.sum_axis(Axis(0)) / n as f64;
        let centered = &x - &mean;
        let cov = centered.t().dot(&centered) / (n - 1) as f64;

        let mat = Mat::<f64>::from_fn(d, d, |i, j| cov[[i, j]]);
        let eig = mat
            .as_ref()
            .self_adjoint_eigen(Side::Lower)
            .map_err(|err| Error::Other(format!("eigendecomposition failed: {err:?}")))?;
        let values = eig.S();
        let vectors = eig.U();

        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

        let mut components = Array2::zeros((self.n_components, d));
        let mut explained_variance = Array1::zeros(self.n_components);
        for (c, &idx) in order.iter().take(self.n_components).enumerate() {
            let mut pivot = 0;
            for j in 1..d {
                if vectors[(j, idx)].abs() > vectors[(pivot, idx)].abs() {
                    pivot = j;
                }
            }
            let sign = if vectors[(pivot, idx)] < 0.0 { -1.0 } else { 1.0 };
            for j in 0..d {
                components[[c, j]] = sign * vectors[(j, idx)];
            }
            explained_variance[c] = values[idx].max(0.0);
        }

        self.fitted = Some(PcaFit {
            mean,
            components,
            explained_variance,
        });
        Ok(self)
    }

    /// Project `x` onto the fitted directions.
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let fit = self.fitted.as_ref().ok_or(Error::NotFitted)?;
        if x.ncols() != fit.mean.len() {
            return Err(Error::DimensionMismatch {
                expected: fit.mean.len(),
                found: x.ncols(),
            });
        }
        Ok((&x - &fit.mean).dot(&fit.components.t()))
    }

    /// Fit, then project the same data.
    pub fn fit_transform(&mut self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Map scores back into the original feature space.
    pub fn inverse_transform(&self, scores: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let fit = self.fitted.as_ref().ok_or(Error::NotFitted)?;
        if scores.ncols() != self.n_components {
            return Err(Error::DimensionMismatch {
                expected: self.n_components,
                found: scores.ncols(),
            });
        }
        Ok(scores.dot(&fit.components) + &fit.mean)
    }

    /// Principal directions, one per row.
    pub fn components(&self) -> Result<&Array2<f64>> {
        Ok(&self.fitted.as_ref().ok_or(Error::NotFitted)?.components)
    }

    /// Variance captured by each direction, descending.
    pub fn explained_variance(&self) -> Result<&Array1<f64>> {
        Ok(&self.fitted.as_ref().ok_or(Error::NotFitted)?.explained_variance)
    }

    /// Per-feature mean removed before projection.
    pub fn mean(&self) -> Result<&Array1<f64>> {
        Ok(&self.fitted.as_ref().ok_or(Error::NotFitted)?.mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::prelude::*;
    use rand_distr::{Distribution, Normal};

    /// Elongated cloud: large spread along (1, 1, 0), small elsewhere.
    fn cloud(n: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let major = Normal::new(0.0, 5.0).unwrap();
        let minor = Normal::new(0.0, 0.3).unwrap();
        let mut x = Array2::zeros((n, 3));
        for mut row in x.rows_mut() {
            let t = major.sample(&mut rng);
            row[0] = t + minor.sample(&mut rng) + 1.0;
            row[1] = t + minor.sample(&mut rng) - 2.0;
            row[2] = minor.sample(&mut rng);
        }
        x
    }

    #[test]
    fn test_variance_ordering_and_direction() {
        let x = cloud(300, 1);
        let mut pca = Pca::new(2);
        pca.fit(x.view()).unwrap();

        let var = pca.explained_variance().unwrap();
        assert!(var[0] > var[1]);
        assert!(var[0] > 10.0);

        let first = pca.components().unwrap().row(0).to_owned();
        let diag = 1.0 / 2f64.sqrt();
        assert!((first[0] - diag).abs() < 0.05);
        assert!((first[1] - diag).abs() < 0.05);
        assert!(first[2].abs() < 0.05);
    }

    #[test]
    fn test_components_orthonormal() {
        let x = cloud(100, 2);
        let mut pca = Pca::new(3);
        pca.fit(x.view()).unwrap();
        let c = pca.components().unwrap();
        let gram = c.dot(&c.t());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_full_rank_reconstruction_is_exact() {
        let x = array![[1.0, 2.0], [3.0, 1.0], [0.0, -1.0], [2.5, 4.0]];
        let mut pca = Pca::new(2);
        let scores = pca.fit_transform(x.view()).unwrap();
        let back = pca.inverse_transform(scores.view()).unwrap();
        for (a, b) in back.iter().zip(x.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scores_are_centered() {
        let x = cloud(50, 3);
        let mut pca = Pca::new(1);
        let scores = pca.fit_transform(x.view()).unwrap();
        assert!(scores.sum().abs() < 1e-8);
    }

    #[test]
    fn test_sign_is_deterministic() {
        let x = cloud(80, 4);
        let negated = x.mapv(|v| -v);
        let mut a = Pca::new(2);
        let mut b = Pca::new(2);
        a.fit(x.view()).unwrap();
        b.fit(negated.view()).unwrap();
        for (u, v) in a.components().unwrap().iter().zip(b.components().unwrap().iter()) {
            assert!((u - v).abs() < 1e-9);
        }
        for row in a.components().unwrap().rows() {
            let pivot = row.iter().copied().fold(0.0f64, |m, v| if v.abs() > m.abs() { v } else { m });
            assert!(pivot > 0.0);
        }
    }

    #[test]
    fn test_rejects_bad_component_counts() {
        let x = array![[1.0, 2.0], [3.0, 1.0], [0.0, -1.0]];
        assert!(matches!(
            Pca::new(3).fit(x.view()),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            Pca::new(0).fit(x.view()),
            Err(Error::InvalidParameter { .. })
        ));
        assert_eq!(Pca::new(1).transform(x.view()).unwrap_err(), Error::NotFitted);
    }
}
