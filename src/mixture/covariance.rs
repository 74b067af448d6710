//! Covariance containers, precision factors and Gaussian log-densities.
//!
//! Every structure is stored in its natural shape and converted once per
//! M-step into a *precision Cholesky* factor `P` with `P Pᵀ = Σ⁻¹`:
//!
//! ```text
//! structure   Σ shape     P
//! ─────────   ─────────   ─────────────────────────────
//! full        (k, d, d)   (L_k⁻¹)ᵀ   where Σ_k = L_k L_kᵀ
//! tied        (d, d)      (L⁻¹)ᵀ     shared by all components
//! diag        (k, d)      1 / √σ²_kj
//! spherical   (k,)        1 / √σ²_k
//! ```
//!
//! With `P` in hand the Gaussian log-density never needs an explicit inverse:
//!
//! ```text
//! log N(x | μ, Σ) = -½ (d ln 2π + ||(x - μ) P||²) + ln |P|
//! ```
//!
//! and `ln |P|` is just the sum of the logs of its diagonal.

use super::config::CovarianceType;
use crate::error::{Error, Result};
use faer::linalg::solvers::Llt;
use faer::linalg::triangular_solve::solve_lower_triangular_in_place;
use faer::{Mat, Par, Side};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Covariances (or their precision factors) in structure-specific layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Covariances {
    /// `(n_components, n_features, n_features)`.
    Full(Array3<f64>),
    /// `(n_features, n_features)`, shared.
    Tied(Array2<f64>),
    /// `(n_components, n_features)`.
    Diag(Array2<f64>),
    /// `(n_components,)`.
    Spherical(Array1<f64>),
}

impl Covariances {
    /// The structure tag for this layout.
    pub fn covariance_type(&self) -> CovarianceType {
        match self {
            Covariances::Full(_) => CovarianceType::Full,
            Covariances::Tied(_) => CovarianceType::Tied,
            Covariances::Diag(_) => CovarianceType::Diag,
            Covariances::Spherical(_) => CovarianceType::Spherical,
        }
    }

    /// Compute the precision Cholesky factors of these covariances.
    ///
    /// # Errors
    ///
    /// [`Error::InversionFailed`] if a matrix is not positive-definite or a
    /// variance is not strictly positive. Regularization normally rules this
    /// out; hitting it means `reg_covar` is too small for the data.
    pub fn precision_cholesky(&self) -> Result<Covariances> {
        match self {
            Covariances::Full(covs) => {
                let mut out = Array3::zeros(covs.raw_dim());
                for (k, cov) in covs.outer_iter().enumerate() {
                    out.index_axis_mut(Axis(0), k)
                        .assign(&upper_precision_factor(cov)?);
                }
                Ok(Covariances::Full(out))
            }
            Covariances::Tied(cov) => Ok(Covariances::Tied(upper_precision_factor(cov.view())?)),
            Covariances::Diag(vars) => {
                if vars.iter().any(|&v| v <= 0.0) {
                    return Err(Error::InversionFailed);
                }
                Ok(Covariances::Diag(vars.mapv(|v| 1.0 / v.sqrt())))
            }
            Covariances::Spherical(vars) => {
                if vars.iter().any(|&v| v <= 0.0) {
                    return Err(Error::InversionFailed);
                }
                Ok(Covariances::Spherical(vars.mapv(|v| 1.0 / v.sqrt())))
            }
        }
    }

    /// Precision matrices (`P Pᵀ`, or `P²` for the diagonal layouts), treating
    /// `self` as a precision Cholesky factor.
    pub fn precisions_from_cholesky(&self) -> Covariances {
        match self {
            Covariances::Full(chol) => {
                let mut out = Array3::zeros(chol.raw_dim());
                for (k, p) in chol.outer_iter().enumerate() {
                    out.index_axis_mut(Axis(0), k).assign(&p.dot(&p.t()));
                }
                Covariances::Full(out)
            }
            Covariances::Tied(p) => Covariances::Tied(p.dot(&p.t())),
            Covariances::Diag(p) => Covariances::Diag(p.mapv(|v| v * v)),
            Covariances::Spherical(p) => Covariances::Spherical(p.mapv(|v| v * v)),
        }
    }

    /// `ln |P_k|` per component, treating `self` as a precision Cholesky factor.
    pub fn log_det_cholesky(&self, n_components: usize, n_features: usize) -> Array1<f64> {
        match self {
            Covariances::Full(chol) => chol
                .outer_iter()
                .map(|p| p.diag().iter().map(|v| v.ln()).sum::<f64>())
                .collect(),
            Covariances::Tied(p) => {
                let log_det: f64 = p.diag().iter().map(|v| v.ln()).sum();
                Array1::from_elem(n_components, log_det)
            }
            Covariances::Diag(p) => p.map_axis(Axis(1), |row| row.iter().map(|v| v.ln()).sum::<f64>()),
            Covariances::Spherical(p) => p.mapv(|v| n_features as f64 * v.ln()),
        }
    }

    /// Gaussian log-density of every sample under every component,
    /// `(n_samples, n_components)`, treating `self` as a precision Cholesky
    /// factor.
    pub fn estimate_log_gaussian_prob(
        &self,
        x: ArrayView2<'_, f64>,
        means: &Array2<f64>,
    ) -> Array2<f64> {
        let (n_samples, n_features) = x.dim();
        let n_components = means.nrows();
        let log_det = self.log_det_cholesky(n_components, n_features);

        let mut mahalanobis = Array2::<f64>::zeros((n_samples, n_components));
        for (k, mean) in means.outer_iter().enumerate() {
            let mut col = mahalanobis.column_mut(k);
            match self {
                Covariances::Full(chol) => {
                    col.assign(&projected_sq_norms(x, mean, chol.index_axis(Axis(0), k)));
                }
                Covariances::Tied(p) => {
                    col.assign(&projected_sq_norms(x, mean, p.view()));
                }
                Covariances::Diag(p) => {
                    let prec = p.row(k);
                    for (i, sample) in x.outer_iter().enumerate() {
                        col[i] = sample
                            .iter()
                            .zip(mean.iter())
                            .zip(prec.iter())
                            .map(|((xi, mi), pi)| ((xi - mi) * pi).powi(2))
                            .sum();
                    }
                }
                Covariances::Spherical(p) => {
                    let prec2 = p[k] * p[k];
                    for (i, sample) in x.outer_iter().enumerate() {
                        let sq: f64 = sample
                            .iter()
                            .zip(mean.iter())
                            .map(|(xi, mi)| (xi - mi).powi(2))
                            .sum();
                        col[i] = sq * prec2;
                    }
                }
            }
        }

        let log_2pi = (2.0 * std::f64::consts::PI).ln();
        let mut out = mahalanobis.mapv(|m| -0.5 * (n_features as f64 * log_2pi + m));
        out += &log_det;
        out
    }

    /// Free covariance parameters for `n_components` components in `n_features` dimensions.
    pub fn n_parameters(
        covariance_type: CovarianceType,
        n_components: usize,
        n_features: usize,
    ) -> usize {
        let triangle = n_features * (n_features + 1) / 2;
        match covariance_type {
            CovarianceType::Full => n_components * triangle,
            CovarianceType::Diag => n_components * n_features,
            CovarianceType::Tied => triangle,
            CovarianceType::Spherical => n_components,
        }
    }
}

/// `||(x_i - μ) P||²` for every row of `x`.
fn projected_sq_norms(
    x: ArrayView2<'_, f64>,
    mean: ArrayView1<'_, f64>,
    p: ArrayView2<'_, f64>,
) -> Array1<f64> {
    let shifted = &x - &mean;
    shifted.dot(&p).map_axis(Axis(1), |row| row.dot(&row))
}

/// `(L⁻¹)ᵀ` for the lower Cholesky factor `L` of `cov`.
fn upper_precision_factor(cov: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    let d = cov.nrows();
    let mat = Mat::<f64>::from_fn(d, d, |i, j| cov[[i, j]]);
    let llt = Llt::new(mat.as_ref(), Side::Lower).map_err(|_| Error::InversionFailed)?;

    let mut inv = Mat::<f64>::identity(d, d);
    solve_lower_triangular_in_place(llt.L(), inv.as_mut(), Par::Seq);

    let factor = Array2::from_shape_fn((d, d), |(i, j)| inv[(j, i)]);
    if factor.iter().any(|v| !v.is_finite()) {
        return Err(Error::InversionFailed);
    }
    Ok(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn test_full_factor_inverts_covariance() {
        let cov = array![[4.0, 2.0], [2.0, 3.0]];
        let covs = Covariances::Full(cov.clone().insert_axis(Axis(0)));
        let prec = covs.precision_cholesky().unwrap().precisions_from_cholesky();
        let Covariances::Full(prec) = prec else {
            panic!("layout changed");
        };
        let ident = cov.dot(&prec.index_axis(Axis(0), 0));
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((ident[[i, j]] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_full_factor_is_upper_triangular() {
        let cov = array![[2.0, 0.5, 0.1], [0.5, 1.0, 0.2], [0.1, 0.2, 3.0]];
        let Covariances::Tied(p) = Covariances::Tied(cov).precision_cholesky().unwrap() else {
            panic!("layout changed");
        };
        for i in 0..3 {
            for j in 0..i {
                assert_eq!(p[[i, j]], 0.0);
            }
        }
    }

    #[test]
    fn test_factor_matches_inverse_of_lower_cholesky() {
        // Σ = L Lᵀ with L = [[2, 0], [1, √2]].
        let cov = array![[4.0, 2.0], [2.0, 3.0]];
        let Covariances::Tied(p) = Covariances::Tied(cov).precision_cholesky().unwrap() else {
            panic!("layout changed");
        };
        let r2 = 2f64.sqrt();
        let expected = array![[0.5, -1.0 / (2.0 * r2)], [0.0, 1.0 / r2]];
        for (a, b) in p.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12, "{p:?}");
        }
    }

    #[test]
    fn test_not_positive_definite_rejected() {
        let cov = array![[1.0, 2.0], [2.0, 1.0]];
        assert_eq!(
            Covariances::Tied(cov).precision_cholesky().unwrap_err(),
            Error::InversionFailed
        );
        assert_eq!(
            Covariances::Diag(array![[1.0, 0.0]]).precision_cholesky().unwrap_err(),
            Error::InversionFailed
        );
    }

    #[test]
    fn test_log_density_matches_closed_form() {
        // Standard normal in 2D at the mean: -ln(2π).
        let x = array![[1.0, -1.0]];
        let means = array![[1.0, -1.0]];
        let expected = -(2.0 * std::f64::consts::PI).ln();

        let layouts = [
            Covariances::Full(Array3::from_shape_fn((1, 2, 2), |(_, i, j)| {
                if i == j {
                    1.0
                } else {
                    0.0
                }
            })),
            Covariances::Tied(Array2::eye(2)),
            Covariances::Diag(array![[1.0, 1.0]]),
            Covariances::Spherical(array![1.0]),
        ];
        for covs in layouts {
            let chol = covs.precision_cholesky().unwrap();
            let lp = chol.estimate_log_gaussian_prob(x.view(), &means);
            assert!((lp[[0, 0]] - expected).abs() < 1e-12, "{:?}", covs);
        }
    }

    #[test]
    fn test_structures_agree_on_isotropic_covariance() {
        let x = array![[0.5, 2.0], [-1.0, 0.0], [3.0, 1.0]];
        let means = array![[0.0, 0.0], [1.0, 1.0]];
        let var = 2.5;

        let full = Covariances::Full(Array3::from_shape_fn((2, 2, 2), |(_, i, j)| {
            if i == j {
                var
            } else {
                0.0
            }
        }));
        let diag = Covariances::Diag(Array2::from_elem((2, 2), var));
        let sph = Covariances::Spherical(Array1::from_elem(2, var));

        let a = full.precision_cholesky().unwrap().estimate_log_gaussian_prob(x.view(), &means);
        let b = diag.precision_cholesky().unwrap().estimate_log_gaussian_prob(x.view(), &means);
        let c = sph.precision_cholesky().unwrap().estimate_log_gaussian_prob(x.view(), &means);
        for ((a, b), c) in a.iter().zip(b.iter()).zip(c.iter()) {
            assert!((a - b).abs() < 1e-10);
            assert!((a - c).abs() < 1e-10);
        }
    }

    #[test]
    fn test_parameter_counts() {
        assert_eq!(Covariances::n_parameters(CovarianceType::Full, 3, 4), 30);
        assert_eq!(Covariances::n_parameters(CovarianceType::Tied, 3, 4), 10);
        assert_eq!(Covariances::n_parameters(CovarianceType::Diag, 3, 4), 12);
        assert_eq!(Covariances::n_parameters(CovarianceType::Spherical, 3, 4), 3);
    }
}
