//! Closed-form M-step: the parameter-estimation kernel.
//!
//! Given responsibilities `R` (`n × k`), every parameter of the joint mixture
//! has a weighted-average maximum-likelihood update:
//!
//! ```text
//! nₖ      = Σᵢ rᵢₖ + 10ε
//! μₖ      = Σᵢ rᵢₖ xᵢ / nₖ
//! p(y)ₖ   = Σᵢ rᵢₖ yᵢ / nₖ          (true-label table)
//! p(ŷ)ₖ   = Σᵢ rᵢₖ ŷᵢ / nₖ          (predicted-label table)
//! Σₖ      = structure-specific, + reg·I
//! ```
//!
//! The `10ε` keeps a component that lost all its mass ("dead" component)
//! from dividing by zero; its means and tables collapse towards zero instead
//! of becoming NaN.

use super::config::CovarianceType;
use super::covariance::Covariances;
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};

/// Raw output of [`estimate_parameters`].
#[derive(Debug, Clone, PartialEq)]
pub struct Estimates {
    /// Effective sample count per component, `(k,)`.
    pub nk: Array1<f64>,
    /// Component means, `(k, d)`.
    pub means: Array2<f64>,
    /// Regularized covariances.
    pub covariances: Covariances,
    /// True-label distribution per component, `(k, c)`.
    pub y_probs: Array2<f64>,
    /// Predicted-label distribution per component, `(k, c)`.
    pub y_hat_probs: Array2<f64>,
}

/// Re-estimate all mixture parameters from responsibilities.
///
/// Pure: the same inputs always produce the same outputs. Weights are left as
/// raw counts (`nk`); the caller divides by `n_samples`.
pub fn estimate_parameters(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    y_hat: ArrayView2<'_, f64>,
    resp: ArrayView2<'_, f64>,
    reg_covar: f64,
    covariance_type: CovarianceType,
) -> Estimates {
    let nk = resp.sum_axis(Axis(0)) + 10.0 * f64::EPSILON;
    let means = weighted_average(resp, x, &nk);

    let covariances = match covariance_type {
        CovarianceType::Full => Covariances::Full(covariances_full(resp, x, &nk, &means, reg_covar)),
        CovarianceType::Tied => Covariances::Tied(covariances_tied(x, &nk, &means, reg_covar)),
        CovarianceType::Diag => Covariances::Diag(covariances_diag(resp, x, &nk, &means, reg_covar)),
        CovarianceType::Spherical => {
            let diag = covariances_diag(resp, x, &nk, &means, reg_covar);
            Covariances::Spherical(diag.sum_axis(Axis(1)) / x.ncols() as f64)
        }
    };

    Estimates {
        y_probs: weighted_average(resp, y, &nk),
        y_hat_probs: weighted_average(resp, y_hat, &nk),
        nk,
        means,
        covariances,
    }
}

/// `Rᵀ · data / nk`, one row per component.
fn weighted_average(resp: ArrayView2<'_, f64>, data: ArrayView2<'_, f64>, nk: &Array1<f64>) -> Array2<f64> {
    resp.t().dot(&data) / &nk.view().insert_axis(Axis(1))
}

fn covariances_full(
    resp: ArrayView2<'_, f64>,
    x: ArrayView2<'_, f64>,
    nk: &Array1<f64>,
    means: &Array2<f64>,
    reg_covar: f64,
) -> Array3<f64> {
    let (n_components, n_features) = means.dim();
    let mut covs = Array3::zeros((n_components, n_features, n_features));
    for (k, mean) in means.outer_iter().enumerate() {
        let diff = centered(x, mean);
        let weighted = &diff * &resp.column(k).insert_axis(Axis(1));
        let mut cov = weighted.t().dot(&diff) / nk[k];
        cov.diag_mut().mapv_inplace(|v| v + reg_covar);
        covs.index_axis_mut(Axis(0), k).assign(&cov);
    }
    covs
}

fn covariances_tied(
    x: ArrayView2<'_, f64>,
    nk: &Array1<f64>,
    means: &Array2<f64>,
    reg_covar: f64,
) -> Array2<f64> {
    let avg_x2 = x.t().dot(&x);
    let weighted_means = means * &nk.view().insert_axis(Axis(1));
    let avg_means2 = weighted_means.t().dot(means);
    let mut cov = (avg_x2 - avg_means2) / nk.sum();
    cov.diag_mut().mapv_inplace(|v| v + reg_covar);
    cov
}

fn covariances_diag(
    resp: ArrayView2<'_, f64>,
    x: ArrayView2<'_, f64>,
    nk: &Array1<f64>,
    means: &Array2<f64>,
    reg_covar: f64,
) -> Array2<f64> {
    let mut vars = Array2::zeros(means.raw_dim());
    for (k, mean) in means.outer_iter().enumerate() {
        let sq = centered(x, mean).mapv(|v| v * v);
        let var = resp.column(k).dot(&sq) / nk[k] + reg_covar;
        vars.row_mut(k).assign(&var);
    }
    vars
}

fn centered(x: ArrayView2<'_, f64>, mean: ArrayView1<'_, f64>) -> Array2<f64> {
    &x - &mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct Fixture {
        x: Array2<f64>,
        y: Array2<f64>,
        y_hat: Array2<f64>,
        resp: Array2<f64>,
    }

    // Two tight 1-D groups with hard responsibilities.
    fn hard_fixture() -> Fixture {
        Fixture {
            x: array![[0.0], [2.0], [10.0], [12.0]],
            y: array![[1.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 1.0]],
            y_hat: array![[1.0, 0.0], [0.0, 1.0], [0.0, 1.0], [0.0, 1.0]],
            resp: array![[1.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 1.0]],
        }
    }

    fn run(f: &Fixture, reg: f64, cov: CovarianceType) -> Estimates {
        estimate_parameters(f.x.view(), f.y.view(), f.y_hat.view(), f.resp.view(), reg, cov)
    }

    #[test]
    fn test_means_and_tables_are_weighted_averages() {
        let f = hard_fixture();
        let est = run(&f, 0.0, CovarianceType::Diag);

        assert!((est.nk[0] - 2.0).abs() < 1e-12);
        assert!((est.means[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((est.means[[1, 0]] - 11.0).abs() < 1e-12);
        assert!((est.y_probs[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((est.y_hat_probs[[0, 1]] - 0.5).abs() < 1e-12);
        assert!((est.y_hat_probs[[1, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_each_structure_closed_form() {
        let f = hard_fixture();
        let reg = 0.5;

        match run(&f, reg, CovarianceType::Full).covariances {
            Covariances::Full(c) => {
                assert!((c[[0, 0, 0]] - 1.5).abs() < 1e-12);
                assert!((c[[1, 0, 0]] - 1.5).abs() < 1e-12);
            }
            other => panic!("unexpected layout {:?}", other),
        }
        match run(&f, reg, CovarianceType::Diag).covariances {
            Covariances::Diag(c) => assert!((c[[1, 0]] - 1.5).abs() < 1e-12),
            other => panic!("unexpected layout {:?}", other),
        }
        match run(&f, reg, CovarianceType::Spherical).covariances {
            Covariances::Spherical(c) => assert!((c[0] - 1.5).abs() < 1e-12),
            other => panic!("unexpected layout {:?}", other),
        }
        // (0 + 4 + 100 + 144)/4 - (2·1 + 2·121)/4 = 1
        match run(&f, reg, CovarianceType::Tied).covariances {
            Covariances::Tied(c) => assert!((c[[0, 0]] - 1.5).abs() < 1e-9),
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_full_covariance_symmetric() {
        let x = array![[0.0, 1.0], [1.0, 3.0], [2.0, 2.0], [4.0, 0.5]];
        let y = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let resp = array![[0.9, 0.1], [0.6, 0.4], [0.3, 0.7], [0.2, 0.8]];
        let est = estimate_parameters(
            x.view(),
            y.view(),
            y.view(),
            resp.view(),
            1e-6,
            CovarianceType::Full,
        );
        let Covariances::Full(c) = est.covariances else {
            panic!("layout changed");
        };
        for k in 0..2 {
            assert!((c[[k, 0, 1]] - c[[k, 1, 0]]).abs() < 1e-12);
            assert!(c[[k, 0, 0]] > 0.0 && c[[k, 1, 1]] > 0.0);
        }
        for row in est.y_probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_dead_component_stays_finite() {
        let f = hard_fixture();
        let resp = array![[1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [1.0, 0.0]];
        let est = estimate_parameters(
            f.x.view(),
            f.y.view(),
            f.y_hat.view(),
            resp.view(),
            1e-6,
            CovarianceType::Diag,
        );
        assert!(est.means.iter().all(|v| v.is_finite()));
        assert!(est.y_probs.iter().all(|v| v.is_finite()));
        assert_eq!(est.means[[1, 0]], 0.0);
    }

    #[test]
    fn test_deterministic() {
        let f = hard_fixture();
        assert_eq!(
            run(&f, 1e-6, CovarianceType::Full),
            run(&f, 1e-6, CovarianceType::Full)
        );
    }
}
