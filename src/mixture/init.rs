//! Initial responsibilities for one EM restart.
//!
//! The error strategy seeds one component per (true class, predicted class)
//! pair, so that with `K = C²` components each starts out as one cell of the
//! confusion matrix:
//!
//! ```text
//! C = 2, row i:  y = [0, 1], ŷ = [0.8, 0.2]
//!
//!   y ⊗ ŷ = [[0.0, 0.0],      flattened a·C + b:   [0.0, 0.0, 0.8, 0.2]
//!            [0.8, 0.2]]
//! ```
//!
//! With more components the flattened block is tiled and truncated to `K`
//! columns. Uniform jitter is then mixed in so repeated columns can diverge.

use super::config::InitStrategy;
use crate::cluster::Kmeans;
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView2, Axis};
use rand::prelude::*;

/// Minimum component count the error strategy supports for `n_classes`.
pub fn error_init_required(n_classes: usize) -> usize {
    n_classes * n_classes
}

/// Build an `n_samples × n_components` responsibility matrix.
///
/// # Errors
///
/// - [`Error::TooFewComponents`] for the error strategy when
///   `n_components < n_classes²`.
/// - Anything [`Kmeans`] reports for the k-means strategy.
pub fn initial_responsibilities<R: Rng>(
    strategy: InitStrategy,
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    y_hat: ArrayView2<'_, f64>,
    n_components: usize,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let n_samples = x.nrows();
    match strategy {
        InitStrategy::Kmeans => {
            let labels = Kmeans::new(n_components).fit_predict_with_rng(x, rng)?;
            let mut resp = Array2::zeros((n_samples, n_components));
            for (i, &k) in labels.iter().enumerate() {
                resp[[i, k]] = 1.0;
            }
            Ok(resp)
        }
        InitStrategy::Random => {
            let mut resp = Array2::from_shape_fn((n_samples, n_components), |_| rng.random::<f64>());
            normalize_rows(&mut resp);
            Ok(resp)
        }
        InitStrategy::Error => {
            let n_classes = y.ncols();
            let pairs = error_init_required(n_classes);
            if n_components < pairs {
                return Err(Error::TooFewComponents {
                    n_components,
                    required: pairs,
                });
            }

            let mut resp = Array2::from_shape_fn((n_samples, n_components), |(i, col)| {
                let cell = col % pairs;
                y[[i, cell / n_classes]] * y_hat[[i, cell % n_classes]]
            });
            normalize_rows(&mut resp);

            resp.mapv_inplace(|v| v + rng.random::<f64>());
            normalize_rows(&mut resp);
            Ok(resp)
        }
    }
}

/// Divide each row by its sum; an all-zero row becomes uniform.
fn normalize_rows(resp: &mut Array2<f64>) {
    let width = resp.ncols() as f64;
    for mut row in resp.axis_iter_mut(Axis(0)) {
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        } else {
            row.fill(1.0 / width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn fixture() -> (Array2<f64>, Array2<f64>, Array2<f64>) {
        let x = array![[0.0, 0.0], [0.2, 0.1], [8.0, 8.0], [8.1, 7.9], [4.0, 0.0], [4.2, 0.3]];
        let y = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let y_hat = array![[1.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 1.0], [0.7, 0.3], [0.4, 0.6]];
        (x, y, y_hat)
    }

    fn assert_rows_stochastic(resp: &Array2<f64>) {
        for row in resp.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
            assert!(row.iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn test_every_strategy_is_row_stochastic() {
        let (x, y, y_hat) = fixture();
        for strategy in [InitStrategy::Kmeans, InitStrategy::Random, InitStrategy::Error] {
            let mut rng = StdRng::seed_from_u64(3);
            let resp =
                initial_responsibilities(strategy, x.view(), y.view(), y_hat.view(), 4, &mut rng)
                    .unwrap();
            assert_eq!(resp.dim(), (6, 4));
            assert_rows_stochastic(&resp);
        }
    }

    #[test]
    fn test_kmeans_is_one_hot() {
        let (x, y, y_hat) = fixture();
        let mut rng = StdRng::seed_from_u64(0);
        let resp =
            initial_responsibilities(InitStrategy::Kmeans, x.view(), y.view(), y_hat.view(), 3, &mut rng)
                .unwrap();
        for row in resp.rows() {
            assert_eq!(row.iter().filter(|&&v| v == 1.0).count(), 1);
        }
    }

    #[test]
    fn test_error_init_needs_square_of_classes() {
        let (x, y, y_hat) = fixture();
        let mut rng = StdRng::seed_from_u64(0);
        let err =
            initial_responsibilities(InitStrategy::Error, x.view(), y.view(), y_hat.view(), 3, &mut rng)
                .unwrap_err();
        assert_eq!(
            err,
            Error::TooFewComponents {
                n_components: 3,
                required: 4
            }
        );
    }

    #[test]
    fn test_error_init_favours_confusion_cell() {
        // Every row is a false negative: y = 1, ŷ = 0  →  cell 1·2 + 0 = 2.
        let n = 200;
        let x = Array2::<f64>::zeros((n, 1));
        let y = Array2::from_shape_fn((n, 2), |(_, c)| c as f64);
        let y_hat = Array2::from_shape_fn((n, 2), |(_, c)| 1.0 - c as f64);
        let mut rng = StdRng::seed_from_u64(11);
        let resp =
            initial_responsibilities(InitStrategy::Error, x.view(), y.view(), y_hat.view(), 6, &mut rng)
                .unwrap();

        let means = resp.mean_axis(Axis(0)).unwrap();
        for (k, &m) in means.iter().enumerate() {
            if k != 2 {
                assert!(means[2] > 2.0 * m, "column {k}: {m} vs {}", means[2]);
            }
        }
    }

    #[test]
    fn test_same_rng_same_init() {
        let (x, y, y_hat) = fixture();
        let a = initial_responsibilities(
            InitStrategy::Random,
            x.view(),
            y.view(),
            y_hat.view(),
            4,
            &mut StdRng::seed_from_u64(9),
        )
        .unwrap();
        let b = initial_responsibilities(
            InitStrategy::Random,
            x.view(),
            y.view(),
            y_hat.view(),
            4,
            &mut StdRng::seed_from_u64(9),
        )
        .unwrap();
        assert_eq!(a, b);
    }
}
