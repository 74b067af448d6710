//! Label and prediction preprocessing.
//!
//! Both side channels of the mixture (true labels and model predictions) are
//! modelled as rows of a class-probability matrix. Callers rarely hold them in
//! that form: labels usually arrive as integer classes and binary classifiers
//! usually report only `P(y = 1)`. [`Targets`] names the accepted encodings
//! and [`binarize`] turns any of them into an `n_samples × n_classes` matrix
//! whose rows sum to 1.
//!
//! ```text
//! Classes([2, 0])        →  [[0, 0, 1],
//!                            [1, 0, 0]]
//! Classes([1, 0])        →  [[0, 1], [1, 0]]        (binary: always 2 columns)
//! Positive([0.9, 0.2])   →  [[0.1, 0.9], [0.8, 0.2]]
//! ```

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// One label channel, in any of the accepted encodings.
#[derive(Debug, Clone, Copy)]
pub enum Targets<'a> {
    /// Hard integer class labels.
    Classes(&'a [usize]),
    /// Probability of the positive class for a binary problem.
    Positive(ArrayView1<'a, f64>),
    /// Full class-probability rows (`n_samples × n_classes`).
    Probabilities(ArrayView2<'a, f64>),
}

impl Targets<'_> {
    /// Number of samples described.
    pub fn len(&self) -> usize {
        match self {
            Targets::Classes(c) => c.len(),
            Targets::Positive(p) => p.len(),
            Targets::Probabilities(p) => p.nrows(),
        }
    }

    /// True when no samples are described.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a [usize]> for Targets<'a> {
    fn from(classes: &'a [usize]) -> Self {
        Targets::Classes(classes)
    }
}

impl<'a> From<&'a Vec<usize>> for Targets<'a> {
    fn from(classes: &'a Vec<usize>) -> Self {
        Targets::Classes(classes.as_slice())
    }
}

impl<'a> From<ArrayView1<'a, f64>> for Targets<'a> {
    fn from(p: ArrayView1<'a, f64>) -> Self {
        Targets::Positive(p)
    }
}

impl<'a> From<&'a Array1<f64>> for Targets<'a> {
    fn from(p: &'a Array1<f64>) -> Self {
        Targets::Positive(p.view())
    }
}

impl<'a> From<ArrayView2<'a, f64>> for Targets<'a> {
    fn from(p: ArrayView2<'a, f64>) -> Self {
        Targets::Probabilities(p)
    }
}

impl<'a> From<&'a Array2<f64>> for Targets<'a> {
    fn from(p: &'a Array2<f64>) -> Self {
        Targets::Probabilities(p.view())
    }
}

/// Convert a label channel into a row-stochastic class matrix.
///
/// `n_classes` pins the output width. Fitted models pass their table width so
/// inference-time labels line up with the fitted categorical distributions;
/// `None` infers it (`max(label) + 1`, never fewer than two columns).
///
/// # Errors
///
/// - [`Error::EmptyInput`] for zero samples.
/// - [`Error::InvalidLabels`] for a class index outside `0..n_classes`, a
///   probability outside `[0, 1]`, a negative entry, or a row summing to zero.
/// - [`Error::NonFinite`] for NaN or infinite probabilities.
/// - [`Error::DimensionMismatch`] when the width disagrees with `n_classes`.
pub fn binarize(targets: Targets<'_>, n_classes: Option<usize>) -> Result<Array2<f64>> {
    if targets.is_empty() {
        return Err(Error::EmptyInput);
    }

    match targets {
        Targets::Classes(classes) => {
            let max_label = classes.iter().copied().max().unwrap_or(0);
            let width = n_classes.unwrap_or_else(|| (max_label + 1).max(2));
            if max_label >= width {
                return Err(Error::InvalidLabels {
                    message: format!("class {max_label} is outside 0..{width}"),
                });
            }
            let mut out = Array2::zeros((classes.len(), width));
            for (i, &c) in classes.iter().enumerate() {
                out[[i, c]] = 1.0;
            }
            Ok(out)
        }
        Targets::Positive(p) => positive_to_two_columns(p, n_classes),
        Targets::Probabilities(p) if p.ncols() == 1 => {
            positive_to_two_columns(p.column(0), n_classes)
        }
        Targets::Probabilities(p) => {
            if let Some(expected) = n_classes {
                if p.ncols() != expected {
                    return Err(Error::DimensionMismatch {
                        expected,
                        found: p.ncols(),
                    });
                }
            }
            if p.iter().any(|v| !v.is_finite()) {
                return Err(Error::NonFinite {
                    name: "class probabilities",
                });
            }
            let mut out = p.to_owned();
            for (i, mut row) in out.rows_mut().into_iter().enumerate() {
                if row.iter().any(|&v| v < 0.0) {
                    return Err(Error::InvalidLabels {
                        message: format!("row {i} has a negative probability"),
                    });
                }
                let total = row.sum();
                if total <= 0.0 {
                    return Err(Error::InvalidLabels {
                        message: format!("row {i} sums to zero"),
                    });
                }
                row /= total;
            }
            Ok(out)
        }
    }
}

fn positive_to_two_columns(p: ArrayView1<'_, f64>, n_classes: Option<usize>) -> Result<Array2<f64>> {
    if let Some(expected) = n_classes {
        if expected != 2 {
            return Err(Error::DimensionMismatch { expected, found: 2 });
        }
    }
    let mut out = Array2::zeros((p.len(), 2));
    for (i, &v) in p.iter().enumerate() {
        if !v.is_finite() {
            return Err(Error::NonFinite {
                name: "positive-class probabilities",
            });
        }
        if !(0.0..=1.0).contains(&v) {
            return Err(Error::InvalidLabels {
                message: format!("probability {v} at row {i} is outside [0, 1]"),
            });
        }
        out[[i, 0]] = 1.0 - v;
        out[[i, 1]] = v;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_binary_classes_expand_to_two_columns() {
        let y = binarize(Targets::Classes(&[1, 0, 1]), None).unwrap();
        assert_eq!(y, array![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_all_zero_labels_still_two_columns() {
        let y = binarize(Targets::Classes(&[0, 0]), None).unwrap();
        assert_eq!(y.ncols(), 2);
        assert_eq!(y.column(0).sum(), 2.0);
    }

    #[test]
    fn test_multiclass_width_from_max_label() {
        let y = binarize(Targets::Classes(&[2, 0]), None).unwrap();
        assert_eq!(y, array![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_pinned_width_pads_and_rejects() {
        let y = binarize(Targets::Classes(&[0, 1]), Some(3)).unwrap();
        assert_eq!(y.ncols(), 3);

        let err = binarize(Targets::Classes(&[0, 3]), Some(3)).unwrap_err();
        assert!(matches!(err, Error::InvalidLabels { .. }));
    }

    #[test]
    fn test_positive_vector_is_complemented() {
        let p = Array1::from(vec![0.9, 0.25]);
        let y = binarize((&p).into(), None).unwrap();
        assert!((y[[0, 0]] - 0.1).abs() < 1e-12);
        assert_eq!(y[[1, 1]], 0.25);
    }

    #[test]
    fn test_single_column_matrix_treated_as_positive() {
        let p = array![[0.3], [1.0]];
        let y = binarize((&p).into(), None).unwrap();
        assert_eq!(y, array![[0.7, 0.3], [0.0, 1.0]]);
    }

    #[test]
    fn test_probability_rows_renormalized() {
        let p = array![[2.0, 2.0], [0.0, 5.0]];
        let y = binarize((&p).into(), None).unwrap();
        for row in y.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert_eq!(y[[0, 0]], 0.5);
    }

    #[test]
    fn test_rejects_bad_probabilities() {
        let p = Array1::from(vec![0.5, 1.5]);
        assert!(binarize((&p).into(), None).is_err());

        let p = array![[0.0, 0.0], [0.5, 0.5]];
        assert!(binarize((&p).into(), None).is_err());

        let p = array![[f64::NAN, 1.0]];
        assert_eq!(
            binarize((&p).into(), None).unwrap_err(),
            Error::NonFinite {
                name: "class probabilities"
            }
        );

        let p = array![[0.2, 0.3, 0.5]];
        assert!(matches!(
            binarize((&p).into(), Some(2)).unwrap_err(),
            Error::DimensionMismatch {
                expected: 2,
                found: 3
            }
        ));
    }

    #[test]
    fn test_empty_is_error() {
        assert_eq!(
            binarize(Targets::Classes(&[]), None).unwrap_err(),
            Error::EmptyInput
        );
    }
}
