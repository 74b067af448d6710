//! Slice discovery traits.

use crate::error::Result;
use crate::labels::Targets;
use ndarray::{Array2, ArrayView2};

/// A method that finds subpopulations where a model underperforms.
pub trait SliceDiscovery {
    /// Learn slices from embeddings, true labels and model predictions.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: Targets<'_>, y_hat: Targets<'_>) -> Result<()>;

    /// Soft slice membership, `(n_samples, n_slices)`.
    ///
    /// Column `j` is the probability of belonging to the `j`-th ranked slice.
    /// Label channels are optional at this stage.
    fn transform(
        &self,
        x: ArrayView2<'_, f64>,
        y: Option<Targets<'_>>,
        y_hat: Option<Targets<'_>>,
    ) -> Result<Array2<f64>>;

    /// Number of slices produced.
    fn n_slices(&self) -> usize;
}
