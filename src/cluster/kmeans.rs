//! K-means clustering.
//!
//! Partitions data into k clusters by minimizing **within-cluster sum of squares**
//! (WCSS). Here it seeds the joint mixture: a hard k-means partition becomes the
//! initial one-hot responsibility matrix.
//!
//! # The Objective
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ ||xᵢ - μₖ||²
//! ```
//!
//! # Lloyd's Algorithm
//!
//! 1. Initialize k centroids via k-means++
//! 2. **Assign**: Each point → nearest centroid
//! 3. **Update**: Each centroid → mean of assigned points
//! 4. Repeat until centroid shift falls below `tol`
//!
//! ## K-means++ Initialization
//!
//! 1. Choose first centroid uniformly at random
//! 2. Choose next centroid with probability proportional to D(x)²
//!    (squared distance to nearest existing centroid)
//!
//! One k-means++ run per mixture restart, drawing from that restart's RNG.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// K-means clustering algorithm.
#[derive(Debug, Clone)]
pub struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Convergence tolerance (squared centroid shift).
    tol: f64,
    /// Random seed.
    seed: Option<u64>,
}

impl Kmeans {
    /// Create a new K-means clusterer.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            tol: 1e-4,
            seed: None,
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of clusters.
    pub fn n_clusters(&self) -> usize {
        self.k
    }

    /// Fit and return one cluster label per row, seeding from `self.seed`.
    pub fn fit_predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let mut rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::seed_from_u64(rand::rng().random()),
        };
        self.fit_predict_with_rng(data, &mut rng)
    }

    /// Fit and return one cluster label per row, drawing from the caller's RNG.
    ///
    /// The mixture estimator uses this so that every restart consumes its own
    /// reproducible stream.
    pub fn fit_predict_with_rng<R: Rng>(
        &self,
        data: ArrayView2<'_, f64>,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let n = data.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if self.k == 0 || self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }

        let mut centroids = self.init_centroids(data, rng);
        let mut labels = vec![0usize; n];

        for _iter in 0..self.max_iter {
            #[cfg(feature = "parallel")]
            {
                let centroids_ref = &centroids;
                labels.par_iter_mut().enumerate().for_each(|(i, label)| {
                    *label = nearest(data.row(i), centroids_ref);
                });
            }

            #[cfg(not(feature = "parallel"))]
            for (i, label) in labels.iter_mut().enumerate() {
                *label = nearest(data.row(i), &centroids);
            }

            let new_centroids = recompute_centroids(data, &labels, self.k, rng);
            let shift = (&centroids - &new_centroids).mapv(|v| v * v).sum();

            centroids = new_centroids;

            if shift < self.tol {
                break;
            }
        }

        // Final assignment against the last centroids.
        for (i, label) in labels.iter_mut().enumerate() {
            *label = nearest(data.row(i), &centroids);
        }

        Ok(labels)
    }

    /// k-means++ seeding: the first centroid uniformly, each next one with
    /// probability proportional to its squared distance to the chosen set.
    fn init_centroids<R: Rng>(&self, data: ArrayView2<'_, f64>, rng: &mut R) -> Array2<f64> {
        let n = data.nrows();
        let mut centroids = Array2::zeros((self.k, data.ncols()));
        centroids.row_mut(0).assign(&data.row(rng.random_range(0..n)));

        let mut d2: Array1<f64> = data
            .rows()
            .into_iter()
            .map(|row| squared_distance(row, centroids.row(0)))
            .collect();

        for c in 1..self.k {
            let pick = draw_proportional(&d2, rng);
            centroids.row_mut(c).assign(&data.row(pick));
            for (dist, row) in d2.iter_mut().zip(data.rows()) {
                *dist = dist.min(squared_distance(row, centroids.row(c)));
            }
        }
        centroids
    }
}

/// Index drawn with probability `weights[i] / Σ weights`; uniform when every
/// weight is zero.
fn draw_proportional<R: Rng>(weights: &Array1<f64>, rng: &mut R) -> usize {
    let total = weights.sum();
    if total <= 0.0 {
        return rng.random_range(0..weights.len());
    }
    let target = rng.random::<f64>() * total;
    let mut acc = 0.0;
    weights
        .iter()
        .position(|&w| {
            acc += w;
            acc >= target
        })
        .unwrap_or(weights.len() - 1)
}

/// Mean of each cluster's members. A cluster left empty is re-seeded on a
/// random row.
fn recompute_centroids<R: Rng>(
    data: ArrayView2<'_, f64>,
    labels: &[usize],
    k: usize,
    rng: &mut R,
) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];
    for (row, &label) in data.rows().into_iter().zip(labels) {
        let mut acc = sums.row_mut(label);
        acc += &row;
        counts[label] += 1;
    }
    for (c, &count) in counts.iter().enumerate() {
        if count == 0 {
            let idx = rng.random_range(0..data.nrows());
            sums.row_mut(c).assign(&data.row(idx));
        } else {
            sums.row_mut(c).mapv_inplace(|v| v / count as f64);
        }
    }
    sums
}

/// Index of the closest centroid; ties go to the lower index.
fn nearest(point: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> usize {
    centroids
        .rows()
        .into_iter()
        .map(|c| squared_distance(point, c))
        .enumerate()
        .fold((0, f64::INFINITY), |best, (c, d)| if d < best.1 { (c, d) } else { best })
        .0
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let diff = &a - &b;
    diff.dot(&diff)
}
