use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use sliver::{ErrorSlicer, SliceDiscovery, Targets};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Synthetic audit: three groups of 150 "images" in a 32-d embedding space.
    // The classifier is fine on groups 0 and 1 but misses most positives in group 2.
    //
    // Run with `RUST_LOG=sliver=debug` to watch the EM iterations.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let mut rng = StdRng::seed_from_u64(2024);
    let noise = Normal::new(0.0, 1.0)?;
    let n_per = 150;
    let dim = 32;

    let mut embeddings = Array2::zeros((3 * n_per, dim));
    let mut labels = Vec::with_capacity(3 * n_per);
    let mut probs = Array1::zeros(3 * n_per);
    for group in 0..3 {
        for i in 0..n_per {
            let row = group * n_per + i;
            for j in 0..dim {
                let center = if j % 3 == group { 4.0 } else { 0.0 };
                embeddings[[row, j]] = center + noise.sample(&mut rng);
            }
            let label = usize::from(rng.random::<f64>() < 0.5);
            let right = match group {
                2 => label == 0 || rng.random::<f64>() < 0.2,
                _ => rng.random::<f64>() < 0.9,
            };
            let confidence = 0.6 + 0.35 * rng.random::<f64>();
            probs[row] = if (label == 1) == right { confidence } else { 1.0 - confidence };
            labels.push(label);
        }
    }

    let mut slicer = ErrorSlicer::new()
        .with_pca_components(Some(8))
        .with_n_components(8)
        .with_n_slices(2)
        .with_seed(7);
    slicer.fit(embeddings.view(), Targets::from(&labels), Targets::from(&probs))?;

    let disparity = slicer.disparity()?;
    let membership = slicer.transform(embeddings.view(), None, None)?;
    for (j, &k) in slicer.slice_indices()?.iter().enumerate() {
        let mut per_group = [0.0f64; 3];
        for (row, &p) in membership.column(j).iter().enumerate() {
            per_group[row / n_per] += p;
        }
        println!(
            "slice {j}: component {k}, disparity {:.3}, expected members per group {:?}",
            disparity[k],
            per_group.map(|m| m.round() as i64)
        );
    }

    let report = slicer.mixture()?.report()?;
    println!(
        "converged: {} after {} iterations (lower bound {:.3})",
        report.converged, report.n_iter, report.lower_bound
    );
    Ok(())
}
