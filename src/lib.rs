//! # sliver
//!
//! Error-slice discovery: find the regions of embedding space where a
//! classifier is wrong, by fitting a mixture that models embeddings, true
//! labels and predictions jointly.
//!
//! The core is [`JointMixture`], an EM estimator whose components each hold
//! a Gaussian over embeddings and two categorical distributions over classes.
//! [`ErrorSlicer`] wraps it with PCA and ranks components by how far their
//! label and prediction distributions disagree.
//!
//! ```rust
//! use ndarray::array;
//! use sliver::{CovarianceType, JointMixture, MixtureConfig, Targets};
//!
//! let x = array![[0.0, 0.1], [0.2, 0.0], [5.0, 5.1], [5.2, 4.9]];
//! let y = vec![0, 0, 1, 1];
//! let y_hat = vec![0, 0, 0, 0];
//!
//! let mut model = JointMixture::new(
//!     MixtureConfig::new(2)
//!         .with_covariance_type(CovarianceType::Spherical)
//!         .with_reg_covar(1e-3)
//!         .with_seed(1),
//! );
//! model.fit(x.view(), &y, &y_hat).unwrap();
//! let resp = model.predict_proba(x.view(), Some(Targets::from(&y)), None).unwrap();
//! assert_eq!(resp.dim(), (4, 2));
//! ```

pub mod cluster;
/// Error types used across `sliver`.
pub mod error;
pub mod labels;
pub mod mixture;
pub mod slice;


pub use error::{Error, Result};
pub use labels::{binarize, Targets};
pub use mixture::{
    CovarianceType, Covariances, FitReport, InitStrategy, JointMixture, MixtureConfig,
    MixtureParams, RestartTrace,
};
pub use slice::{disparity_scores, rank_slices, ErrorSlicer, Pca, SliceDiscovery};
