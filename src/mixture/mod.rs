//! Joint mixture over embeddings, true labels and predictions.
//!
//! A Gaussian mixture where every component also carries two categorical
//! distributions, one over the true class and one over the predicted class:
//!
//! ```text
//! p(x, y, ŷ) = Σₖ πₖ · N(x | μₖ, Σₖ) · Cat(y | p(y)ₖ)^w_y · Cat(ŷ | p(ŷ)ₖ)^w_ŷ
//! ```
//!
//! The weights `w_y`, `w_ŷ` trade the label terms off against the embedding
//! likelihood. At zero the model is an ordinary GMM; large values make the
//! components follow the confusion matrix.
//!
//! ## EM
//!
//! **E-step**: for each sample and component,
//!
//! ```text
//! log ρᵢₖ = log N(xᵢ | k) + log πₖ + w_y·log(yᵢ·p(y)ₖ + ε) + w_ŷ·log(ŷᵢ·p(ŷ)ₖ + ε)
//! log rᵢₖ = log ρᵢₖ - logsumexp_k(log ρᵢₖ)
//! ```
//!
//! The lower bound is the mean of the `logsumexp` terms.
//!
//! **M-step**: closed-form weighted averages, see [`estimate`].
//!
//! Iteration stops when the lower bound moves by less than `tol`, or after
//! `max_iter` rounds. Several restarts can be run; the highest lower bound
//! wins.
//!
//! ## Covariance structures
//!
//! | Type | Parameters per component | Shared |
//! |------|--------------------------|--------|
//! | `Full` | d(d+1)/2 | no |
//! | `Diag` | d | no |
//! | `Spherical` | 1 | no |
//! | `Tied` | d(d+1)/2 | yes |

mod config;
mod covariance;
pub mod estimate;
mod init;
mod model;
mod params;

pub use config::{CovarianceType, InitStrategy, MixtureConfig};
pub use covariance::Covariances;
pub use estimate::{estimate_parameters, Estimates};
pub use init::initial_responsibilities;
pub use model::{FitReport, JointMixture, RestartTrace};
pub use params::MixtureParams;
