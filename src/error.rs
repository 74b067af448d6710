use core::fmt;

/// Result alias for `sliver`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the mixture estimator and the slice orchestrator.
///
/// Non-convergence is not an error; it is reported through
/// [`FitReport`](crate::mixture::FitReport).
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// Too few samples to fit the requested model.
    TooFewSamples {
        /// Samples provided.
        n_samples: usize,
        /// Minimum required.
        required: usize,
    },

    /// Matrix dimension mismatch (usize).
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Shape mismatch (string description).
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// An input array contained NaN or infinity.
    NonFinite {
        /// Which input.
        name: &'static str,
    },

    /// Labels or probabilities that cannot be turned into a class distribution.
    InvalidLabels {
        /// What was wrong.
        message: String,
    },

    /// Cholesky factorization failed, or a variance was not positive.
    InversionFailed,

    /// Invalid number of clusters requested.
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Error-driven initialization needs at least `n_classes²` components.
    TooFewComponents {
        /// Configured component count.
        n_components: usize,
        /// Minimum for the observed class count.
        required: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// A string tag did not name a known variant.
    UnknownVariant {
        /// Option being parsed.
        name: &'static str,
        /// Rejected value.
        value: String,
    },

    /// Inference was requested before `fit`.
    NotFitted,

    /// Generic error with message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::TooFewSamples {
                n_samples,
                required,
            } => {
                write!(f, "expected at least {required} samples, got {n_samples}")
            }
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::ShapeMismatch { expected, actual } => {
                write!(f, "shape mismatch: expected {expected}, actual {actual}")
            }
            Error::NonFinite { name } => write!(f, "{name} contains NaN or infinite values"),
            Error::InvalidLabels { message } => write!(f, "invalid labels: {message}"),
            Error::InversionFailed => write!(
                f,
                "covariance factorization failed; the data may be degenerate, \
                 try increasing reg_covar"
            ),
            Error::InvalidClusterCount { requested, n_items } => {
                write!(f, "cannot create {requested} clusters from {n_items} items")
            }
            Error::TooFewComponents {
                n_components,
                required,
            } => write!(
                f,
                "error-driven initialization needs n_components >= n_classes^2 \
                 ({required}), got {n_components}"
            ),
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::UnknownVariant { name, value } => {
                write!(f, "unknown {name} '{value}'")
            }
            Error::NotFitted => write!(f, "model is not fitted; call fit first"),
            Error::Other(msg) => write!(f, "{msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
