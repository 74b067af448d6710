//! Hard clustering used to seed the mixture.
//!
//! [`Kmeans`] partitions the embeddings once per restart; the partition is
//! turned into one-hot responsibilities by
//! [`initial_responsibilities`](crate::mixture::initial_responsibilities).

mod kmeans;

pub use kmeans::Kmeans;
