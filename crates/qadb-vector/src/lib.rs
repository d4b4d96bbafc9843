//! qadb-vector
//!
//! The exact vector index, its Arrow IPC snapshot format and the offline
//! index builder.
pub mod cache;
pub mod index;
pub mod index_build;
pub mod metric;
pub mod schema;
pub mod snapshot;

pub use cache::{content_hash, EmbeddingCache};
pub use index::VectorIndex;
pub use index_build::{BuildOptions, BuildReport, BuildWarning, IndexBuilder};
pub use metric::Metric;
pub use schema::SnapshotMeta;
pub use snapshot::inspect;
