//! Shared building blocks for the Q&A retrieval engine: domain types, the
//! error taxonomy, the embedder seam, configuration, record normalization and
//! corpus scanning.
#![deny(unused_imports)]

pub mod collaborators;
pub mod config;
pub mod corpus;
pub mod deadline;
pub mod error;
pub mod normalize;
pub mod traits;
pub mod types;

pub use deadline::Deadline;
pub use error::{BuildError, CorpusError, EmbedError, IndexError, RecordError};
pub use traits::Embedder;
pub use types::{Attributes, Document, Embedding, QueryResult, SearchHit};
