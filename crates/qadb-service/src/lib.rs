//! qadb-service
//!
//! The online half of the engine: a [`RetrievalService`] that owns the loaded
//! index, swaps it atomically on reload and answers questions concurrently.
pub mod compose;
pub mod error;
pub mod service;

pub use compose::{AnswerComposer, ComposedAnswer, ExtractiveComposer};
pub use error::ServiceError;
pub use service::{RetrievalService, ServiceStatus, StatusReport};
