use thiserror::Error;

use qadb_core::{EmbedError, IndexError};

use crate::service::ServiceStatus;

/// Everything a caller of the retrieval service can observe going wrong.
/// "No relevant results" is not an error: it is an empty `QueryResult`.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No usable index is loaded. Retry later.
    #[error("retrieval service unavailable ({status}): {reason}")]
    ServiceUnavailable { status: ServiceStatus, reason: String },

    #[error("query deadline exceeded")]
    Timeout,

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    /// A background load or query task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}
