use std::path::PathBuf;

use thiserror::Error;

/// A single corpus record that cannot become a document. Recoverable: the
/// record is skipped and ingestion continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

/// A whole corpus file that cannot be scanned. Recoverable at build level:
/// the file is skipped.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read {path}: {source}")]
    Unreadable { path: PathBuf, source: std::io::Error },

    #[error("invalid JSON in {path}: {source}")]
    InvalidJson { path: PathBuf, source: serde_json::Error },

    #[error("{path} has no recognised Q&A container (expected one of: {expected})")]
    MissingContainer { path: PathBuf, expected: String },

    #[error("invalid corpus pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[derive(Debug, Error)]
pub enum EmbedError {
    /// The model could not be initialised. Fatal to ingestion.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("embedding inference failed: {0}")]
    Inference(String),

    #[error("provider returned {got} vectors for {expected} inputs")]
    BatchShape { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("dimension mismatch: index holds {expected}-d vectors, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("document '{0}' has a zero-length embedding")]
    EmptyVector(String),

    #[error("document '{0}' is already present in the index")]
    DuplicateDocument(String),

    #[error("index snapshot at {path} is corrupt: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("no index snapshot at {0}")]
    IndexNotFound(PathBuf),

    #[error("index was built with model '{index}' but the provider is '{provider}'")]
    ModelMismatch { index: String, provider: String },

    #[error("deadline exceeded during similarity scan")]
    DeadlineExceeded,

    #[error("index I/O at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

impl IndexError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexCorrupt { path: path.into(), reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    /// Nothing survived normalization. Nothing is persisted.
    #[error("no documents survived ingestion across {files} corpus file(s)")]
    EmptyCorpus { files: usize },

    #[error(transparent)]
    Provider(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),
}
