//! Embedding reuse across rebuilds, keyed by `(content_hash, model_id)`.
//!
//! The previous snapshot is consulted before the provider is called; a
//! document whose exact content was embedded by the same model is not
//! embedded again.
use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use qadb_core::{Embedding, IndexError};

use crate::index::VectorIndex;

/// Hex blake3 of a document's content.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Default)]
pub struct EmbeddingCache {
    model_id: String,
    dim: usize,
    entries: HashMap<String, Embedding>,
}

impl EmbeddingCache {
    pub fn from_index(index: &VectorIndex) -> Self {
        let entries = index.iter().map(|(doc, v)| (content_hash(&doc.content), v.to_vec())).collect();
        Self { model_id: index.model_id().to_string(), dim: index.dim().unwrap_or(0), entries }
    }

    /// Cache from the snapshot at `path` if it was built by `model_id` with
    /// `dim`-wide vectors. A missing snapshot gives an empty cache; an
    /// unreadable or incompatible one is logged and ignored.
    pub fn load_compatible(path: &Path, model_id: &str, dim: usize) -> Result<Self, IndexError> {
        let index = match VectorIndex::load(path) {
            Ok(index) => index,
            Err(IndexError::IndexNotFound(_)) => return Ok(Self::default()),
            Err(e @ IndexError::IndexCorrupt { .. }) => {
                warn!(path = %path.display(), error = %e, "previous snapshot unusable, embedding from scratch");
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };
        if index.model_id() != model_id || index.dim() != Some(dim) {
            info!(
                path = %path.display(),
                snapshot_model = index.model_id(),
                model = model_id,
                "previous snapshot built by a different model, not reusing"
            );
            return Ok(Self::default());
        }
        let cache = Self::from_index(&index);
        info!(path = %path.display(), entries = cache.len(), "embedding cache ready");
        Ok(cache)
    }

    pub fn get(&self, hash: &str) -> Option<&Embedding> { self.entries.get(hash) }

    pub fn model_id(&self) -> &str { &self.model_id }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
