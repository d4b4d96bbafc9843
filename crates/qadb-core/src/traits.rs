use crate::error::EmbedError;
use crate::types::Embedding;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must be deterministic for a given `model_id`, and
/// `embed_many` must agree value-for-value with calling `embed` on each input
/// in turn. Batching only changes throughput.
pub trait Embedder: Send + Sync {
    /// Stable identity of the model (e.g. `sentence-transformers/all-MiniLM-L6-v2`).
    /// Vectors from different identities are never compared.
    fn model_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// Maximum token length for this provider.
    fn max_len(&self) -> usize;
    /// Compute embeddings for a batch of texts, in input order.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedError>;

    fn embed(&self, text: &str) -> Result<Embedding, EmbedError> {
        let mut out = self.embed_many(&[text.to_string()])?;
        match out.len() {
            1 => Ok(out.remove(0)),
            got => Err(EmbedError::BatchShape { expected: 1, got }),
        }
    }
}

impl<T: Embedder + ?Sized> Embedder for std::sync::Arc<T> {
    fn model_id(&self) -> &str { (**self).model_id() }
    fn dim(&self) -> usize { (**self).dim() }
    fn max_len(&self) -> usize { (**self).max_len() }
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedError> { (**self).embed_many(texts) }
    fn embed(&self, text: &str) -> Result<Embedding, EmbedError> { (**self).embed(text) }
}
