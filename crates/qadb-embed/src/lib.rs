//! qadb-embed
//!
//! Embedding provider backends behind [`qadb_core::Embedder`]: the local
//! sentence transformer ([`SentenceEmbedder`]) and the deterministic
//! [`HashEmbedder`]. [`shared_embedder`] initialises a provider at most once
//! per process and hands out the cached instance afterwards.
pub mod device;
pub mod hashing;
pub mod model;
pub mod pool;
pub mod tokenize;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::info;

use qadb_core::config::{expand_path, EmbeddingBackend, EmbeddingSettings};
use qadb_core::{Embedder, EmbedError};

pub use hashing::HashEmbedder;
pub use model::SentenceEmbedder;
pub use pool::masked_mean_l2;

/// True when `APP_USE_FAKE_EMBEDDINGS` asks for the hashing backend.
pub fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

fn effective_backend(settings: &EmbeddingSettings) -> EmbeddingBackend {
    if fake_embeddings_requested() { EmbeddingBackend::Hash } else { settings.backend }
}

/// Construct a fresh provider. Failure to initialise is
/// [`EmbedError::ProviderUnavailable`].
pub fn load_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, EmbedError> {
    match effective_backend(settings) {
        EmbeddingBackend::Hash => {
            info!(dim = settings.hash_dim, "using hashing embedder");
            Ok(Arc::new(HashEmbedder::new(settings.hash_dim)))
        }
        EmbeddingBackend::Local => {
            let configured: Option<PathBuf> = settings.model_dir.as_deref().map(expand_path);
            let dir = model::resolve_model_dir(configured.as_deref(), &settings.model_id)
                .map_err(|e| EmbedError::ProviderUnavailable(e.to_string()))?;
            let embedder = SentenceEmbedder::load(&dir, &settings.model_id, settings.max_len, settings.batch_size)
                .map_err(|e| EmbedError::ProviderUnavailable(format!("{}: {e}", dir.display())))?;
            Ok(Arc::new(embedder))
        }
    }
}

fn cache_key(settings: &EmbeddingSettings) -> String {
    match effective_backend(settings) {
        EmbeddingBackend::Hash => format!("hash:{}", settings.hash_dim),
        EmbeddingBackend::Local => format!("local:{}:{}:{:?}", settings.model_id, settings.max_len, settings.model_dir),
    }
}

static PROVIDERS: OnceLock<Mutex<HashMap<String, Arc<dyn Embedder>>>> = OnceLock::new();

/// Process-wide provider for `settings`. The first call initialises it; later
/// calls with equivalent settings return the same instance. A failed
/// initialisation is not cached, so a later call may retry.
pub fn shared_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, EmbedError> {
    let key = cache_key(settings);
    let providers = PROVIDERS.get_or_init(|| Mutex::new(HashMap::new()));
    // Held across initialisation so concurrent first callers load once.
    let mut guard = providers.lock().map_err(|_| EmbedError::ProviderUnavailable("provider cache poisoned".into()))?;
    if let Some(existing) = guard.get(&key) { return Ok(Arc::clone(existing)); }
    let embedder = load_embedder(settings)?;
    guard.insert(key, Arc::clone(&embedder));
    Ok(embedder)
}
