//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_RETRIEVAL__TOP_K=5`). Provides
//! helpers to expand `~` and `${VAR}` and to resolve relative paths against a
//! known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Load from the current working directory.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load `config.toml` and the environment overlay from `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir: dir.to_path_buf() };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Directory the configuration was loaded from. Relative paths in the
    /// settings resolve against it.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The full typed settings tree, with path values resolved against
    /// [`base_dir`](Self::base_dir).
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
        Ok(settings.resolved_against(&self.base_dir))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        if settings.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be at least 1");
        }
        if settings.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
}

impl Settings {
    /// Expand and anchor `data.corpus_dir`, `data.index_path` and
    /// `embedding.model_dir` at `base`. Absolute paths are left alone.
    pub fn resolved_against(mut self, base: &Path) -> Self {
        let resolve = |p: &str| resolve_with_base(base, p).to_string_lossy().into_owned();
        self.data.corpus_dir = resolve(&self.data.corpus_dir);
        self.data.index_path = resolve(&self.data.index_path);
        self.embedding.model_dir = self.embedding.model_dir.as_deref().map(resolve);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub corpus_dir: String,
    pub corpus_pattern: String,
    pub containers: Vec<String>,
    pub index_path: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            corpus_dir: ".".to_string(),
            corpus_pattern: crate::corpus::DEFAULT_PATTERN.to_string(),
            containers: vec![crate::corpus::DEFAULT_CONTAINER.to_string()],
            index_path: "index/qa.qadb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Sentence-transformer weights loaded from `model_dir`.
    Local,
    /// Deterministic token hashing; no model files needed.
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model_dir: Option<String>,
    pub model_id: String,
    pub max_len: usize,
    pub batch_size: usize,
    pub hash_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Local,
            model_dir: None,
            model_id: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            max_len: 256,
            batch_size: 32,
            hash_dim: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub query_timeout_ms: Option<u64>,
    pub retry_interval_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3, query_timeout_ms: None, retry_interval_secs: 30 }
    }
}

impl RetrievalSettings {
    pub fn query_timeout(&self) -> Option<Duration> { self.query_timeout_ms.map(Duration::from_millis) }

    pub fn retry_interval(&self) -> Duration { Duration::from_secs(self.retry_interval_secs) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
