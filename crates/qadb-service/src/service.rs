//! The long-lived retrieval service.
//!
//! State is one immutable [`ServiceState`] behind an [`ArcSwap`]. Queries
//! take a snapshot of it and never lock. Loads run one at a time (the load
//! gate), build the new index fully off to the side and publish it with a
//! single store, so an in-flight query only ever sees a complete index.
//!
//! Lifecycle: `Unloaded → Loading → Ready → (reload) → Loading → Ready`, with
//! `Loading → Failed` when a load fails and no earlier index exists. A failed
//! reload keeps serving the previous index and records the error.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use qadb_core::config::{expand_path, Settings};
use qadb_core::{Deadline, Embedder, IndexError, QueryResult};
use qadb_vector::VectorIndex;

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceStatus::Unloaded => "unloaded",
            ServiceStatus::Loading => "loading",
            ServiceStatus::Ready => "ready",
            ServiceStatus::Failed => "failed",
        })
    }
}

#[derive(Debug)]
struct ServiceState {
    status: ServiceStatus,
    index: Option<Arc<VectorIndex>>,
    /// Bumped on every successful publish of a new index.
    generation: u64,
    last_error: Option<String>,
    /// Modification time of the snapshot the current index came from.
    loaded_mtime: Option<SystemTime>,
}

impl ServiceState {
    fn unloaded() -> Self {
        Self { status: ServiceStatus::Unloaded, index: None, generation: 0, last_error: None, loaded_mtime: None }
    }
}

/// Point-in-time view of the service for health endpoints and operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub status: ServiceStatus,
    pub generation: u64,
    pub documents: usize,
    pub last_error: Option<String>,
    pub index_path: PathBuf,
    pub model_id: String,
}

pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    index_path: PathBuf,
    top_k: usize,
    query_timeout: Option<Duration>,
    state: ArcSwap<ServiceState>,
    load_gate: Mutex<()>,
}

impl RetrievalService {
    pub const DEFAULT_TOP_K: usize = 3;

    /// A service in `Unloaded`. Nothing is read until [`start`](Self::start).
    pub fn new(embedder: Arc<dyn Embedder>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            index_path: index_path.into(),
            top_k: Self::DEFAULT_TOP_K,
            query_timeout: None,
            state: ArcSwap::from_pointee(ServiceState::unloaded()),
            load_gate: Mutex::new(()),
        }
    }

    /// Wire a service from configuration, sharing the process-wide embedder.
    pub fn from_settings(settings: &Settings) -> Result<Self, ServiceError> {
        let embedder = qadb_embed::shared_embedder(&settings.embedding)?;
        Ok(Self::new(embedder, expand_path(&settings.data.index_path))
            .with_top_k(settings.retrieval.top_k)
            .with_query_timeout(settings.retrieval.query_timeout()))
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = path.into();
        self
    }

    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn index_path(&self) -> &Path { &self.index_path }

    pub fn top_k(&self) -> usize { self.top_k }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    pub fn status(&self) -> StatusReport {
        let state = self.state.load();
        StatusReport {
            status: state.status,
            generation: state.generation,
            documents: state.index.as_ref().map_or(0, |i| i.len()),
            last_error: state.last_error.clone(),
            index_path: self.index_path.clone(),
            model_id: self.embedder.model_id().to_string(),
        }
    }

    /// The currently published index, if any.
    pub fn index(&self) -> Option<Arc<VectorIndex>> { self.state.load().index.clone() }

    /// Initial load. Equivalent to [`reload`](Self::reload); kept separate so
    /// call sites read as the lifecycle they drive.
    pub fn start(&self) -> Result<(), ServiceError> {
        self.reload()
    }

    /// Load the snapshot at `index_path` and publish it. Blocks the calling
    /// thread for the duration of the load; concurrent loads are serialized.
    pub fn reload(&self) -> Result<(), ServiceError> {
        let _gate = self.load_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let prev = self.state.load_full();
        self.state.store(Arc::new(ServiceState {
            status: ServiceStatus::Loading,
            index: prev.index.clone(),
            generation: prev.generation,
            last_error: prev.last_error.clone(),
            loaded_mtime: prev.loaded_mtime,
        }));
        info!(path = %self.index_path.display(), generation = prev.generation, "loading index");

        match self.load_index() {
            Ok((index, mtime)) => {
                let documents = index.len();
                self.state.store(Arc::new(ServiceState {
                    status: ServiceStatus::Ready,
                    index: Some(Arc::new(index)),
                    generation: prev.generation + 1,
                    last_error: None,
                    loaded_mtime: mtime,
                }));
                info!(documents, generation = prev.generation + 1, "index ready");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                let status = if prev.index.is_some() { ServiceStatus::Ready } else { ServiceStatus::Failed };
                self.state.store(Arc::new(ServiceState {
                    status,
                    index: prev.index.clone(),
                    generation: prev.generation,
                    last_error: Some(message.clone()),
                    loaded_mtime: prev.loaded_mtime,
                }));
                if prev.index.is_some() {
                    warn!(error = %message, "reload failed, still serving previous index");
                } else {
                    error!(error = %message, "index load failed");
                }
                Err(e.into())
            }
        }
    }

    fn load_index(&self) -> Result<(VectorIndex, Option<SystemTime>), IndexError> {
        let mtime = snapshot_mtime(&self.index_path);
        let index = VectorIndex::load(&self.index_path)?;
        if index.model_id() != self.embedder.model_id() {
            return Err(IndexError::ModelMismatch {
                index: index.model_id().to_string(),
                provider: self.embedder.model_id().to_string(),
            });
        }
        if let Some(dim) = index.dim() {
            if dim != self.embedder.dim() {
                return Err(IndexError::DimensionMismatch { expected: self.embedder.dim(), got: dim });
            }
        }
        Ok((index, mtime))
    }

    /// Top `top_k` documents for `question`, honouring the configured
    /// query timeout.
    pub fn ask(&self, question: &str) -> Result<QueryResult, ServiceError> {
        self.ask_with_deadline(question, self.top_k, Deadline::from_timeout(self.query_timeout))
    }

    /// Top `k` documents for `question`. The deadline is checked after
    /// embedding and periodically during the scan.
    pub fn ask_with_deadline(&self, question: &str, k: usize, deadline: Deadline) -> Result<QueryResult, ServiceError> {
        let index = {
            let state = self.state.load();
            match &state.index {
                Some(index) => Arc::clone(index),
                None => {
                    return Err(ServiceError::ServiceUnavailable {
                        status: state.status,
                        reason: state.last_error.clone().unwrap_or_else(|| "no index loaded".to_string()),
                    })
                }
            }
        };
        let vector = self.embedder.embed(question)?;
        if deadline.is_expired() {
            return Err(ServiceError::Timeout);
        }
        let hits = index.query_with_deadline(&vector, k, deadline).map_err(|e| match e {
            IndexError::DeadlineExceeded => ServiceError::Timeout,
            other => ServiceError::Index(other),
        })?;
        debug!(k, hits = hits.len(), top = hits.first().map(|h| h.score), "query answered");
        Ok(hits)
    }

    /// [`ask`](Self::ask) on tokio's blocking pool.
    pub async fn ask_async(self: &Arc<Self>, question: String) -> Result<QueryResult, ServiceError> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.ask(&question))
            .await
            .map_err(|e| ServiceError::Task(e.to_string()))?
    }

    /// Run [`start`](Self::start) on the blocking pool.
    pub fn spawn_start(self: &Arc<Self>) -> JoinHandle<Result<(), ServiceError>> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.start())
    }

    /// Run [`reload`](Self::reload) on the blocking pool.
    pub fn spawn_reload(self: &Arc<Self>) -> JoinHandle<Result<(), ServiceError>> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.reload())
    }

    /// Periodically retry a failed load and pick up a rewritten snapshot.
    /// Stops once the service is dropped.
    pub fn spawn_watchdog(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(service) = weak.upgrade() else { break };
                if !service.needs_load() {
                    continue;
                }
                debug!(status = %service.status().status, "watchdog triggering reload");
                match tokio::task::spawn_blocking(move || service.reload()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(error = %e, "watchdog reload failed"),
                    Err(e) => warn!(error = %e, "watchdog reload task failed"),
                }
            }
        })
    }

    fn needs_load(&self) -> bool {
        let state = self.state.load();
        match state.status {
            ServiceStatus::Loading => false,
            ServiceStatus::Unloaded | ServiceStatus::Failed => true,
            ServiceStatus::Ready => {
                let current = snapshot_mtime(&self.index_path);
                current.is_some() && current != state.loaded_mtime
            }
        }
    }
}

fn snapshot_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
