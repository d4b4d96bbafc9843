//! Exact (brute-force) vector index.
//!
//! Vectors live in one row-major buffer next to their precomputed L2 norms.
//! A query scores every row, then partially sorts for the top `k`. Ties keep
//! insertion order. The index is immutable once loaded: readers share it
//! behind an `Arc`, rebuilds produce a new index.

use std::cmp::Ordering;
use std::collections::HashMap;

use qadb_core::{Deadline, Document, IndexError, QueryResult, SearchHit};

use crate::metric::{l2_norm, Metric};

/// Rows scored between two deadline checks.
pub const SCAN_CHECKPOINT: usize = 1024;

#[derive(Debug, Clone)]
pub struct VectorIndex {
    model_id: String,
    metric: Metric,
    dim: Option<usize>,
    documents: Vec<Document>,
    vectors: Vec<f32>,
    norms: Vec<f32>,
    by_id: HashMap<String, usize>,
}

impl VectorIndex {
    /// An empty index whose dimensionality is fixed by the first insertion.
    pub fn new(model_id: impl Into<String>, metric: Metric) -> Self {
        Self {
            model_id: model_id.into(),
            metric,
            dim: None,
            documents: Vec::new(),
            vectors: Vec::new(),
            norms: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// An empty index with a known dimensionality.
    pub fn with_dim(model_id: impl Into<String>, metric: Metric, dim: usize) -> Self {
        let mut index = Self::new(model_id, metric);
        index.dim = Some(dim);
        index
    }

    pub fn model_id(&self) -> &str { &self.model_id }
    pub fn metric(&self) -> Metric { self.metric }
    pub fn dim(&self) -> Option<usize> { self.dim }
    pub fn len(&self) -> usize { self.documents.len() }
    pub fn is_empty(&self) -> bool { self.documents.is_empty() }
    pub fn documents(&self) -> &[Document] { &self.documents }

    /// Row-major vector buffer, `len() * dim` values.
    pub(crate) fn raw_vectors(&self) -> &[f32] { &self.vectors }

    pub fn vector(&self, pos: usize) -> Option<&[f32]> {
        let dim = self.dim?;
        self.vectors.get(pos * dim..(pos + 1) * dim)
    }

    pub fn get(&self, id: &str) -> Option<(&Document, &[f32])> {
        let pos = *self.by_id.get(id)?;
        Some((&self.documents[pos], self.vector(pos)?))
    }

    /// (document, vector) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Document, &[f32])> + '_ {
        let dim = self.dim.unwrap_or(0);
        self.documents.iter().enumerate().map(move |(i, d)| (d, &self.vectors[i * dim..(i + 1) * dim]))
    }

    /// Append a document. The first insertion fixes the dimensionality;
    /// zero-length embeddings are rejected.
    pub fn insert(&mut self, doc: Document, vec: Vec<f32>) -> Result<(), IndexError> {
        if vec.is_empty() {
            return Err(IndexError::EmptyVector(doc.id));
        }
        match self.dim {
            Some(expected) if expected != vec.len() => {
                return Err(IndexError::DimensionMismatch { expected, got: vec.len() });
            }
            Some(_) => {}
            None => self.dim = Some(vec.len()),
        }
        if self.by_id.contains_key(&doc.id) {
            return Err(IndexError::DuplicateDocument(doc.id));
        }
        self.by_id.insert(doc.id.clone(), self.documents.len());
        self.norms.push(l2_norm(&vec));
        self.vectors.extend_from_slice(&vec);
        self.documents.push(doc);
        Ok(())
    }

    /// Up to `k` nearest documents, best first.
    pub fn query(&self, vec: &[f32], k: usize) -> Result<QueryResult, IndexError> {
        self.query_with_deadline(vec, k, Deadline::NONE)
    }

    /// As [`VectorIndex::query`], abandoning the scan with
    /// [`IndexError::DeadlineExceeded`] once `deadline` has passed.
    pub fn query_with_deadline(&self, vec: &[f32], k: usize, deadline: Deadline) -> Result<QueryResult, IndexError> {
        let (dim, n) = match self.dim {
            Some(dim) if dim > 0 && !self.is_empty() && k > 0 => (dim, self.len()),
            _ => return Ok(Vec::new()),
        };
        if vec.len() != dim {
            return Err(IndexError::DimensionMismatch { expected: dim, got: vec.len() });
        }
        let q_norm = l2_norm(vec);
        let mut scored: Vec<(f32, usize)> = Vec::with_capacity(n);
        for (pos, row) in self.vectors.chunks_exact(dim).enumerate() {
            if pos % SCAN_CHECKPOINT == 0 && deadline.is_expired() {
                return Err(IndexError::DeadlineExceeded);
            }
            scored.push((self.metric.score(vec, q_norm, row, self.norms[pos]), pos));
        }
        let k = k.min(n);
        if k < n {
            scored.select_nth_unstable_by(k - 1, rank_order);
            scored.truncate(k);
        }
        scored.sort_by(rank_order);
        Ok(scored
            .into_iter()
            .map(|(score, pos)| SearchHit { document: self.documents[pos].clone(), score })
            .collect())
    }
}

/// Descending score, then ascending insertion position.
fn rank_order(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
}
