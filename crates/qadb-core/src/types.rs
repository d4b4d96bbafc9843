//! Domain types shared by the normalizer, the vector index and the service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type DocId = String;

/// Free-form metadata attached to a document. Keys keep the order they had
/// in the source record; keys added later are appended.
pub type Attributes = Map<String, Value>;

/// A dense vector produced by one embedding model.
pub type Embedding = Vec<f32>;

/// One normalized, embeddable unit derived from a corpus record.
///
/// - `id`: stable external identifier, unique within one index build
/// - `content`: the exact text the embedding was computed from
/// - `attributes`: record metadata plus the synthesized `id` and `source`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub content: String,
    pub attributes: Attributes,
}

impl Document {
    /// Provenance tag of the form `"{id} ({topic})"`.
    pub fn source(&self) -> Option<&str> {
        self.attributes.get(crate::normalize::SOURCE_KEY).and_then(Value::as_str)
    }

    /// The answer half of the canonical content, if the content follows the
    /// question/answer template.
    pub fn answer(&self) -> &str {
        match self.content.split_once(crate::normalize::ANSWER_MARKER) {
            Some((_, answer)) => answer,
            None => &self.content,
        }
    }
}

/// One ranked result. `score` is metric-specific but higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document: Document,
    pub score: f32,
}

impl SearchHit {
    pub fn id(&self) -> &str { &self.document.id }
}

/// Hits sorted by descending score, ties in insertion order.
pub type QueryResult = Vec<SearchHit>;
