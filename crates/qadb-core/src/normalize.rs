//! Text normalizer: corpus record → canonical [`Document`].
//!
//! Content is `"Question: {question}\nAnswer: {answer}"` with both halves kept
//! verbatim. Attributes are a copy of the record metadata with `id` and
//! `source` overwritten; `source` reads `"{id} ({topic})"`.

use serde_json::Value;

use crate::error::RecordError;
use crate::types::{Attributes, Document};

pub const QUESTION_MARKER: &str = "Question: ";
pub const ANSWER_MARKER: &str = "\nAnswer: ";
pub const ID_KEY: &str = "id";
pub const SOURCE_KEY: &str = "source";
pub const TOPIC_KEY: &str = "topic";
pub const UNKNOWN_ID: &str = "Unknown";
pub const DEFAULT_TOPIC: &str = "General";

/// A Q&A record as found inside a corpus container.
#[derive(Debug, Clone, PartialEq)]
pub struct QaRecord {
    pub id: Option<String>,
    pub question: String,
    pub answer: String,
    pub metadata: Attributes,
}

impl QaRecord {
    pub fn new(id: impl Into<String>, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { id: Some(id.into()), question: question.into(), answer: answer.into(), metadata: Attributes::new() }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Validate a raw JSON record. `question` and `answer` must be strings,
    /// `metadata` an object (or absent/null), `id` a scalar (or absent/null).
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RecordError::MalformedRecord("record is not a JSON object".into()))?;
        let question = required_text(obj, "question")?;
        let answer = required_text(obj, "answer")?;
        let metadata = match obj.get("metadata") {
            None | Some(Value::Null) => Attributes::new(),
            Some(Value::Object(m)) => m.clone(),
            Some(_) => return Err(RecordError::MalformedRecord("'metadata' is not an object".into())),
        };
        let id = match obj.get(ID_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
            Some(_) => return Err(RecordError::MalformedRecord("'id' is not a scalar".into())),
        };
        Ok(Self { id, question, answer, metadata })
    }
}

fn required_text(obj: &serde_json::Map<String, Value>, key: &str) -> Result<String, RecordError> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(RecordError::MalformedRecord(format!("'{key}' is not a string"))),
        None => Err(RecordError::MalformedRecord(format!("missing '{key}'"))),
    }
}

pub fn content_for(question: &str, answer: &str) -> String {
    format!("{QUESTION_MARKER}{question}{ANSWER_MARKER}{answer}")
}

fn topic_of(metadata: &Attributes) -> String {
    match metadata.get(TOPIC_KEY) {
        None | Some(Value::Null) => DEFAULT_TOPIC.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Produce the canonical document for a record.
pub fn normalize(record: &QaRecord) -> Document {
    let id = record.id.clone().unwrap_or_else(|| UNKNOWN_ID.to_string());
    let topic = topic_of(&record.metadata);
    let mut attributes = record.metadata.clone();
    attributes.insert(SOURCE_KEY.to_string(), Value::String(format!("{id} ({topic})")));
    attributes.insert(ID_KEY.to_string(), Value::String(id.clone()));
    Document { id, content: content_for(&record.question, &record.answer), attributes }
}

/// Validate and normalize one raw JSON record.
pub fn normalize_value(value: &Value) -> Result<Document, RecordError> {
    QaRecord::from_value(value).map(|r| normalize(&r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preeclampsia_record() {
        let doc = normalize_value(&json!({
            "id": "Q0001",
            "question": "What is preeclampsia?",
            "answer": "A pregnancy complication...",
            "metadata": {"topic": "antenatal_care"}
        }))
        .unwrap();
        assert_eq!(doc.id, "Q0001");
        assert_eq!(doc.content, "Question: What is preeclampsia?\nAnswer: A pregnancy complication...");
        assert_eq!(doc.source(), Some("Q0001 (antenatal_care)"));
        assert_eq!(doc.attributes["topic"], "antenatal_care");
        assert_eq!(doc.attributes["id"], "Q0001");
        assert_eq!(doc.answer(), "A pregnancy complication...");
    }

    #[test]
    fn missing_id_and_topic_use_sentinels() {
        let doc = normalize_value(&json!({"question": "q", "answer": "a"})).unwrap();
        assert_eq!(doc.id, UNKNOWN_ID);
        assert_eq!(doc.source(), Some("Unknown (General)"));
    }

    #[test]
    fn metadata_id_and_source_are_overwritten() {
        let doc = normalize_value(&json!({
            "id": 7,
            "question": "q",
            "answer": "a",
            "metadata": {"id": "stale", "source": "stale", "trimester": 2}
        }))
        .unwrap();
        assert_eq!(doc.id, "7");
        assert_eq!(doc.attributes["id"], "7");
        assert_eq!(doc.attributes["source"], "7 (General)");
        assert_eq!(doc.attributes["trimester"], 2);
    }

    #[test]
    fn metadata_key_order_survives() {
        let doc = normalize_value(&json!({
            "id": "Q9",
            "question": "q",
            "answer": "a",
            "metadata": {"topic": "t", "zeta": 1, "alpha": 2}
        }))
        .unwrap();
        let keys: Vec<&str> = doc.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, ["topic", "zeta", "alpha", "source", "id"]);

        let text = serde_json::to_string(&doc.attributes).unwrap();
        let back: Attributes = serde_json::from_str(&text).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), doc.attributes.keys().collect::<Vec<_>>());
    }

    #[test]
    fn content_is_verbatim() {
        let r = QaRecord::new("x", "  Mixed CASE?  ", "line one\nline two");
        assert_eq!(normalize(&r).content, "Question:   Mixed CASE?  \nAnswer: line one\nline two");
    }

    #[test]
    fn rejects_missing_or_mistyped_fields() {
        for bad in [
            json!({"answer": "a"}),
            json!({"question": "q"}),
            json!({"question": 1, "answer": "a"}),
            json!({"question": "q", "answer": "a", "metadata": "oops"}),
            json!({"question": "q", "answer": "a", "id": ["x"]}),
            json!("just a string"),
        ] {
            assert!(matches!(normalize_value(&bad), Err(RecordError::MalformedRecord(_))), "{bad}");
        }
    }
}
