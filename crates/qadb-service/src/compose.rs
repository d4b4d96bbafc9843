//! Answer composition on top of raw retrieval.
//!
//! A generative composer (prompting an LLM with the hits as context) would
//! plug in behind [`AnswerComposer`]. The built-in one is extractive.
use serde::Serialize;

use qadb_core::QueryResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedAnswer {
    /// `None` when nothing relevant was retrieved.
    pub answer: Option<String>,
    /// Provenance tags of the hits the answer draws on, best first.
    pub sources: Vec<String>,
}

pub trait AnswerComposer: Send + Sync {
    fn compose(&self, question: &str, hits: &QueryResult) -> ComposedAnswer;
}

/// Answers with the best hit's answer text and cites every hit scoring at
/// least `min_score`.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveComposer {
    pub min_score: Option<f32>,
}

impl ExtractiveComposer {
    pub fn with_min_score(min_score: f32) -> Self { Self { min_score: Some(min_score) } }
}

impl AnswerComposer for ExtractiveComposer {
    fn compose(&self, _question: &str, hits: &QueryResult) -> ComposedAnswer {
        let relevant: Vec<_> = hits.iter().filter(|h| self.min_score.map_or(true, |min| h.score >= min)).collect();
        let answer = relevant.first().map(|h| h.document.answer().trim().to_string());
        let mut sources: Vec<String> = Vec::new();
        for hit in &relevant {
            let tag = hit.document.source().unwrap_or(hit.id()).to_string();
            if !sources.contains(&tag) {
                sources.push(tag);
            }
        }
        ComposedAnswer { answer, sources }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qadb_core::normalize::{normalize, QaRecord};
    use qadb_core::SearchHit;

    fn hit(id: &str, answer: &str, topic: &str, score: f32) -> SearchHit {
        let doc = normalize(&QaRecord::new(id, format!("question {id}?"), answer).with_metadata("topic", topic));
        SearchHit { document: doc, score }
    }

    #[test]
    fn uses_top_answer_and_cites_sources() {
        let hits = vec![hit("Q1", "Rest and fluids.", "fever", 0.9), hit("Q2", "See a nurse.", "triage", 0.4)];
        let out = ExtractiveComposer::default().compose("what now?", &hits);
        assert_eq!(out.answer.as_deref(), Some("Rest and fluids."));
        assert_eq!(out.sources, vec!["Q1 (fever)", "Q2 (triage)"]);
    }

    #[test]
    fn threshold_filters_weak_hits() {
        let hits = vec![hit("Q1", "Rest.", "fever", 0.2)];
        let out = ExtractiveComposer::with_min_score(0.5).compose("q", &hits);
        assert_eq!(out.answer, None);
        assert!(out.sources.is_empty());
        assert_eq!(ExtractiveComposer::default().compose("q", &Vec::new()).answer, None);
    }
}
