use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use qadb_core::corpus::CorpusSelector;
use qadb_core::normalize::{normalize, QaRecord};
use qadb_core::{BuildError, Document, EmbedError, Embedder, Embedding, IndexError};
use qadb_embed::HashEmbedder;
use qadb_vector::{inspect, BuildOptions, BuildWarning, IndexBuilder, Metric, VectorIndex};

const DIM: usize = 384;

/// Wraps the hashing embedder and counts the texts it was asked to embed.
struct CountingEmbedder { inner: HashEmbedder, texts: AtomicUsize }

impl CountingEmbedder {
    fn new() -> Self { Self { inner: HashEmbedder::new(DIM), texts: AtomicUsize::new(0) } }
    fn texts(&self) -> usize { self.texts.load(Ordering::SeqCst) }
}

impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str { self.inner.model_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedError> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_many(texts)
    }
}

fn unrelated_records() -> Vec<QaRecord> {
    [
        ("Q0002", "How often should a newborn feed?", "Every two to three hours, day and night.", "infant_feeding"),
        ("Q0003", "Which vaccines are given at six weeks?", "Polio, rotavirus and the pentavalent dose.", "immunisation"),
        ("Q0004", "How should a cord stump be cleaned?", "Keep it dry and clean; no ointments.", "newborn_care"),
        ("Q0005", "Why does iron help anaemia?", "Iron rebuilds haemoglobin stores.", "nutrition"),
        ("Q0006", "How can malaria be prevented?", "Sleep under treated nets every night.", "malaria"),
        ("Q0007", "When should solid foods start?", "Around six months of age.", "infant_feeding"),
        ("Q0008", "How long does colostrum last?", "Roughly two to four days after birth.", "breastfeeding"),
        ("Q0009", "Who should test for tuberculosis?", "Anyone coughing for two weeks or longer.", "tb"),
        ("Q0010", "How does handwashing stop diarrhoea?", "Soap removes germs from hands before eating.", "hygiene"),
    ]
    .into_iter()
    .map(|(id, q, a, topic)| QaRecord::new(id, q, a).with_metadata("topic", topic))
    .collect()
}

fn preeclampsia_record() -> QaRecord {
    QaRecord::new(
        "Q0001",
        "What is preeclampsia?",
        "A pregnancy complication marked by high blood pressure and protein in the urine.",
    )
    .with_metadata("topic", "antenatal_care")
}

fn corpus_documents() -> Vec<Document> {
    std::iter::once(preeclampsia_record()).chain(unrelated_records()).map(|r| normalize(&r)).collect()
}

fn index_of(embedder: &dyn Embedder, docs: &[Document]) -> VectorIndex {
    let mut index = VectorIndex::new(embedder.model_id(), Metric::Cosine);
    for doc in docs {
        index.insert(doc.clone(), embedder.embed(&doc.content).unwrap()).unwrap();
    }
    index
}

fn record_json(id: &str, q: &str, a: &str) -> serde_json::Value {
    serde_json::json!({ "id": id, "question": q, "answer": a, "metadata": { "topic": "general_health" } })
}

fn write_batch(dir: &Path, name: &str, records: Vec<serde_json::Value>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::json!({ "qa_pairs": records }).to_string()).unwrap();
    path
}

fn builder(embedder: Arc<dyn Embedder>) -> IndexBuilder {
    IndexBuilder::new(embedder, CorpusSelector::new("*batch*.json").unwrap())
}

#[test]
fn every_document_retrieves_itself() {
    let embedder = HashEmbedder::new(DIM);
    let docs = corpus_documents();
    let index = index_of(&embedder, &docs);
    for doc in &docs {
        let hits = index.query(&embedder.embed(&doc.content).unwrap(), 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), doc.id);
    }
}

#[test]
fn blood_pressure_question_finds_preeclampsia() {
    let embedder = HashEmbedder::new(DIM);
    let index = index_of(&embedder, &corpus_documents());
    let query = embedder.embed("What causes high blood pressure in pregnancy?").unwrap();
    let hits = index.query(&query, 3).unwrap();
    assert_eq!(hits.len(), 3);
    let top = hits.iter().find(|h| h.id() == "Q0001").expect("preeclampsia in top 3");
    assert_eq!(top.document.source(), Some("Q0001 (antenatal_care)"));
    assert!(top.document.content.starts_with("Question: What is preeclampsia?\nAnswer: "));
}

#[test]
fn save_then_load_answers_identically() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("snapshots/qa.qadb");
    let embedder = HashEmbedder::new(DIM);
    let index = index_of(&embedder, &corpus_documents());
    index.save(&path).unwrap();

    let loaded = VectorIndex::load(&path).unwrap();
    assert_eq!(loaded.len(), index.len());
    assert_eq!(loaded.dim(), Some(DIM));
    assert_eq!(loaded.model_id(), embedder.model_id());
    assert_eq!(loaded.documents(), index.documents());

    for q in ["blood pressure", "newborn feeding schedule", "malaria nets", "soap"] {
        let v = embedder.embed(q).unwrap();
        let before = index.query(&v, 5).unwrap();
        let after = loaded.query(&v, 5).unwrap();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.id(), b.id());
            assert!((a.score - b.score).abs() < 1e-6);
        }
    }
}

#[test]
fn overwriting_a_snapshot_leaves_no_temporaries() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("qa.qadb");
    let embedder = HashEmbedder::new(DIM);
    let docs = corpus_documents();

    index_of(&embedder, &docs[..3]).save(&path).unwrap();
    index_of(&embedder, &docs).save(&path).unwrap();

    assert_eq!(VectorIndex::load(&path).unwrap().len(), docs.len());
    let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("qa.qadb")]);
}

#[test]
fn empty_index_roundtrips() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("empty.qadb");
    VectorIndex::new("hash:xxh64:d8", Metric::Cosine).save(&path).unwrap();
    let loaded = VectorIndex::load(&path).unwrap();
    assert!(loaded.is_empty());
    assert!(loaded.query(&[1.0; 8], 3).unwrap().is_empty());
}

#[test]
fn missing_and_garbage_snapshots_are_distinguished() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.qadb");
    assert!(matches!(VectorIndex::load(&missing), Err(IndexError::IndexNotFound(_))));

    let garbage = tmp.path().join("garbage.qadb");
    fs::write(&garbage, b"definitely not arrow").unwrap();
    assert!(matches!(VectorIndex::load(&garbage), Err(IndexError::IndexCorrupt { .. })));
}

#[test]
fn truncated_snapshot_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("qa.qadb");
    let embedder = HashEmbedder::new(DIM);
    index_of(&embedder, &corpus_documents()).save(&path).unwrap();
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(VectorIndex::load(&path), Err(IndexError::IndexCorrupt { .. })));
}

#[test]
fn altered_vector_fails_checksum() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("qa.qadb");
    let marker: f32 = 1234.5678;
    let mut index = VectorIndex::new("test-model", Metric::Cosine);
    index.insert(normalize(&preeclampsia_record()), vec![marker, 0.5, 0.25]).unwrap();
    index.save(&path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let needle = marker.to_le_bytes();
    let at = bytes.windows(4).position(|w| w == needle).expect("vector bytes present");
    bytes[at..at + 4].copy_from_slice(&4321.0f32.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    match VectorIndex::load(&path) {
        Err(IndexError::IndexCorrupt { reason, .. }) => assert!(reason.contains("checksum"), "{reason}"),
        other => panic!("expected checksum failure, got {other:?}"),
    }
}

#[test]
fn inspect_reads_metadata_only() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("qa.qadb");
    let embedder = HashEmbedder::new(DIM);
    let index = index_of(&embedder, &corpus_documents());
    index.save(&path).unwrap();
    let meta = inspect(&path).unwrap();
    assert_eq!(meta.count, 10);
    assert_eq!(meta.dim, DIM);
    assert_eq!(meta.metric, Metric::Cosine);
    assert_eq!(meta.model_id, embedder.model_id());
}

#[test]
fn malformed_record_is_skipped_with_warning() {
    let tmp = TempDir::new().unwrap();
    let mut records: Vec<_> =
        (0..9).map(|i| record_json(&format!("Q{i}"), &format!("question number {i}"), &format!("answer {i}"))).collect();
    records.insert(4, serde_json::json!({ "id": "BAD", "answer": "no question" }));
    write_batch(tmp.path(), "qa_batch_01.json", records);

    let (index, report) = builder(Arc::new(HashEmbedder::new(DIM))).build(&[tmp.path()]).unwrap();
    assert_eq!(index.len(), 9);
    assert_eq!(report.documents, 9);
    assert_eq!(report.malformed_records(), 1);
    assert!(matches!(&report.warnings[0], BuildWarning::MalformedRecord { index: 4, .. }));
}

#[test]
fn bad_files_are_skipped_not_fatal() {
    let tmp = TempDir::new().unwrap();
    write_batch(tmp.path(), "qa_batch_01.json", vec![record_json("Q1", "first?", "one")]);
    fs::write(tmp.path().join("qa_batch_02.json"), "{ not json").unwrap();
    fs::write(tmp.path().join("qa_batch_03.json"), r#"{"other_key": []}"#).unwrap();
    fs::write(tmp.path().join("notes.json"), "{ ignored, does not match the pattern").unwrap();

    let (index, report) = builder(Arc::new(HashEmbedder::new(DIM))).build(&[tmp.path()]).unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(report.files_scanned, 3);
    assert_eq!(report.files_skipped, 2);
}

#[test]
fn empty_corpus_fails_and_persists_nothing() {
    let tmp = TempDir::new().unwrap();
    write_batch(tmp.path(), "qa_batch_01.json", vec![serde_json::json!({ "id": "X", "question": 7, "answer": "a" })]);
    let out = tmp.path().join("out/qa.qadb");

    let err = builder(Arc::new(HashEmbedder::new(DIM))).build_to(&[tmp.path()], &out).unwrap_err();
    assert!(matches!(err, BuildError::EmptyCorpus { files: 1 }));
    assert!(!out.exists());

    let nothing = TempDir::new().unwrap();
    let err = builder(Arc::new(HashEmbedder::new(DIM))).build(&[nothing.path()]).unwrap_err();
    assert!(matches!(err, BuildError::EmptyCorpus { files: 0 }));
}

#[test]
fn duplicate_ids_are_suffixed() {
    let tmp = TempDir::new().unwrap();
    write_batch(
        tmp.path(),
        "qa_batch_01.json",
        vec![record_json("Q1", "alpha?", "a"), record_json("Q1", "beta?", "b"), record_json("Q1", "gamma?", "c")],
    );
    let (index, report) = builder(Arc::new(HashEmbedder::new(DIM))).build(&[tmp.path()]).unwrap();
    let ids: Vec<_> = index.documents().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["Q1", "Q1#2", "Q1#3"]);
    assert_eq!(report.duplicates_renamed, 2);
    assert_eq!(index.get("Q1#2").unwrap().0.attributes["id"], "Q1");
}

#[test]
fn rebuild_reuses_unchanged_embeddings() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    let records: Vec<_> = (0..5).map(|i| record_json(&format!("Q{i}"), &format!("question {i}?"), "same answer")).collect();
    write_batch(&corpus, "qa_batch_01.json", records);
    let out = tmp.path().join("qa.qadb");

    let first = Arc::new(CountingEmbedder::new());
    builder(first.clone()).build_to(&[&corpus], &out).unwrap();
    assert_eq!(first.texts(), 5);

    write_batch(&corpus, "qa_batch_02.json", vec![record_json("Q9", "a brand new question?", "fresh")]);
    let second = Arc::new(CountingEmbedder::new());
    let options = BuildOptions { reuse_from: Some(out.clone()), ..Default::default() };
    let report = builder(second.clone()).with_options(options).build_to(&[&corpus], &out).unwrap();
    assert_eq!(report.reused_embeddings, 5);
    assert_eq!(second.texts(), 1);

    let fresh = index_of(&HashEmbedder::new(DIM), VectorIndex::load(&out).unwrap().documents());
    let reused = VectorIndex::load(&out).unwrap();
    for (a, b) in fresh.iter().zip(reused.iter()) {
        assert_eq!(a, b);
    }
}

#[test]
fn batch_size_does_not_change_vectors() {
    let tmp = TempDir::new().unwrap();
    let records: Vec<_> = (0..7).map(|i| record_json(&format!("Q{i}"), &format!("question {i}?"), "answer")).collect();
    write_batch(tmp.path(), "qa_batch_01.json", records);
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM));

    let (one, _) = builder(embedder.clone())
        .with_options(BuildOptions { batch_size: 1, ..Default::default() })
        .build(&[tmp.path()])
        .unwrap();
    let (three, _) = builder(embedder)
        .with_options(BuildOptions { batch_size: 3, ..Default::default() })
        .build(&[tmp.path()])
        .unwrap();
    assert!(one.iter().zip(three.iter()).all(|(a, b)| a == b));
}
