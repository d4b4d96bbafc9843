//! Offline ingestion: corpus files → documents → embeddings → index snapshot.
//!
//! Record and file failures are logged, recorded in the [`BuildReport`] and
//! skipped. Provider failures and an empty result abort the build before
//! anything is persisted.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use qadb_core::corpus::{discover, scan_file, CorpusSelector};
use qadb_core::{BuildError, Document, EmbedError, Embedder, Embedding, RecordError};

use crate::cache::{content_hash, EmbeddingCache};
use crate::index::VectorIndex;
use crate::metric::Metric;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Texts per provider call.
    pub batch_size: usize,
    pub metric: Metric,
    /// Draw an indicatif progress bar on stderr while embedding.
    pub show_progress: bool,
    /// Previous snapshot whose vectors may be reused for unchanged content.
    pub reuse_from: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { batch_size: 32, metric: Metric::Cosine, show_progress: false, reuse_from: None }
    }
}

/// Something the build recovered from.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildWarning {
    FileSkipped { path: PathBuf, reason: String },
    MalformedRecord { path: PathBuf, index: usize, error: RecordError },
    DuplicateId { path: PathBuf, original: String, renamed: String },
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub documents: usize,
    pub duplicates_renamed: usize,
    pub reused_embeddings: usize,
    pub warnings: Vec<BuildWarning>,
}

impl BuildReport {
    pub fn malformed_records(&self) -> usize {
        self.warnings.iter().filter(|w| matches!(w, BuildWarning::MalformedRecord { .. })).count()
    }
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    selector: CorpusSelector,
    options: BuildOptions,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, selector: CorpusSelector) -> Self {
        Self { embedder, selector, options: BuildOptions::default() }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &BuildOptions { &self.options }

    /// Corpus files under `locations`. A directory is walked with the
    /// selector; a file is taken as given.
    pub fn discover<P: AsRef<Path>>(&self, locations: &[P]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for location in locations {
            let location = location.as_ref();
            if location.is_file() {
                files.push(location.to_path_buf());
            } else {
                files.extend(discover(location, &self.selector));
            }
        }
        files
    }

    /// Build a fresh index in memory from every corpus file under `locations`.
    pub fn build<P: AsRef<Path>>(&self, locations: &[P]) -> Result<(VectorIndex, BuildReport), BuildError> {
        let files = self.discover(locations);
        let mut report = BuildReport { files_scanned: files.len(), ..Default::default() };
        info!(files = files.len(), pattern = self.selector.pattern(), "ingesting corpus");

        let documents = self.collect_documents(&files, &mut report);
        if documents.is_empty() {
            warn!(files = files.len(), "no documents survived ingestion");
            return Err(BuildError::EmptyCorpus { files: files.len() });
        }

        let vectors = self.embed_documents(&documents, &mut report)?;
        let mut index = VectorIndex::with_dim(self.embedder.model_id(), self.options.metric, self.embedder.dim());
        for (doc, vec) in documents.into_iter().zip(vectors) {
            index.insert(doc, vec)?;
        }
        report.documents = index.len();
        info!(
            documents = report.documents,
            skipped_files = report.files_skipped,
            malformed = report.malformed_records(),
            renamed = report.duplicates_renamed,
            reused = report.reused_embeddings,
            "index built"
        );
        Ok((index, report))
    }

    /// Build and persist atomically to `out`. Nothing is written on failure.
    pub fn build_to<P: AsRef<Path>>(&self, locations: &[P], out: &Path) -> Result<BuildReport, BuildError> {
        let (index, report) = self.build(locations)?;
        index.save(out)?;
        Ok(report)
    }

    fn collect_documents(&self, files: &[PathBuf], report: &mut BuildReport) -> Vec<Document> {
        let mut documents = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for path in files {
            let scanned = match scan_file(path, &self.selector) {
                Ok(scanned) => scanned,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping corpus file");
                    report.files_skipped += 1;
                    report.warnings.push(BuildWarning::FileSkipped { path: path.clone(), reason: e.to_string() });
                    continue;
                }
            };
            debug!(file = %path.display(), accepted = scanned.documents.len(), rejected = scanned.rejected.len(), "scanned");
            for rejected in scanned.rejected {
                report.warnings.push(BuildWarning::MalformedRecord {
                    path: path.clone(),
                    index: rejected.index,
                    error: rejected.error,
                });
            }
            for mut doc in scanned.documents {
                let occurrences = seen.entry(doc.id.clone()).or_insert(0);
                *occurrences += 1;
                if *occurrences > 1 {
                    let original = doc.id.clone();
                    let mut n = *occurrences;
                    let mut renamed = format!("{original}#{n}");
                    // A literal "X#2" in the corpus must not collide with a rename.
                    while seen.contains_key(&renamed) {
                        n += 1;
                        renamed = format!("{original}#{n}");
                    }
                    seen.insert(renamed.clone(), 1);
                    if let Some(count) = seen.get_mut(&original) { *count = n; }
                    warn!(file = %path.display(), id = %original, renamed = %renamed, "duplicate document id");
                    report.duplicates_renamed += 1;
                    report.warnings.push(BuildWarning::DuplicateId { path: path.clone(), original, renamed: renamed.clone() });
                    doc.id = renamed;
                }
                documents.push(doc);
            }
        }
        documents
    }

    fn embed_documents(&self, documents: &[Document], report: &mut BuildReport) -> Result<Vec<Embedding>, BuildError> {
        let cache = match &self.options.reuse_from {
            Some(path) => EmbeddingCache::load_compatible(path, self.embedder.model_id(), self.embedder.dim())?,
            None => EmbeddingCache::default(),
        };

        let mut out: Vec<Option<Embedding>> = Vec::with_capacity(documents.len());
        let mut pending: Vec<usize> = Vec::new();
        for (i, doc) in documents.iter().enumerate() {
            match cache.get(&content_hash(&doc.content)) {
                Some(v) => {
                    out.push(Some(v.clone()));
                    report.reused_embeddings += 1;
                }
                None => {
                    out.push(None);
                    pending.push(i);
                }
            }
        }

        let pb = self.progress_bar(pending.len());
        let batch_size = self.options.batch_size.max(1);
        for chunk in pending.chunks(batch_size) {
            let texts: Vec<String> = chunk.iter().map(|&i| documents[i].content.clone()).collect();
            let vectors = self.embedder.embed_many(&texts)?;
            if vectors.len() != texts.len() {
                return Err(EmbedError::BatchShape { expected: texts.len(), got: vectors.len() }.into());
            }
            for (&i, v) in chunk.iter().zip(vectors) {
                out[i] = Some(v);
            }
            if let Some(pb) = &pb { pb.inc(chunk.len() as u64); }
        }
        if let Some(pb) = pb { pb.finish_with_message("embedded"); }

        out.into_iter()
            .map(|v| v.ok_or_else(|| BuildError::Provider(EmbedError::Inference("missing embedding".into()))))
            .collect()
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.options.show_progress || len == 0 {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    }
}
