//! Best-effort corpus scanning.
//!
//! Files are discovered recursively by a file-name glob and parsed one at a
//! time. A bad record is rejected and reported, a bad file is reported by the
//! caller and skipped; neither aborts the scan.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CorpusError, RecordError};
use crate::normalize::{normalize, QaRecord};
use crate::types::Document;

pub const DEFAULT_PATTERN: &str = "*batch*.json";
pub const DEFAULT_CONTAINER: &str = "qa_pairs";

/// Selection rule for corpus files plus the container keys that hold records.
#[derive(Debug, Clone)]
pub struct CorpusSelector {
    pattern: String,
    matcher: GlobMatcher,
    containers: Vec<String>,
}

impl CorpusSelector {
    pub fn new(pattern: &str) -> Result<Self, CorpusError> {
        let matcher = Glob::new(pattern)
            .map_err(|e| CorpusError::InvalidPattern { pattern: pattern.to_string(), reason: e.to_string() })?
            .compile_matcher();
        Ok(Self { pattern: pattern.to_string(), matcher, containers: vec![DEFAULT_CONTAINER.to_string()] })
    }

    pub fn with_containers<I, S>(mut self, containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.containers = containers.into_iter().map(Into::into).collect();
        self
    }

    pub fn pattern(&self) -> &str { &self.pattern }

    pub fn containers(&self) -> &[String] { &self.containers }

    pub fn matches(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|name| self.matcher.is_match(name))
    }
}

/// A record that was rejected during a file scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    /// Position within the container array.
    pub index: usize,
    pub error: RecordError,
}

/// The outcome of scanning one corpus file.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    pub path: PathBuf,
    pub documents: Vec<Document>,
    pub rejected: Vec<RejectedRecord>,
}

/// Recursively list regular files under `root` whose name matches the
/// selector. Sorted so insertion order is reproducible.
pub fn discover(root: &Path, selector: &CorpusSelector) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && selector.matches(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    debug!(root = %root.display(), pattern = selector.pattern(), files = files.len(), "corpus discovery");
    files
}

/// Parse one corpus file and normalize every record in its container.
pub fn scan_file(path: &Path, selector: &CorpusSelector) -> Result<CorpusFile, CorpusError> {
    let raw = fs::read_to_string(path).map_err(|source| CorpusError::Unreadable { path: path.to_path_buf(), source })?;
    let data: Value =
        serde_json::from_str(&raw).map_err(|source| CorpusError::InvalidJson { path: path.to_path_buf(), source })?;
    let records = selector
        .containers()
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_array))
        .ok_or_else(|| CorpusError::MissingContainer {
            path: path.to_path_buf(),
            expected: selector.containers().join(", "),
        })?;

    let mut documents = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for (index, raw) in records.iter().enumerate() {
        match QaRecord::from_value(raw) {
            Ok(record) => documents.push(normalize(&record)),
            Err(error) => {
                warn!(file = %path.display(), record = index, %error, "skipping record");
                rejected.push(RejectedRecord { index, error });
            }
        }
    }
    Ok(CorpusFile { path: path.to_path_buf(), documents, rejected })
}
