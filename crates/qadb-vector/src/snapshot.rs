//! Durable index snapshots as a single Arrow IPC file.
//!
//! Saving writes a sibling temp file, syncs it, then renames it over the
//! target, so a reader sees either the old snapshot or the new one. Loading
//! validates the metadata, the row count and the vector checksum before the
//! index is handed out.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, StringArray};
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use arrow_schema::{ArrowError, Field};
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use qadb_core::{Attributes, Document, IndexError};

use crate::index::VectorIndex;
use crate::schema::{build_arrow_schema, SnapshotMeta, FORMAT_VERSION};

/// Rows per record batch in a snapshot file.
const ROWS_PER_BATCH: usize = 4096;

/// blake3 of the vectors' little-endian bytes, hex encoded.
pub fn vector_checksum(vectors: &[f32]) -> String {
    let mut hasher = blake3::Hasher::new();
    for v in vectors {
        hasher.update(&v.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn io_err(path: &Path, source: io::Error) -> IndexError {
    IndexError::Io { path: path.to_path_buf(), source }
}

fn arrow_io_err(path: &Path, e: ArrowError) -> IndexError {
    match e {
        ArrowError::IoError(_, source) => io_err(path, source),
        other => io_err(path, io::Error::other(other.to_string())),
    }
}

impl VectorIndex {
    /// Metadata describing this index as it would be saved now.
    pub fn snapshot_meta(&self) -> SnapshotMeta {
        SnapshotMeta {
            format: FORMAT_VERSION,
            dim: self.dim().unwrap_or(0),
            metric: self.metric(),
            model_id: self.model_id().to_string(),
            count: self.len(),
            checksum: vector_checksum(self.raw_vectors()),
            created_at: Utc::now(),
        }
    }

    /// Persist atomically to `path`. On failure any previous snapshot at
    /// `path` is left untouched.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;

        let meta = self.snapshot_meta();
        let schema = build_arrow_schema(&meta);
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| io_err(parent, e))?;
        {
            let mut writer =
                FileWriter::try_new(BufWriter::new(tmp.as_file_mut()), &schema).map_err(|e| arrow_io_err(path, e))?;
            let dim = meta.dim;
            let field = Arc::new(Field::new("item", arrow_schema::DataType::Float32, true));
            for start in (0..self.len()).step_by(ROWS_PER_BATCH) {
                let end = (start + ROWS_PER_BATCH).min(self.len());
                let docs = &self.documents()[start..end];
                let ids = StringArray::from_iter_values(docs.iter().map(|d| d.id.as_str()));
                let contents = StringArray::from_iter_values(docs.iter().map(|d| d.content.as_str()));
                let attributes = docs
                    .iter()
                    .map(|d| serde_json::to_string(&d.attributes))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| io_err(path, io::Error::other(e)))?;
                let values = Float32Array::from(self.raw_vectors()[start * dim..end * dim].to_vec());
                let vectors = FixedSizeListArray::try_new(field.clone(), dim as i32, Arc::new(values), None)
                    .map_err(|e| arrow_io_err(path, e))?;
                let columns: Vec<ArrayRef> = vec![
                    Arc::new(ids),
                    Arc::new(contents),
                    Arc::new(StringArray::from(attributes)),
                    Arc::new(vectors),
                ];
                let batch = RecordBatch::try_new(schema.clone(), columns).map_err(|e| arrow_io_err(path, e))?;
                writer.write(&batch).map_err(|e| arrow_io_err(path, e))?;
            }
            writer.finish().map_err(|e| arrow_io_err(path, e))?;
            let mut inner = writer.into_inner().map_err(|e| arrow_io_err(path, e))?;
            inner.flush().map_err(|e| io_err(path, e))?;
        }
        tmp.as_file().sync_all().map_err(|e| io_err(path, e))?;
        tmp.persist(path).map_err(|e| io_err(path, e.error))?;
        info!(path = %path.display(), documents = meta.count, dim = meta.dim, model = %meta.model_id, "index snapshot saved");
        Ok(())
    }

    /// Load and verify a snapshot. A missing file is
    /// [`IndexError::IndexNotFound`]; anything unreadable or inconsistent is
    /// [`IndexError::IndexCorrupt`].
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let (reader, meta) = open_snapshot(path)?;

        let mut index = if meta.dim > 0 {
            VectorIndex::with_dim(meta.model_id.clone(), meta.metric, meta.dim)
        } else {
            VectorIndex::new(meta.model_id.clone(), meta.metric)
        };
        for batch in reader {
            let batch = batch.map_err(|e| IndexError::corrupt(path, format!("unreadable record batch: {e}")))?;
            read_batch(path, &batch, meta.dim, &mut index)?;
        }

        if index.len() != meta.count {
            return Err(IndexError::corrupt(path, format!("expected {} rows, found {}", meta.count, index.len())));
        }
        if vector_checksum(index.raw_vectors()) != meta.checksum {
            return Err(IndexError::corrupt(path, "vector checksum mismatch"));
        }
        info!(path = %path.display(), documents = index.len(), dim = meta.dim, model = %meta.model_id, "index snapshot loaded");
        Ok(index)
    }
}

/// Read only the metadata of a snapshot.
pub fn inspect(path: &Path) -> Result<SnapshotMeta, IndexError> {
    open_snapshot(path).map(|(_, meta)| meta)
}

fn open_snapshot(path: &Path) -> Result<(FileReader<BufReader<File>>, SnapshotMeta), IndexError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IndexError::IndexNotFound(path.to_path_buf()),
        _ => io_err(path, e),
    })?;
    let reader = FileReader::try_new(BufReader::new(file), None)
        .map_err(|e| IndexError::corrupt(path, format!("not an index snapshot: {e}")))?;
    let schema = reader.schema();
    let meta = SnapshotMeta::from_map(schema.metadata()).map_err(|reason| IndexError::corrupt(path, reason))?;

    let expected = build_arrow_schema(&meta);
    if schema.fields() != expected.fields() {
        return Err(IndexError::corrupt(path, "unexpected column layout"));
    }
    debug!(path = %path.display(), ?meta, "snapshot header");
    Ok((reader, meta))
}

fn read_batch(path: &Path, batch: &RecordBatch, dim: usize, index: &mut VectorIndex) -> Result<(), IndexError> {
    let ids = string_column(path, batch, "id")?;
    let contents = string_column(path, batch, "content")?;
    let attributes = string_column(path, batch, "attributes")?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_fixed_size_list_opt())
        .ok_or_else(|| IndexError::corrupt(path, "missing column 'vector'"))?;

    for i in 0..batch.num_rows() {
        if ids.is_null(i) || contents.is_null(i) || attributes.is_null(i) || vectors.is_null(i) {
            return Err(IndexError::corrupt(path, format!("null value in row {i}")));
        }
        let attrs: Attributes = serde_json::from_str(attributes.value(i))
            .map_err(|e| IndexError::corrupt(path, format!("bad attributes in row {i}: {e}")))?;
        let row = vectors.value(i);
        let values = row
            .as_primitive_opt::<Float32Type>()
            .ok_or_else(|| IndexError::corrupt(path, "vector column is not f32"))?;
        if values.len() != dim || values.null_count() > 0 {
            return Err(IndexError::corrupt(path, format!("row {i} vector does not have {dim} values")));
        }
        let doc = Document { id: ids.value(i).to_string(), content: contents.value(i).to_string(), attributes: attrs };
        index
            .insert(doc, values.values().to_vec())
            .map_err(|e| IndexError::corrupt(path, format!("row {i}: {e}")))?;
    }
    Ok(())
}

fn string_column<'a>(path: &Path, batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, IndexError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_string_opt::<i32>())
        .ok_or_else(|| IndexError::corrupt(path, format!("missing column '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_depends_on_order_and_values() {
        let a = vector_checksum(&[1.0, 2.0]);
        assert_eq!(a, vector_checksum(&[1.0, 2.0]));
        assert_ne!(a, vector_checksum(&[2.0, 1.0]));
        assert_eq!(a.len(), 64);
    }
}
