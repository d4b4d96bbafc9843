//! Arrow layout of an index snapshot.
//!
//! Columns: `id`, `content`, `attributes` (JSON object text) and `vector`
//! (fixed-size list of f32). Index metadata travels in the schema metadata
//! under `qadb.*` keys.

use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::metric::Metric;

pub const FORMAT_VERSION: u32 = 1;

pub const META_FORMAT: &str = "qadb.format";
pub const META_DIM: &str = "qadb.dim";
pub const META_METRIC: &str = "qadb.metric";
pub const META_MODEL_ID: &str = "qadb.model_id";
pub const META_COUNT: &str = "qadb.count";
pub const META_CHECKSUM: &str = "qadb.checksum";
pub const META_CREATED_AT: &str = "qadb.created_at";

/// Index metadata recorded with every snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMeta {
    pub format: u32,
    /// 0 for a snapshot of an index that never received a vector.
    pub dim: usize,
    pub metric: Metric,
    pub model_id: String,
    pub count: usize,
    /// blake3 over the vectors' little-endian bytes, in row order.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl SnapshotMeta {
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (META_FORMAT.to_string(), self.format.to_string()),
            (META_DIM.to_string(), self.dim.to_string()),
            (META_METRIC.to_string(), self.metric.to_string()),
            (META_MODEL_ID.to_string(), self.model_id.clone()),
            (META_COUNT.to_string(), self.count.to_string()),
            (META_CHECKSUM.to_string(), self.checksum.clone()),
            (META_CREATED_AT.to_string(), self.created_at.to_rfc3339()),
        ])
    }

    /// Parse and validate; the error is a human-readable reason.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, String> {
        let get = |key: &str| map.get(key).ok_or_else(|| format!("missing metadata key '{key}'"));
        let parse_usize = |key: &str| -> Result<usize, String> {
            get(key)?.parse::<usize>().map_err(|e| format!("bad '{key}': {e}"))
        };
        let format = get(META_FORMAT)?.parse::<u32>().map_err(|e| format!("bad '{META_FORMAT}': {e}"))?;
        if format != FORMAT_VERSION {
            return Err(format!("unsupported snapshot format {format} (expected {FORMAT_VERSION})"));
        }
        let created_at = DateTime::parse_from_rfc3339(get(META_CREATED_AT)?)
            .map_err(|e| format!("bad '{META_CREATED_AT}': {e}"))?
            .with_timezone(&Utc);
        Ok(Self {
            format,
            dim: parse_usize(META_DIM)?,
            metric: get(META_METRIC)?.parse()?,
            model_id: get(META_MODEL_ID)?.clone(),
            count: parse_usize(META_COUNT)?,
            checksum: get(META_CHECKSUM)?.clone(),
            created_at,
        })
    }
}

pub fn vector_type(dim: usize) -> DataType {
    DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32)
}

pub fn build_arrow_schema(meta: &SnapshotMeta) -> Arc<Schema> {
    Arc::new(
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("attributes", DataType::Utf8, false),
            Field::new("vector", vector_type(meta.dim), false),
        ])
        .with_metadata(meta.to_map()),
    )
}
