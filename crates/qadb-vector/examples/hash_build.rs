//! Build a snapshot from a corpus directory with the hashing embedder, then
//! print its header. Usage: `hash_build <corpus_dir> <out_file>`.
use std::path::PathBuf;
use std::sync::Arc;

use qadb_core::corpus::{CorpusSelector, DEFAULT_PATTERN};
use qadb_embed::HashEmbedder;
use qadb_vector::{inspect, BuildOptions, IndexBuilder};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let corpus = PathBuf::from(args.next().unwrap_or_else(|| ".".to_string()));
    let out = PathBuf::from(args.next().unwrap_or_else(|| "dev_data/qa.qadb".to_string()));

    let builder = IndexBuilder::new(Arc::new(HashEmbedder::new(384)), CorpusSelector::new(DEFAULT_PATTERN)?)
        .with_options(BuildOptions { show_progress: true, ..Default::default() });
    let report = builder.build_to(&[&corpus], &out)?;
    println!(
        "files={} skipped={} documents={} warnings={}",
        report.files_scanned,
        report.files_skipped,
        report.documents,
        report.warnings.len()
    );
    let meta = inspect(&out)?;
    println!("{} dim={} metric={} model={} created={}", out.display(), meta.dim, meta.metric, meta.model_id, meta.created_at);
    Ok(())
}
