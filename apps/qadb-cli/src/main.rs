use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use qadb_core::config::{expand_path, Config, Settings};
use qadb_core::corpus::CorpusSelector;
use qadb_core::{Deadline, Embedder, QueryResult};
use qadb_service::{AnswerComposer, ExtractiveComposer, RetrievalService, ServiceError};
use qadb_vector::{inspect, BuildOptions, BuildWarning, IndexBuilder};

#[derive(Parser, Debug)]
#[command(name = "qadb")]
#[command(about = "Build and query a semantic Q&A index")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to the working directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a corpus and write an index snapshot
    Build {
        #[arg(long)]
        root: Option<PathBuf>,
        /// File-name glob selecting corpus files
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Reuse embeddings of unchanged documents from the existing snapshot
        #[arg(long)]
        reuse: bool,
    },
    /// Answer a question; reads one question per line from stdin when omitted
    Ask {
        question: Option<String>,
        #[arg(long)]
        k: Option<usize>,
        #[arg(long)]
        index: Option<PathBuf>,
        /// Print hits as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a snapshot's header
    Inspect {
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = match &cli.config_dir {
        Some(dir) => Config::load_from(dir),
        None => Config::load(),
    }
    .context("loading configuration")?;
    let settings = config.settings()?;

    match cli.command {
        Command::Build { root, pattern, out, reuse } => build(&settings, root, pattern, out, reuse),
        Command::Ask { question, k, index, json } => ask(settings, question, k, index, json).await,
        Command::Inspect { index } => {
            let path = index.unwrap_or_else(|| expand_path(&settings.data.index_path));
            let meta = inspect(&path)?;
            println!("snapshot   {}", path.display());
            println!("model      {}", meta.model_id);
            println!("metric     {}", meta.metric);
            println!("dim        {}", meta.dim);
            println!("documents  {}", meta.count);
            println!("checksum   {}", meta.checksum);
            println!("created    {}", meta.created_at.to_rfc3339());
            Ok(())
        }
    }
}

fn build(
    settings: &Settings,
    root: Option<PathBuf>,
    pattern: Option<String>,
    out: Option<PathBuf>,
    reuse: bool,
) -> anyhow::Result<()> {
    let root = root.unwrap_or_else(|| expand_path(&settings.data.corpus_dir));
    let out = out.unwrap_or_else(|| expand_path(&settings.data.index_path));
    let pattern = pattern.unwrap_or_else(|| settings.data.corpus_pattern.clone());
    let selector = CorpusSelector::new(&pattern)?.with_containers(settings.data.containers.iter().cloned());

    let embedder = qadb_embed::shared_embedder(&settings.embedding)?;
    let options = BuildOptions {
        batch_size: settings.embedding.batch_size,
        show_progress: true,
        reuse_from: reuse.then(|| out.clone()),
        ..Default::default()
    };
    info!(root = %root.display(), pattern = %pattern, out = %out.display(), model = embedder.model_id(), "building index");
    let report = IndexBuilder::new(embedder, selector).with_options(options).build_to(&[&root], &out)?;

    for warning in &report.warnings {
        match warning {
            BuildWarning::FileSkipped { path, reason } => eprintln!("skipped file {}: {reason}", path.display()),
            BuildWarning::MalformedRecord { path, index, error } => {
                eprintln!("skipped record {index} in {}: {error}", path.display())
            }
            BuildWarning::DuplicateId { original, renamed, .. } => eprintln!("renamed duplicate id {original} -> {renamed}"),
        }
    }
    println!(
        "indexed {} documents from {} files ({} skipped, {} reused embeddings) -> {}",
        report.documents,
        report.files_scanned - report.files_skipped,
        report.files_skipped,
        report.reused_embeddings,
        out.display()
    );
    Ok(())
}

async fn ask(
    settings: Settings,
    question: Option<String>,
    k: Option<usize>,
    index: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let mut service = RetrievalService::from_settings(&settings)?;
    if let Some(path) = index {
        service = service.with_index_path(path);
    }
    let k = k.unwrap_or(settings.retrieval.top_k);
    let timeout = settings.retrieval.query_timeout();
    let service = Arc::new(service);
    service.spawn_start().await??;

    match question {
        Some(q) => answer_one(&service, &q, k, json, timeout),
        None => {
            // Interactive: a rebuilt snapshot is picked up without restarting.
            let watchdog = service.spawn_watchdog(settings.retrieval.retry_interval());
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = line?;
                let q = line.trim();
                if q.is_empty() {
                    continue;
                }
                if let Err(e) = answer_one(&service, q, k, json, timeout) {
                    eprintln!("error: {e}");
                }
                io::stdout().flush()?;
            }
            watchdog.abort();
            Ok(())
        }
    }
}

fn answer_one(service: &RetrievalService, question: &str, k: usize, json: bool, timeout: Option<Duration>) -> anyhow::Result<()> {
    let deadline = Deadline::from_timeout(timeout);
    let hits = match service.ask_with_deadline(question, k, deadline) {
        Ok(hits) => hits,
        Err(e @ ServiceError::ServiceUnavailable { .. }) => anyhow::bail!("{e} (run `qadb build` first?)"),
        Err(e) => return Err(e.into()),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        print_hits(question, &hits);
    }
    Ok(())
}

fn print_hits(question: &str, hits: &QueryResult) {
    let composed = ExtractiveComposer::default().compose(question, hits);
    match &composed.answer {
        Some(answer) => println!("{answer}"),
        None => println!("No relevant answer found."),
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("  {}. [{:.4}] {}", i + 1, hit.score, hit.document.source().unwrap_or(hit.id()));
    }
}
