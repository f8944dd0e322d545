use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tabsearch_core::persist::{save_meta, IndexPaths, MetaFile};
use tabsearch_core::{BuildStats, IndexBuilder};
use tracing_subscriber::{fmt, EnvFilter};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const META_VERSION: u32 = 1;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build the boolean inverted index from a tab-separated corpus", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build docs.bin and index.bin from a corpus file
    Build {
        /// Corpus file, one `<id>\t<url>\t<title>\t<body>` record per line
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long, default_value = "./index")]
        output: String,
        /// Skip writing meta.json
        #[arg(long, default_value_t = false)]
        no_meta: bool,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, no_meta } => build_index(&input, &output, !no_meta),
    }
}

fn build_index(input: &str, output: &str, write_meta: bool) -> Result<()> {
    let out_paths = IndexPaths::new(output);
    let file = File::open(Path::new(input)).with_context(|| format!("cannot read corpus {input}"))?;

    let mut builder = IndexBuilder::new();
    builder
        .ingest(BufReader::new(file))
        .with_context(|| format!("failed reading corpus {input}"))?;
    tracing::info!(num_docs = builder.doc_count(), "ingested documents");

    let stats = builder
        .finish(&out_paths)
        .with_context(|| format!("failed writing index to {output}"))?;
    report(&stats);

    if write_meta {
        let meta = MetaFile {
            version: META_VERSION,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            num_docs: stats.documents,
            num_terms: stats.terms,
            stats,
        };
        save_meta(&out_paths, &meta).context("failed writing meta.json")?;
    }

    tracing::info!(output, "index build complete");
    Ok(())
}

fn report(stats: &BuildStats) {
    tracing::info!(
        documents = stats.documents,
        skipped = stats.skipped_records,
        tokens = stats.tokens,
        avg_token_chars = stats.avg_token_chars(),
        terms = stats.terms,
        postings = stats.postings,
        "indexing report"
    );
    if stats.truncated_terms > 0 {
        tracing::warn!(truncated_terms = stats.truncated_terms, "terms longer than 255 bytes were truncated");
    }
    tracing::info!(
        total_secs = stats.elapsed_secs,
        ms_per_doc = stats.avg_ms_per_doc(),
        kb_per_sec = stats.kb_per_sec(),
        "indexing speed"
    );
}
