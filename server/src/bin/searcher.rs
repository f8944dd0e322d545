use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tabsearch_core::persist::IndexPaths;
use tabsearch_core::SearchEngine;
use tracing_subscriber::{fmt, EnvFilter};

/// Titles shown per query in interactive mode.
const CLI_PREVIEW: usize = 5;

#[derive(Parser)]
#[command(name = "searcher")]
#[command(about = "Run boolean queries against a built index", long_about = None)]
struct Cli {
    /// Index directory
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Forward index file, overrides <index>/docs.bin
    #[arg(long)]
    docs_file: Option<PathBuf>,
    /// Inverted index file, overrides <index>/index.bin
    #[arg(long)]
    index_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one query per line from stdin and print the first titles
    Cli,
    /// Run one query and print count, time and a page of `url\ttitle` lines
    Query {
        query: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(io::stderr).init();
    let cli = Cli::parse();

    let paths = IndexPaths::new(&cli.index);
    let docs = cli.docs_file.unwrap_or_else(|| paths.docs());
    let index = cli.index_file.unwrap_or_else(|| paths.index());
    let engine = SearchEngine::open_files(&docs, &index)
        .with_context(|| format!("cannot open index ({}, {})", docs.display(), index.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Commands::Cli => run_interactive(&engine, io::stdin().lock(), &mut out),
        Commands::Query { query, offset, limit } => run_single(&engine, &query, offset, limit, &mut out),
    }
}

fn run_interactive<R: BufRead, W: Write>(engine: &SearchEngine, input: R, out: &mut W) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let results = engine.execute_query(&line)?;
        writeln!(out, "Query: {} Found: {}", line, results.len())?;
        for &doc_id in results.iter().take(CLI_PREVIEW) {
            let doc = engine.get_document(doc_id);
            writeln!(out, "  {} ({})", doc.title, doc.url)?;
        }
        writeln!(out, "-----------------------")?;
    }
    Ok(())
}

fn run_single<W: Write>(engine: &SearchEngine, query: &str, offset: usize, limit: usize, out: &mut W) -> Result<()> {
    let page = engine.search(query, offset, limit)?;
    writeln!(out, "{}", page.total_hits)?;
    writeln!(out, "{:.3}", page.took.as_secs_f64() * 1000.0)?;
    for hit in &page.hits {
        writeln!(out, "{}\t{}", hit.url, hit.title)?;
    }
    Ok(())
}
