use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tabsearch_core::persist::IndexPaths;
use tabsearch_core::SearchEngine;
use tabsearch_server::build_router;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

/// Serve boolean queries over HTTP
#[derive(Parser)]
struct Args {
    /// Directory holding docs.bin and index.bin
    #[arg(long, default_value = "./index")]
    index: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    // a missing or damaged index is fatal: there is no degraded mode
    let engine = SearchEngine::open(&IndexPaths::new(&args.index))
        .with_context(|| format!("cannot open index in {}", args.index))?;
    let app = build_router(Arc::new(engine));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, index = %args.index, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
