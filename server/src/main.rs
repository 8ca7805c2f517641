use anyhow::{bail, Context, Result};
use clap::Parser;
use redsift_core::IndexStore;
use server::{router, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "redsift-server", about = "JSON query API over a built index")]
struct Args {
    /// Index directory written by `redsift-indexer build`
    #[arg(long, default_value = "./index")]
    index: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Results per page when a query gives no `size`
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    if args.page_size == 0 || args.page_size > MAX_PAGE_SIZE {
        bail!("--page-size must be between 1 and {MAX_PAGE_SIZE}");
    }

    let store = open_index(Path::new(&args.index))?;
    let stats = store.stats();
    let meta = store.meta();
    tracing::info!(
        index = %args.index,
        num_docs = stats.total_doc_count,
        num_terms = meta.num_terms,
        avgdl = stats.average_doc_length,
        built = %meta.created_at,
        "serving index"
    );
    let app = router(Arc::new(store), args.page_size);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).with_graceful_shutdown(wait_for_signal()).await?;
    tracing::info!("server stopped");
    Ok(())
}

/// Opens the index, turning the common startup mistakes into actionable
/// messages.
fn open_index(dir: &Path) -> Result<IndexStore> {
    if !dir.is_dir() {
        bail!("no index at {}; build one with `redsift-indexer build --output {}`", dir.display(), dir.display());
    }
    match IndexStore::open(dir) {
        Ok(store) => Ok(store),
        Err(redsift_core::Error::EmptyIndex) => bail!("index at {} holds no documents", dir.display()),
        Err(e) => Err(e).with_context(|| format!("opening index at {}", dir.display())),
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
