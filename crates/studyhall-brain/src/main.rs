use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

mod app;
mod http;
mod ollama;
mod pdf;
mod residency;
mod runtime;

use ollama::OllamaRuntime;
use residency::ResidencyManager;

#[derive(Parser)]
#[command(name = "studyhall-brain", about = "Studyhall model orchestrator")]
struct Args {
    /// Path to studyhall.toml (default: ~/.studyhall/studyhall.toml)
    #[arg(long)]
    config: Option<String>,
    /// Override the configured bind address.
    #[arg(long)]
    bind: Option<String>,
    /// Override the configured port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studyhall_brain=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var("STUDYHALL_CONFIG").ok());
    let config = studyhall_core::StudyhallConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        studyhall_core::StudyhallConfig::default()
    });

    let bind = args.bind.unwrap_or_else(|| config.brain.bind.clone());
    let port = args.port.unwrap_or(config.brain.port);

    let runtime = Arc::new(OllamaRuntime::new(&config.runtime));
    let residency = ResidencyManager::new(runtime, config.models.clone(), config.embedding.dim);
    let state = Arc::new(app::AppState::new(residency));

    // Pin the core model in the background; the health endpoint reports
    // "Starting" until the probe succeeds, and the supervisor's startup
    // deadline decides how long that may take.
    let warm_state = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            match warm_state.residency.ensure_core().await {
                Ok(()) => break,
                Err(e) => {
                    warn!(error = %e, "core model not ready yet, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                }
            }
        }
    });

    let router = app::build_router(Arc::clone(&state), config.uploads.max_bytes + 1024 * 1024);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Studyhall brain listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The only legal core-model unload.
    state.residency.shutdown().await;
    info!("Studyhall brain stopped");
    Ok(())
}

/// The supervisor stops us with SIGTERM; interactive runs use Ctrl-C.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
