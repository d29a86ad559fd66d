use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rusqlite::Connection;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod app;
mod auth;
mod brain;
mod chat;
mod compose;
mod http;
mod processing;
mod queue;
mod supervisor;

use brain::BrainClient;
use chat::ChatPipeline;
use processing::MaterialProcessor;
use queue::ProcessingQueue;
use supervisor::BrainSupervisor;

use studyhall_store::{HistoryStore, LocalObjectStore, MaterialStore, ProfileStore};

#[derive(Parser)]
#[command(name = "studyhall-gateway", about = "Studyhall API server")]
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
                .unwrap_or_else(|_| "studyhall_gateway=info,tower_http=debug".into()),
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

    // Startup order is fixed: config, stores, supervisor (health-gated),
    // background queue, then — only then — the HTTP listener. AI routes
    // never see traffic before the supervisor settles Healthy or Absent.

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let materials = Arc::new(MaterialStore::new(open_db(&config.database.path)?));
    let history = Arc::new(HistoryStore::new(open_db(&config.database.path)?));
    let profiles = Arc::new(ProfileStore::new(open_db(&config.database.path)?));
    let objects = Arc::new(LocalObjectStore::new(config.uploads.objects_dir.clone()));

    let supervisor = BrainSupervisor::new(config.brain.clone());
    match supervisor.start().await {
        Ok(()) => info!("brain healthy, AI features enabled"),
        Err(e) => warn!(error = %e, "brain startup failed — AI features disabled"),
    }

    let brain_client: Arc<dyn brain::Brain> = Arc::new(BrainClient::new(&config.brain));

    let processor = Arc::new(MaterialProcessor::new(
        Arc::clone(&materials),
        objects.clone(),
        Arc::clone(&brain_client),
        config.embedding.dim,
        Duration::from_secs(config.processing.timeout_secs),
    ));
    let (processing_queue, task_rx) = ProcessingQueue::new(config.processing.queue_depth);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cancel = CancellationToken::new();
    let workers = tokio::spawn(queue::run_workers(
        task_rx,
        processor,
        config.processing.concurrency,
        shutdown_rx,
        cancel.clone(),
    ));

    let chat_pipeline = ChatPipeline::new(
        config.chat.clone(),
        config.uploads.clone(),
        config.retrieval.top_k_default,
        config.embedding.dim,
        Arc::clone(&brain_client),
        Arc::clone(&materials),
        Arc::clone(&history),
        Arc::clone(&profiles),
    );

    let bind = args.bind.unwrap_or_else(|| config.gateway.bind.clone());
    let port = args.port.unwrap_or(config.gateway.port);

    let state = Arc::new(app::AppState {
        config,
        brain: brain_client,
        supervisor,
        materials,
        history,
        profiles,
        objects,
        queue: processing_queue,
        chat: chat_pipeline,
    });
    let router = app::build_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Studyhall gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Orderly teardown: stop accepting tasks, cancel in-flight
    // processing (materials mark themselves failed("cancelled")), then
    // take the brain down with it.
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), workers).await;
    if let Err(e) = state.supervisor.stop().await {
        warn!(error = %e, "brain stop failed during shutdown");
    }
    info!("Studyhall gateway stopped");
    Ok(())
}

fn open_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)?;
    studyhall_store::db::init_db(&conn)?;
    Ok(conn)
}

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
