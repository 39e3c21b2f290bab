use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hookfeed::config::{Cli, Commands, ServeArgs, SignatureMode, StoreArgs};
use hookfeed::server::{self, AppState};
use hookfeed::store::{EventStore, MemoryEventStore, PgEventStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hookfeed=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Commands::Serve(args) => serve(args).await,
        Commands::Purge(args) => purge(&args).await,
    }
}

fn open_store(args: &StoreArgs) -> Result<Arc<dyn EventStore>> {
    match args.pg_options() {
        Some(options) => {
            let store = PgEventStore::connect_lazy(&options).context("invalid DATABASE_URL")?;
            info!(max_connections = options.max_connections, "using PostgreSQL event store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set - events are kept in memory and lost on restart");
            Ok(Arc::new(MemoryEventStore::new()))
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let signature = args.signature_mode()?;
    match &signature {
        SignatureMode::Enforce { .. } => info!("Webhook signature verification enabled"),
        SignatureMode::Bypass { .. } => {
            warn!("Signature verification bypassed - do not expose this instance publicly");
        }
    }

    let store = open_store(&args.store)?;
    let state = Arc::new(AppState {
        store: Arc::clone(&store),
        signature,
    });
    let app = server::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("GitHub webhook feed listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    info!("event store closed");
    Ok(())
}

async fn purge(args: &StoreArgs) -> Result<()> {
    let store = open_store(args)?;
    let deleted = store.purge().await.context("failed to purge events")?;
    info!(deleted, "purged stored events");
    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
