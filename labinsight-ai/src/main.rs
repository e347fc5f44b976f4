//! labinsight-ai - Health Insight microservice
//!
//! Configuration priority: command line, then environment
//! (`LABINSIGHT_CONFIG`, `LABINSIGHT_PORT`), then TOML file, then compiled
//! defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use labinsight_common::config::{load_toml_config, ConfigResolver, TomlConfig};
use labinsight_common::events::EventBus;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labinsight_ai::cache::{CacheConfig, SessionMemoryCache};
use labinsight_ai::clients::{
    ContextStore, HttpContextStore, HttpInsightProvider, InsightProvider,
};
use labinsight_ai::engines::EngineRegistry;
use labinsight_ai::{AppState, Orchestrator, OrchestratorConfig};

/// Interval between sweeps of expired cache entries
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Command-line arguments for labinsight-ai
#[derive(Parser, Debug)]
#[command(name = "labinsight-ai")]
#[command(about = "Health insight orchestration microservice")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "LABINSIGHT_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so the file can set the log
    // level; the outcome is logged once the subscriber is up.
    let config_path = ConfigResolver::new("labinsight-ai").resolve(args.config.as_deref());
    let loaded = config_path.as_deref().map(load_toml_config);
    let file_config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => TomlConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "labinsight_ai={level},labinsight_common={level},tower_http=info",
                    level = file_config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting labinsight-ai v{}", env!("CARGO_PKG_VERSION"));
    match (&config_path, loaded) {
        (Some(path), Some(Ok(_))) => info!("Configuration loaded from {}", path.display()),
        (_, Some(Err(e))) => warn!("{}; using compiled defaults", e),
        _ => info!("No config file found; using compiled defaults"),
    }

    let config = file_config
        .validate()
        .context("Invalid configuration")?;
    let port = args.port.unwrap_or(config.port);

    // External collaborators
    let timeout = Duration::from_millis(config.services.request_timeout_ms);
    let provider: Arc<dyn InsightProvider> = Arc::new(
        HttpInsightProvider::new(&config.services.insight_url, timeout)
            .context("Failed to create insight provider client")?,
    );
    let context_store: Arc<dyn ContextStore> = Arc::new(
        HttpContextStore::new(&config.services.context_store_url, timeout)
            .context("Failed to create context store client")?,
    );
    info!(
        insight_url = %config.services.insight_url,
        context_store_url = %config.services.context_store_url,
        "Collaborators configured"
    );

    let registry = EngineRegistry::standard(Arc::clone(&provider), Arc::clone(&context_store));
    let cache = Arc::new(SessionMemoryCache::new(CacheConfig::from_settings(
        &config.cache,
    )));
    let event_bus = EventBus::new(100);

    let orchestrator = Arc::new(
        Orchestrator::new(OrchestratorConfig::from_toml(&config), registry, Arc::clone(&cache))
            .with_context_store(Arc::clone(&context_store))
            .with_events(event_bus.clone()),
    );
    info!(
        engines = orchestrator.registry().len(),
        global_deadline_ms = config.orchestrator.global_deadline_ms,
        engine_deadline_ms = config.orchestrator.engine_deadline_ms,
        "Orchestrator initialized"
    );

    let prune_task = tokio::spawn(prune_expired_periodically(Arc::clone(&cache)));

    let state = AppState::new(orchestrator, provider, context_store, event_bus);
    let app = labinsight_ai::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    prune_task.abort();
    cache.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Sweep expired cache entries until the cache shuts down
async fn prune_expired_periodically(cache: Arc<SessionMemoryCache>) {
    let mut interval = tokio::time::interval(PRUNE_INTERVAL);
    loop {
        interval.tick().await;
        if cache.prune_expired().await.is_err() {
            break;
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
