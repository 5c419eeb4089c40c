//! pipekeep-health - Pipeline health service
//!
//! Serves the pipeline view, warning and eviction batches, reconciliation
//! and the ownership ratio report over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pipekeep_common::config::{resolve_database_path, TomlConfig};
use pipekeep_common::db::init_database;
use pipekeep_common::db::settings::load_thresholds;
use pipekeep_common::SystemClock;
use pipekeep_health::{build_router, AppState, PipelineContext};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pipekeep-health
#[derive(Parser, Debug)]
#[command(name = "pipekeep-health")]
#[command(about = "Pipeline health service for Pipekeep")]
#[command(version)]
struct Args {
    /// SQLite database file (overrides PIPEKEEP_DATABASE and the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind to
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PIPEKEEP_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_resolved(args.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "pipekeep_health={level},pipekeep_common={level},tower_http=info",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Pipekeep pipeline health (pipekeep-health) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let db_path = resolve_database_path(args.database.as_deref(), &config);
    info!("Database path: {}", db_path.display());

    let db = init_database(&db_path)
        .await
        .context("Failed to open database")?;
    let thresholds = load_thresholds(&db)
        .await
        .context("Failed to load thresholds")?;
    info!(
        "Thresholds: stale after {}h, grace {}h, ratio healthy <= {}, risk > {}",
        thresholds.stale_after.num_hours(),
        thresholds.grace_period.num_hours(),
        thresholds.healthy_ratio_max,
        thresholds.risk_ratio_min
    );

    let ctx = PipelineContext::sqlite(db, Arc::new(SystemClock), thresholds);
    let app = build_router(AppState::new(ctx));

    let bind = args.bind.unwrap_or(config.bind);
    let port = args.port.unwrap_or(config.port);
    let listener = tokio::net::TcpListener::bind((bind.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", bind, port))?;
    let addr = listener.local_addr()?;
    info!("pipekeep-health listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
