// Main entry point for the collector service

use std::sync::Arc;

use anyhow::{Context, Result};
use collector_core::kernel::{start_scheduler, CollectorDeps};
use collector_core::server::{build_app, AppState};
use collector_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,collector_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting collection orchestrator");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        providers = config.provider_endpoints.len(),
        units_per_job = config.queue.units_per_job,
        batch_size = config.queue.batch_size,
        "Configuration loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database ready");

    let deps = CollectorDeps::postgres(pool.clone(), &config)
        .context("Failed to build collector dependencies")?;
    let state = AppState::new(pool, deps, config.worker.clone());

    // Queue worker
    let shutdown = CancellationToken::new();
    let worker = state.worker.clone();
    let worker_shutdown = shutdown.clone();
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(worker_shutdown).await {
            tracing::error!("Queue worker failed: {}", e);
        }
    });

    // Hourly schedule trigger and stream cleanup
    let mut scheduler = start_scheduler(
        Arc::clone(&state.trigger),
        state.deps.stream_hub.clone(),
    )
    .await
    .context("Failed to start scheduler")?;

    let app = build_app(state);
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "Collector listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    scheduler.shutdown().await.context("Failed to stop scheduler")?;
    let _ = worker_handle.await;

    tracing::info!("Collector stopped");
    Ok(())
}
