//! Coordinator daemon command.
//!
//! Hosts the three long-lived responsibilities in one process: the HTTP
//! API, the sequential merge worker, and the dead-agent reaper. Graceful
//! shutdown drains the in-flight merge before exit.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::adapters::sqlite::{create_pool, verify_connection, Migrator};
use crate::domain::models::Config;
use crate::infrastructure::api::{self, AppState};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{CoordinatorContext, MergeWorker, Reaper};

pub async fn handle_coordinator(config: Config) -> Result<()> {
    for finding in ConfigLoader::lint(&config) {
        warn!("{finding}");
    }

    let pool = create_pool(&config.database).await.context("failed to open state store")?;
    Migrator::new(pool.clone())
        .run_embedded_migrations()
        .await
        .context("failed to run migrations")?;
    verify_connection(&pool).await.context("state store probe failed")?;

    let bind_addr = config.coordinator.bind_addr();
    let ctx = CoordinatorContext::sqlite(pool, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = Arc::new(MergeWorker::new(ctx.clone()));
    let worker_handle = {
        let worker = worker.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { worker.run(rx).await })
    };

    let reaper = Arc::new(Reaper::new(ctx.clone()));
    let reaper_handle = {
        let reaper = reaper.clone();
        let rx = shutdown_rx;
        tokio::spawn(async move { reaper.run(rx).await })
    };

    let state = AppState::new(ctx);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "coordinator listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    let _ = reaper_handle.await;
    info!("coordinator stopped");
    Ok(())
}
