//! Server startup and graceful shutdown

use anyhow::Result;
use axum::Router;
use vidhost_core::Config;
use vidhost_infra::{shutdown_telemetry, wait_for_shutdown_signal, ShutdownController};

/// Serve `app` until SIGINT/SIGTERM, then drain open connections.
///
/// `/health` reports 503 from the moment the signal arrives.
pub async fn start_server(config: &Config, app: Router, shutdown: ShutdownController) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.server_port());
    tracing::info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        max_upload_mb = config.max_upload_size_bytes() / 1024 / 1024,
        part_size_bytes = config.upload_part_size_bytes(),
        part_concurrency = config.upload_part_concurrency(),
        spool_threshold_bytes = config.upload_spool_threshold_bytes(),
        "Server ready and accepting connections"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            tracing::info!("Shutting down gracefully...");
            shutdown.trigger();
        })
        .await?;

    shutdown_telemetry().await;
    Ok(())
}
