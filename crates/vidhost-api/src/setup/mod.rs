//! Application setup and initialization

pub mod routes;
pub mod server;
pub mod services;

use crate::state::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use vidhost_core::Config;
use vidhost_infra::{init_telemetry, LogFormat, ShutdownController};

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router, ShutdownController)> {
    // Validate configuration first - fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    let log_format = config.log_format().parse().unwrap_or(LogFormat::Text);
    init_telemetry("vidhost-api", config.environment(), log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!("Configuration loaded and validated successfully");

    let (controller, signal) = ShutdownController::new();
    let state = services::initialize_services(&config, signal).await?;
    let router = routes::setup_routes(&config, state.clone());

    Ok((state, router, controller))
}
