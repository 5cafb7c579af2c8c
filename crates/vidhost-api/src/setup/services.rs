//! Store, broker and auth collaborator initialization.

use crate::auth::{AuthVerifier, HttpAuthVerifier};
use crate::state::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use vidhost_broker::create_broker;
use vidhost_core::Config;
use vidhost_infra::ShutdownSignal;
use vidhost_storage::create_storage;

/// Connect the collaborators and build the shared state.
///
/// Fails when the store or the upload-completed topic is unreachable within the
/// control timeout, so a misconfigured deployment never starts serving.
pub async fn initialize_services(config: &Config, shutdown: ShutdownSignal) -> Result<Arc<AppState>> {
    let store = create_storage(config)
        .await
        .context("Failed to initialize object storage")?;
    tokio::time::timeout(config.control_timeout(), store.check_ready())
        .await
        .context("Object storage readiness check timed out")?
        .context("Object storage is not reachable")?;
    tracing::info!(backend = %store.backend_type(), "Object storage ready");

    let broker = create_broker(config)
        .await
        .context("Failed to initialize message broker")?;
    tokio::time::timeout(
        config.control_timeout(),
        broker.ensure_topic(config.upload_completed_topic()),
    )
    .await
    .context("Message broker readiness check timed out")?
    .with_context(|| {
        format!(
            "Message broker topic {} is not available",
            config.upload_completed_topic()
        )
    })?;
    tracing::info!(backend = %broker.backend_type(), topic = %config.upload_completed_topic(), "Message broker ready");

    if config.auth_disabled() {
        tracing::warn!("Authentication is disabled; every request runs as the anonymous user");
    }
    let auth: Arc<dyn AuthVerifier> = Arc::new(
        HttpAuthVerifier::new(config.auth_service_url(), config.auth_timeout())
            .map_err(|e| anyhow::anyhow!("{}", e))?,
    );

    Ok(Arc::new(AppState::new(
        config.clone(),
        store,
        broker,
        auth,
        shutdown,
    )))
}
