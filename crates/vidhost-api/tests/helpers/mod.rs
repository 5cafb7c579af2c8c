//! Test helpers: build AppState and router over in-memory collaborators.
//!
//! Run from workspace root: `cargo test -p vidhost-api`.

use async_trait::async_trait;
use axum_test::TestServer;
use std::sync::Arc;
use vidhost_api::auth::{AuthVerifier, AuthenticatedUser};
use vidhost_api::setup::routes;
use vidhost_api::state::AppState;
use vidhost_broker::MemoryBroker;
use vidhost_core::config::ServiceConfig;
use vidhost_core::{AppError, BrokerBackend, Config, StorageBackend};
use vidhost_infra::ShutdownController;
use vidhost_storage::MemoryStorage;

pub const VALID_TOKEN: &str = "valid-token";
/// Token for which the stub auth service behaves as if it were down.
pub const OUTAGE_TOKEN: &str = "auth-down";
pub const TEST_USER_ID: &str = "42";
pub const UPLOAD_TOPIC: &str = "unprocessed_video_uploaded";

/// Accepts exactly [`VALID_TOKEN`].
pub struct StubAuthVerifier;

#[async_trait]
impl AuthVerifier for StubAuthVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        match token {
            VALID_TOKEN => Ok(AuthenticatedUser {
                id: TEST_USER_ID.to_string(),
                username: Some("tester".to_string()),
            }),
            OUTAGE_TOKEN => Err(AppError::UpstreamUnavailable(
                "auth service unreachable".to_string(),
            )),
            _ => Err(AppError::Unauthorized("Access token rejected".to_string())),
        }
    }
}

/// Test application: server plus the in-memory doubles behind it.
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStorage>,
    pub broker: Arc<MemoryBroker>,
    pub shutdown: ShutdownController,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub fn test_config(auth_disabled: bool) -> Config {
    Config::from_parts(ServiceConfig {
        storage_backend: StorageBackend::Memory,
        broker_backend: BrokerBackend::Memory,
        max_upload_size_bytes: 1024 * 1024,
        auth_disabled,
        ..ServiceConfig::default()
    })
}

pub fn setup_test_app() -> TestApp {
    setup_test_app_with(test_config(false))
}

pub fn setup_test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStorage::new());
    let broker = Arc::new(MemoryBroker::new("video_dead_letter"));
    let (shutdown, signal) = ShutdownController::new();

    let state = Arc::new(AppState::new(
        config.clone(),
        store.clone(),
        broker.clone(),
        Arc::new(StubAuthVerifier),
        signal,
    ));
    let router = routes::setup_routes(&config, state);
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        store,
        broker,
        shutdown,
    }
}
