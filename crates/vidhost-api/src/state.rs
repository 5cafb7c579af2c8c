//! Application state shared by every request handler.

use std::path::PathBuf;
use std::sync::Arc;

use vidhost_broker::{MessageBroker, UploadEventPublisher};
use vidhost_core::Config;
use vidhost_infra::{RetryPolicy, ShutdownSignal};
use vidhost_processing::{UploadCoordinator, UploadSettings};
use vidhost_storage::ObjectStore;

use crate::auth::AuthVerifier;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ObjectStore>,
    pub uploads: UploadCoordinator,
    pub upload_events: UploadEventPublisher,
    pub auth: Arc<dyn AuthVerifier>,
    pub shutdown: ShutdownSignal,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn ObjectStore>,
        broker: Arc<dyn MessageBroker>,
        auth: Arc<dyn AuthVerifier>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let uploads = UploadCoordinator::new(
            store.clone(),
            UploadSettings {
                part_size: config.upload_part_size_bytes(),
                concurrency: config.upload_part_concurrency(),
                part_retry: RetryPolicy::default().with_max_attempts(config.part_retry_attempts()),
            },
        );
        let upload_events = UploadEventPublisher::new(broker, config.upload_completed_topic());
        Self {
            config,
            store,
            uploads,
            upload_events,
            auth,
            shutdown,
        }
    }

    /// Directory for request bodies spilled to disk; the system temp dir when unset.
    pub fn spool_dir(&self) -> Option<PathBuf> {
        self.config.work_dir().map(PathBuf::from)
    }
}
