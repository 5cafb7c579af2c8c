//! Vidhost Infrastructure Library
//!
//! Shared runtime plumbing for the API and worker binaries:
//! - Telemetry initialization
//! - Bounded fan-out/fan-in pool with a join barrier
//! - Retry with exponential backoff
//! - Shutdown signal handling

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub mod pool;
pub mod retry;
pub mod shutdown;

// Re-export commonly used types
#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};

pub use pool::{BoundedPool, PoolError};
pub use retry::{compute_backoff, retry_with_backoff, RetryPolicy};
pub use shutdown::{wait_for_shutdown_signal, ShutdownController, ShutdownSignal};
