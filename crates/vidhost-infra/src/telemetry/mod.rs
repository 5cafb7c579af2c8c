//! Tracing initialization
//!
//! Structured logs through `tracing-subscriber` with an `EnvFilter` and either the
//! human-readable or the JSON formatter.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry, LogFormat};
