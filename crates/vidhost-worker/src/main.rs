use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use vidhost_broker::{create_broker, ConfirmationPublisher, TranscodeRequestPublisher};
use vidhost_core::Config;
use vidhost_infra::{
    init_telemetry, shutdown_telemetry, wait_for_shutdown_signal, LogFormat, RetryPolicy,
    ShutdownController,
};
use vidhost_processing::{FfmpegTranscoder, TranscodeEngine, TranscodeSettings};
use vidhost_storage::create_storage;
use vidhost_worker::{
    health_router, JobConsumerConfig, JobConsumerPool, TranscodeJobHandler, UploadRelayHandler,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let log_format = config.log_format().parse().unwrap_or(LogFormat::Text);
    init_telemetry("vidhost-worker", config.environment(), log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let store = create_storage(&config)
        .await
        .context("Failed to initialize object storage")?;
    tokio::time::timeout(config.control_timeout(), store.check_ready())
        .await
        .context("Object storage readiness check timed out")?
        .context("Object storage is not reachable")?;

    let broker = create_broker(&config)
        .await
        .context("Failed to initialize message broker")?;
    for topic in [
        config.transcode_topic(),
        config.confirmation_topic(),
        config.dead_letter_topic(),
        config.upload_completed_topic(),
    ] {
        broker
            .ensure_topic(topic)
            .await
            .with_context(|| format!("Message broker topic {} is not available", topic))?;
    }

    let transcoder = FfmpegTranscoder::new(config.ffmpeg_path(), config.ffprobe_path())
        .context("Invalid FFmpeg configuration")?;
    let engine = TranscodeEngine::new(
        store.clone(),
        Arc::new(transcoder),
        ConfirmationPublisher::new(broker.clone(), config.confirmation_topic()),
        TranscodeSettings {
            segment_duration: config.hls_segment_duration(),
            encode_concurrency: config.encode_concurrency(),
            upload_concurrency: config.rendition_upload_concurrency(),
            upload_retry: RetryPolicy::default().with_max_attempts(config.part_retry_attempts()),
        },
    );

    let (controller, signal) = ShutdownController::new();

    let consumer_config = |topic: &str| JobConsumerConfig {
        max_workers: config.worker_concurrency(),
        job_timeout: config.job_timeout(),
        work_dir: config.work_dir().map(PathBuf::from),
        ..JobConsumerConfig::new(topic)
    };

    let mut pools = Vec::new();
    let transcode_pool = JobConsumerPool::new(
        broker.clone(),
        Arc::new(TranscodeJobHandler::new(Arc::new(engine))),
        consumer_config(config.transcode_topic()),
    );
    pools.push(tokio::spawn(transcode_pool.run(signal.clone())));

    if config.relay_upload_events() {
        let relay_pool = JobConsumerPool::new(
            broker.clone(),
            Arc::new(UploadRelayHandler::new(TranscodeRequestPublisher::new(
                broker.clone(),
                config.transcode_topic(),
            ))),
            consumer_config(config.upload_completed_topic()),
        );
        pools.push(tokio::spawn(relay_pool.run(signal.clone())));
    }

    let addr = format!("0.0.0.0:{}", config.worker_port());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind health listener on {}", addr))?;
    let mut health_shutdown = signal.clone();
    let health_server = tokio::spawn(async move {
        axum::serve(listener, health_router(signal))
            .with_graceful_shutdown(async move { health_shutdown.wait().await })
            .await
    });

    tracing::info!(
        addr = %addr,
        storage = %store.backend_type(),
        broker = %broker.backend_type(),
        workers = config.worker_concurrency(),
        relay = config.relay_upload_events(),
        "Worker ready and consuming"
    );

    wait_for_shutdown_signal().await;
    tracing::info!("Shutting down gracefully...");
    controller.trigger();

    for pool in pools {
        if let Err(e) = pool.await {
            tracing::error!(error = %e, "Consumer pool task failed");
        }
    }
    match health_server.await {
        Ok(Err(e)) => tracing::error!(error = %e, "Health server failed"),
        Err(e) => tracing::error!(error = %e, "Health server task failed"),
        Ok(Ok(())) => {}
    }

    drop(broker);
    shutdown_telemetry().await;
    Ok(())
}
