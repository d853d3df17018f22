use std::sync::Arc;

use anyhow::Result;
use describer::{HttpBackend, VisionDescriber};
use detection_store::DetectionStore;
use ingest_service::{crawler, watcher, ArtifactProcessor, CrawlOptions, IngestConfig, IngestQueue};
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = IngestConfig::from_env()?;
    telemetry::init("ingest-service", &config.log_level);

    info!(
        root = %config.foscam_root.display(),
        database = %config.database_url,
        queue_capacity = config.queue_capacity,
        worker_count = config.worker_count,
        "starting ingest service"
    );

    let store = DetectionStore::connect(&config.database_url).await?;

    let backend = HttpBackend::new(config.describer_endpoint.clone());
    let describer =
        Arc::new(VisionDescriber::new(backend).with_sample_frames(config.video_sample_frames));

    let processor = Arc::new(
        ArtifactProcessor::new(store, describer, config.thumbnail_root.clone())
            .with_timeouts(config.describer_image_timeout, config.describer_video_timeout),
    );
    let queue = IngestQueue::start(
        Arc::clone(&processor),
        config.queue_capacity,
        config.worker_count,
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let watcher_handle = tokio::spawn(watcher::watch(
        config.foscam_root.clone(),
        queue.sender(),
        config.watcher_rediscovery,
        cancel_rx,
    ));

    if config.initial_sweep {
        info!("sweeping existing files before live watch");
        match crawler::crawl(&config.foscam_root, &CrawlOptions::default(), &queue).await {
            Ok(report) => info!(
                seen = report.seen,
                processed_ok = report.processed_ok,
                skipped_known = report.skipped_known,
                failed = report.failed,
                "initial sweep complete"
            ),
            Err(e) => warn!("initial sweep failed: {e:#}"),
        }
    }

    shutdown_signal().await;
    info!("shutdown signal received, draining");

    let _ = cancel_tx.send(true);
    if let Err(e) = watcher_handle.await {
        warn!("watcher task failed: {e}");
    }
    queue.shutdown(config.shutdown_grace).await;

    info!("ingest service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C signal"),
        _ = terminate => info!("received terminate signal"),
    }
}
