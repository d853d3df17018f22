//! One-shot bulk backfill over the camera tree.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use describer::{HttpBackend, VisionDescriber};
use detection_store::DetectionStore;
use ingest_service::{crawler, ArtifactProcessor, CrawlOptions, IngestConfig, IngestQueue};
use tracing::info;

#[derive(Parser)]
#[command(name = "backfill")]
#[command(about = "Crawl the camera tree once and ingest every artifact", long_about = None)]
struct Cli {
    /// Cap on the number of files offered (smoke tests)
    #[arg(long, env = "BACKFILL_LIMIT")]
    limit: Option<usize>,

    /// Restrict to cameras whose full name or location matches (repeatable)
    #[arg(long = "camera")]
    cameras: Vec<String>,
}

impl Cli {
    fn crawl_options(self) -> CrawlOptions {
        CrawlOptions {
            limit: self.limit,
            cameras: (!self.cameras.is_empty()).then_some(self.cameras),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = IngestConfig::from_env()?;
    telemetry::init("backfill", &config.log_level);

    let options = cli.crawl_options();

    let store = DetectionStore::connect(&config.database_url).await?;
    let backend = HttpBackend::new(config.describer_endpoint.clone());
    let describer =
        Arc::new(VisionDescriber::new(backend).with_sample_frames(config.video_sample_frames));
    let processor = Arc::new(
        ArtifactProcessor::new(store, describer, config.thumbnail_root.clone())
            .with_timeouts(config.describer_image_timeout, config.describer_video_timeout),
    );
    let queue = IngestQueue::start(processor, config.queue_capacity, config.worker_count);

    let report = crawler::crawl(&config.foscam_root, &options, &queue).await?;
    queue.shutdown(config.shutdown_grace).await;

    for failure in &report.first_failures {
        info!(failure = %failure, "backfill failure detail");
    }
    info!(
        seen = report.seen,
        processed_ok = report.processed_ok,
        skipped_known = report.skipped_known,
        skipped_unrecognized = report.skipped_unrecognized,
        failed = report.failed,
        "backfill complete"
    );
    Ok(())
}
