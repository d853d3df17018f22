//! Regenerate missing or dangling video thumbnails, then verify camera
//! counters. Safe to run while the ingest service is live; each update is
//! a single-row write.

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use common::frame_extractor::{self, thumbnail_offset};
use detection_store::DetectionStore;
use ingest_service::processor::write_thumbnail_atomic;
use ingest_service::IngestConfig;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "backfill-thumbnails")]
#[command(
    about = "Regenerate missing video thumbnails and verify camera counters",
    long_about = None
)]
struct Cli {
    /// Maximum number of video detections to scan
    #[arg(long, default_value_t = 10_000)]
    limit: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = IngestConfig::from_env()?;
    telemetry::init("backfill-thumbnails", &config.log_level);

    let store = DetectionStore::connect(&config.database_url).await?;
    let candidates = store.video_thumbnail_candidates(cli.limit).await?;
    info!(videos = candidates.len(), "scanning video detections");

    let mut regenerated = 0u64;
    let mut skipped = 0u64;
    let mut failed = 0u64;

    for detection in candidates {
        let needs_thumbnail = match &detection.thumbnail_path {
            None => true,
            // Operators may prune the thumbnail directory; regenerate
            // anything the row points at that no longer exists.
            Some(path) => !Path::new(path).exists(),
        };
        if !needs_thumbnail {
            skipped += 1;
            continue;
        }

        let video_path = Path::new(&detection.filepath).to_path_buf();
        if !video_path.exists() {
            warn!(detection_id = detection.id, path = %detection.filepath, "source video is gone");
            failed += 1;
            continue;
        }

        let extraction = tokio::task::spawn_blocking(move || {
            let probe = frame_extractor::probe_video(&video_path)?;
            frame_extractor::extract_frame_jpeg_at(
                &video_path,
                thumbnail_offset(probe.duration_seconds),
            )
        })
        .await?;

        match extraction {
            Ok(bytes) => {
                let written = write_thumbnail_atomic(
                    &config.thumbnail_root,
                    Path::new(&detection.filepath),
                    &bytes,
                )
                .await?;
                store
                    .update_thumbnail_path(detection.id, Some(&written.to_string_lossy()))
                    .await?;
                info!(detection_id = detection.id, thumbnail = %written.display(), "thumbnail regenerated");
                regenerated += 1;
            }
            Err(e) => {
                warn!(detection_id = detection.id, "thumbnail extraction failed: {e:#}");
                failed += 1;
            }
        }
    }

    let drift = store.recount_camera_counters().await?;

    info!(
        regenerated,
        skipped,
        failed,
        counter_drift = drift.len(),
        "thumbnail backfill complete"
    );
    Ok(())
}
