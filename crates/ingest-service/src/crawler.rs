//! Bulk backfill crawler: walks the camera tree once and streams every
//! discovered file through the processor.
//!
//! Traversal is deterministic: cameras ascend by `(location, device_name)`
//! and files within a camera ascend by filename timestamp, with
//! unparseable-timestamp files last, ordered by name. Paths are offered
//! one at a time and the crawler blocks on queue admission, so it can
//! never outrun the processor.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use common::camera::{is_camera_device_dir, ArtifactPath, DirKind};
use serde::Serialize;
use tracing::{info, warn};

use crate::processor::Outcome;
use crate::queue::{IngestQueue, Job, JobSource};

/// How many failure details a report keeps.
const MAX_REPORTED_FAILURES: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Cap on the number of paths offered (smoke tests).
    pub limit: Option<usize>,
    /// Restrict to `snap` and/or `record` subtrees.
    pub kinds: Option<Vec<DirKind>>,
    /// Restrict to cameras whose full name or location matches an entry.
    pub cameras: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub seen: u64,
    pub skipped_known: u64,
    pub skipped_unrecognized: u64,
    pub processed_ok: u64,
    pub failed: u64,
    pub first_failures: Vec<String>,
}

impl CrawlReport {
    fn tally(&mut self, path: &Path, outcome: &Outcome) {
        match outcome {
            Outcome::Ingested { .. } => self.processed_ok += 1,
            Outcome::SkippedKnown => self.skipped_known += 1,
            Outcome::SkippedUnrecognized => self.skipped_unrecognized += 1,
            Outcome::IngestedUnanalyzable { .. } => {
                self.record_failure(path, "describer failed, recorded unanalyzable");
            }
            Outcome::Dropped(reason) | Outcome::Failed(reason) => {
                self.record_failure(path, reason);
            }
            // Readiness requeues only apply to watcher-sourced jobs.
            Outcome::NotReady => self.record_failure(path, "file not ready"),
        }
    }

    fn record_failure(&mut self, path: &Path, reason: &str) {
        self.failed += 1;
        if self.first_failures.len() < MAX_REPORTED_FAILURES {
            self.first_failures
                .push(format!("{}: {reason}", path.display()));
        }
    }
}

/// One recognized camera device directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDir {
    pub location: String,
    pub device_name: String,
    pub path: PathBuf,
}

impl CameraDir {
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.location, self.device_name)
    }
}

/// Discover camera device directories two levels under `root`, sorted by
/// `(location, device_name)`. Unknown directories are ignored.
pub fn discover_cameras(root: &Path) -> Result<Vec<CameraDir>> {
    let mut cameras = Vec::new();

    let locations = std::fs::read_dir(root)
        .with_context(|| format!("camera root not readable: {}", root.display()))?;
    for location_entry in locations.flatten() {
        let location_path = location_entry.path();
        if !location_path.is_dir() {
            continue;
        }
        let Some(location) = location_entry.file_name().to_str().map(String::from) else {
            continue;
        };

        let Ok(devices) = std::fs::read_dir(&location_path) else {
            warn!(location = %location, "camera location not readable");
            continue;
        };
        for device_entry in devices.flatten() {
            let device_path = device_entry.path();
            let Some(device_name) = device_entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if device_path.is_dir() && is_camera_device_dir(&device_name) {
                cameras.push(CameraDir {
                    location: location.clone(),
                    device_name,
                    path: device_path,
                });
            }
        }
    }

    cameras.sort_by(|a, b| {
        (a.location.as_str(), a.device_name.as_str())
            .cmp(&(b.location.as_str(), b.device_name.as_str()))
    });
    Ok(cameras)
}

/// Files under a camera's `snap/` and `record/` directories in
/// deterministic processing order.
pub fn media_files(camera: &CameraDir, kinds: &[DirKind]) -> Vec<PathBuf> {
    let mut entries: Vec<(bool, Option<NaiveDateTime>, String, PathBuf)> = Vec::new();

    for kind in kinds {
        let dir = camera.path.join(kind.as_str());
        let Ok(read_dir) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let file_timestamp = ArtifactPath::parse(&path).and_then(|a| a.file_timestamp);
            entries.push((file_timestamp.is_none(), file_timestamp, name, path));
        }
    }

    entries.sort_by(|a, b| (&a.0, &a.1, &a.2).cmp(&(&b.0, &b.1, &b.2)));
    entries.into_iter().map(|(_, _, _, path)| path).collect()
}

/// Walk the tree and stream every file into the processor, tallying one
/// outcome per offered path.
pub async fn crawl(
    root: &Path,
    options: &CrawlOptions,
    queue: &IngestQueue,
) -> Result<CrawlReport> {
    info!(root = %root.display(), "starting camera tree crawl");

    let kinds = options
        .kinds
        .clone()
        .unwrap_or_else(|| vec![DirKind::Snap, DirKind::Record]);

    let cameras: Vec<CameraDir> = discover_cameras(root)?
        .into_iter()
        .filter(|camera| match &options.cameras {
            Some(wanted) => wanted
                .iter()
                .any(|w| *w == camera.full_name() || *w == camera.location),
            None => true,
        })
        .collect();
    info!(cameras = cameras.len(), "discovered camera devices");

    let mut report = CrawlReport::default();
    let mut replies = Vec::new();

    'cameras: for camera in &cameras {
        let files = media_files(camera, &kinds);
        info!(camera = %camera.full_name(), files = files.len(), "crawling camera");

        for path in files {
            if let Some(limit) = options.limit {
                if replies.len() >= limit {
                    info!(limit, "crawl limit reached");
                    break 'cameras;
                }
            }

            let (job, reply) = Job::with_reply(path.clone(), JobSource::Crawler);
            queue.enqueue(job).await?;
            replies.push((path, reply));
        }
    }

    report.seen = replies.len() as u64;
    for (path, reply) in replies {
        match reply.await {
            Ok(outcome) => report.tally(&path, &outcome),
            Err(_) => report.record_failure(&path, "processor dropped the job"),
        }
    }

    info!(
        seen = report.seen,
        processed_ok = report.processed_ok,
        skipped_known = report.skipped_known,
        skipped_unrecognized = report.skipped_unrecognized,
        failed = report.failed,
        "crawl complete"
    );
    Ok(report)
}
