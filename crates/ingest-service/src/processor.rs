//! The artifact processor: one entry point that takes a path through
//! parse → dedupe → readiness → describe → derive → commit.
//!
//! Each offered path terminates in exactly one structured event
//! (`ingested`, `skipped_unrecognized`, `skipped_known`, `failed_*`), and
//! failures are isolated per file: a bad artifact never takes down a
//! producer.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use common::camera::{ArtifactPath, MediaType};
use common::describe::{ImageAnalysis, VideoAnalysis};
use common::keywords::derive_alerts;
use describer::{DescribeError, Describer};
use detection_store::{AnalysisRewrite, DetectionStore, InsertOutcome, NewDetection};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::queue::JobSource;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Terminal result of processing one offered path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ingested {
        detection_id: i64,
        camera_id: i64,
        alert_count: i64,
    },
    /// The describer failed permanently; a "seen but unanalyzable" row was
    /// committed so dedupe holds on the next sweep.
    IngestedUnanalyzable { detection_id: i64 },
    SkippedUnrecognized,
    SkippedKnown,
    /// Watcher-sourced file never stabilized; the worker requeues once.
    NotReady,
    Dropped(String),
    Failed(String),
}

enum Readiness {
    Ready,
    TimedOut,
    Vanished,
}

enum Analysis {
    Image(ImageAnalysis),
    Video(VideoAnalysis),
}

/// Why a describe attempt did not produce an analysis.
enum DescribeFate {
    /// Commit a "seen but unanalyzable" detection.
    Unanalyzable(String),
    /// Drop without a record (the file disappeared under us).
    Dropped(String),
}

pub struct ArtifactProcessor {
    store: DetectionStore,
    describer: Arc<dyn Describer>,
    thumbnail_root: PathBuf,
    image_timeout: Duration,
    video_timeout: Duration,
    readiness_poll: Duration,
    readiness_cap: Duration,
}

impl ArtifactProcessor {
    pub fn new(
        store: DetectionStore,
        describer: Arc<dyn Describer>,
        thumbnail_root: PathBuf,
    ) -> Self {
        Self {
            store,
            describer,
            thumbnail_root,
            image_timeout: Duration::from_secs(60),
            video_timeout: Duration::from_secs(180),
            readiness_poll: Duration::from_millis(250),
            readiness_cap: Duration::from_secs(10),
        }
    }

    pub fn with_timeouts(mut self, image: Duration, video: Duration) -> Self {
        self.image_timeout = image;
        self.video_timeout = video;
        self
    }

    pub fn with_readiness(mut self, poll: Duration, cap: Duration) -> Self {
        self.readiness_poll = poll;
        self.readiness_cap = cap;
        self
    }

    /// Process one offered path. `attempt` counts readiness requeues.
    pub async fn process(&self, path: &Path, source: JobSource, attempt: u32) -> Outcome {
        let started = Instant::now();
        let filepath = path.to_string_lossy().to_string();

        let Some(artifact) = ArtifactPath::parse(path) else {
            info!(path = %filepath, "skipped_unrecognized");
            return Outcome::SkippedUnrecognized;
        };

        match self.store.exists_by_filepath(&filepath).await {
            Ok(true) => {
                debug!(path = %filepath, "skipped_known");
                return Outcome::SkippedKnown;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(path = %filepath, error = %format!("{e:#}"), "failed_store");
                return Outcome::Failed(format!("store lookup failed: {e:#}"));
            }
        }

        // The watcher can observe files that are still being uploaded;
        // wait for two stable size samples before reading.
        if source == JobSource::Watcher {
            match self.wait_until_stable(path).await {
                Readiness::Ready => {}
                Readiness::Vanished => {
                    warn!(path = %filepath, "dropped: file vanished before processing");
                    return Outcome::Dropped("file vanished before processing".to_string());
                }
                Readiness::TimedOut if attempt == 0 => {
                    debug!(path = %filepath, "file not stable yet, requeueing once");
                    return Outcome::NotReady;
                }
                Readiness::TimedOut => {
                    warn!(path = %filepath, "dropped: file never stabilized");
                    return Outcome::Dropped("file never stabilized".to_string());
                }
            }
        }

        let analysis = match self.describe_with_retry(path, artifact.media_type).await {
            Ok(analysis) => analysis,
            Err(DescribeFate::Unanalyzable(reason)) => {
                return self.commit_unanalyzable(&filepath, &artifact, &reason, started).await;
            }
            Err(DescribeFate::Dropped(reason)) => {
                warn!(path = %filepath, reason = %reason, "dropped");
                return Outcome::Dropped(reason);
            }
        };

        let new = self.build_record(&filepath, &artifact, &analysis, started).await;
        let alert_count = new.alert_kinds.len() as i64;
        let alert_kinds: Vec<&str> = new.alert_kinds.iter().map(|k| k.name()).collect();

        match self.store.insert_detection(&new).await {
            Ok(InsertOutcome::Inserted {
                detection_id,
                camera_id,
            }) => {
                info!(
                    detection_id,
                    camera_id,
                    path = %filepath,
                    alert_kinds = ?alert_kinds,
                    processing_time = started.elapsed().as_secs_f64(),
                    "ingested"
                );
                Outcome::Ingested {
                    detection_id,
                    camera_id,
                    alert_count,
                }
            }
            Ok(InsertOutcome::Duplicate) => {
                // A concurrent producer committed the same path first.
                debug!(path = %filepath, "skipped_known (insert race)");
                Outcome::SkippedKnown
            }
            Err(e) => {
                warn!(path = %filepath, error = %format!("{e:#}"), "failed_commit");
                Outcome::Failed(format!("commit failed: {e:#}"))
            }
        }
    }

    /// Re-describe an already ingested detection, rewriting its
    /// description, flags and alert rows in place.
    pub async fn reprocess(&self, detection_id: i64) -> Result<()> {
        let detection = self
            .store
            .get_detection(detection_id)
            .await?
            .with_context(|| format!("detection {detection_id} does not exist"))?;

        let path = PathBuf::from(&detection.filepath);
        let artifact = ArtifactPath::parse(&path)
            .with_context(|| format!("stored filepath no longer parses: {}", detection.filepath))?;

        let started = Instant::now();
        let analysis = match self.describe_with_retry(&path, artifact.media_type).await {
            Ok(analysis) => analysis,
            Err(DescribeFate::Unanalyzable(reason)) | Err(DescribeFate::Dropped(reason)) => {
                anyhow::bail!("reprocess describe failed: {reason}");
            }
        };

        let record = self.build_record(&detection.filepath, &artifact, &analysis, started).await;
        let rewrite = AnalysisRewrite {
            description: record.description,
            confidence: record.confidence,
            analysis_structured: record.analysis_structured,
            processing_time_seconds: record.processing_time_seconds,
            width: record.width,
            height: record.height,
            frame_count: record.frame_count,
            duration_seconds: record.duration_seconds,
            alert_kinds: record.alert_kinds,
            thumbnail_path: record.thumbnail_path,
        };
        self.store.rewrite_detection_analysis(detection_id, &rewrite).await?;

        info!(detection_id, path = %detection.filepath, "reprocessed");
        Ok(())
    }

    async fn describe_with_retry(
        &self,
        path: &Path,
        media_type: MediaType,
    ) -> Result<Analysis, DescribeFate> {
        let image_bytes = match media_type {
            MediaType::Image => match tokio::fs::read(path).await {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(DescribeFate::Dropped("file vanished before read".to_string()));
                }
                Err(e) => {
                    return Err(DescribeFate::Unanalyzable(format!("read failed: {e}")));
                }
            },
            MediaType::Video => None,
        };

        let deadline = match media_type {
            MediaType::Image => self.image_timeout,
            MediaType::Video => self.video_timeout,
        };

        let mut attempt = 0;
        loop {
            let call = async {
                match media_type {
                    MediaType::Image => self
                        .describer
                        .describe_image(image_bytes.as_deref().unwrap_or_default())
                        .await
                        .map(Analysis::Image),
                    MediaType::Video => {
                        self.describer.describe_video(path).await.map(Analysis::Video)
                    }
                }
            };

            let failure = match timeout(deadline, call).await {
                Ok(Ok(analysis)) => return Ok(analysis),
                Ok(Err(e)) => e,
                Err(_) => DescribeError::Transient("describe call timed out".to_string()),
            };

            if failure.is_transient() && attempt == 0 {
                warn!(path = %path.display(), "transient describe failure, retrying: {failure}");
                attempt += 1;
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }

            return Err(DescribeFate::Unanalyzable(failure.to_string()));
        }
    }

    async fn build_record(
        &self,
        filepath: &str,
        artifact: &ArtifactPath,
        analysis: &Analysis,
        started: Instant,
    ) -> NewDetection {
        let mut record = empty_record(filepath, artifact);
        record.processing_time_seconds = started.elapsed().as_secs_f64();

        match analysis {
            Analysis::Image(image) => {
                record.description = image.caption.clone();
                record.confidence = image.confidence;
                record.analysis_structured = serde_json::to_string(&image.aspects).ok();
                record.width = Some(image.width as i64);
                record.height = Some(image.height as i64);
                record.alert_kinds = derive_alerts(&image.caption);
            }
            Analysis::Video(video) => {
                record.description = video.caption.clone();
                record.confidence = video.confidence;
                record.analysis_structured = serde_json::to_string(&video.timeline).ok();
                record.width = Some(video.width as i64);
                record.height = Some(video.height as i64);
                record.frame_count = Some(video.frame_count);
                record.duration_seconds = Some(video.duration_seconds);
                record.alert_kinds = derive_alerts(&video.caption);

                if let Some(bytes) = &video.thumbnail {
                    match write_thumbnail_atomic(&self.thumbnail_root, Path::new(filepath), bytes)
                        .await
                    {
                        Ok(thumbnail_path) => {
                            record.thumbnail_path =
                                Some(thumbnail_path.to_string_lossy().to_string());
                        }
                        Err(e) => {
                            warn!(path = %filepath, "thumbnail write failed: {e:#}");
                        }
                    }
                }
            }
        }

        record
    }

    async fn commit_unanalyzable(
        &self,
        filepath: &str,
        artifact: &ArtifactPath,
        reason: &str,
        started: Instant,
    ) -> Outcome {
        let mut record = empty_record(filepath, artifact);
        record.processing_time_seconds = started.elapsed().as_secs_f64();

        match self.store.insert_detection(&record).await {
            Ok(InsertOutcome::Inserted { detection_id, .. }) => {
                warn!(
                    detection_id,
                    path = %filepath,
                    reason,
                    "failed_describe: recorded unanalyzable detection"
                );
                Outcome::IngestedUnanalyzable { detection_id }
            }
            Ok(InsertOutcome::Duplicate) => Outcome::SkippedKnown,
            Err(e) => {
                warn!(path = %filepath, error = %format!("{e:#}"), "failed_commit");
                Outcome::Failed(format!("commit failed: {e:#}"))
            }
        }
    }

    /// Poll the file size until two samples one poll interval apart agree
    /// and are non-zero, bounded by the readiness cap.
    async fn wait_until_stable(&self, path: &Path) -> Readiness {
        let deadline = Instant::now() + self.readiness_cap;
        let mut last_size: Option<u64> = None;

        loop {
            let size = match tokio::fs::metadata(path).await {
                Ok(metadata) => metadata.len(),
                Err(e) if e.kind() == ErrorKind::NotFound => return Readiness::Vanished,
                Err(_) => 0,
            };

            if size > 0 && last_size == Some(size) {
                return Readiness::Ready;
            }
            last_size = Some(size);

            if Instant::now() + self.readiness_poll > deadline {
                return Readiness::TimedOut;
            }
            tokio::time::sleep(self.readiness_poll).await;
        }
    }
}

fn empty_record(filepath: &str, artifact: &ArtifactPath) -> NewDetection {
    NewDetection {
        filename: artifact.filename.clone(),
        filepath: filepath.to_string(),
        media_type: artifact.media_type,
        location: artifact.location.clone(),
        device_name: artifact.device_name.clone(),
        motion_type: Some(artifact.motion_type),
        processing_time_seconds: 0.0,
        description: String::new(),
        confidence: 0.0,
        analysis_structured: None,
        file_timestamp: artifact.file_timestamp,
        width: None,
        height: None,
        frame_count: None,
        duration_seconds: None,
        alert_kinds: Vec::new(),
        thumbnail_path: None,
    }
}

/// Write thumbnail bytes as `<root>/<video stem>.jpg` via a temp file and
/// rename, so readers never observe a partial thumbnail.
pub async fn write_thumbnail_atomic(
    root: &Path,
    video_path: &Path,
    bytes: &[u8],
) -> Result<PathBuf> {
    let stem = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("video path has no stem")?;

    tokio::fs::create_dir_all(root)
        .await
        .context("failed to create thumbnail directory")?;

    let final_path = root.join(format!("{stem}.jpg"));
    let tmp_path = root.join(format!(".{stem}.jpg.tmp"));

    tokio::fs::write(&tmp_path, bytes)
        .await
        .context("failed to write thumbnail")?;
    tokio::fs::rename(&tmp_path, &final_path)
        .await
        .context("failed to move thumbnail into place")?;

    Ok(final_path)
}
