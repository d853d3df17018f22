//! Production describer: frame sampling, timeline synthesis, thumbnails.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use common::describe::{
    AspectMap, ImageAnalysis, TimelineEvent, VideoAnalysis, ASPECT_CHANGES, ASPECT_SCENE_SUMMARY,
    ASPECT_TIMELINE,
};
use common::frame_extractor::{self, VideoProbe};
use common::keywords::{classify_event_type, extract_changes, AlertKind, NOTABLE_EVENT_TYPES};
use image::GenericImageView;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::VisionBackend;
use crate::{prompts, synthesis, DescribeError, Describer};

/// Number of frames sampled per clip by default.
pub const DEFAULT_SAMPLE_FRAMES: usize = 6;

/// The production [`Describer`]: runs aspect passes against a
/// [`VisionBackend`] and synthesizes the composite captions.
///
/// One instance is owned by the process for the model's lifetime. The
/// internal serializer mutex guarantees at most one in-flight model call
/// regardless of how many producers are active, which keeps GPU memory
/// usage predictable.
pub struct VisionDescriber<B> {
    backend: B,
    serializer: Mutex<()>,
    sample_frames: usize,
}

impl<B: VisionBackend> VisionDescriber<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            serializer: Mutex::new(()),
            sample_frames: DEFAULT_SAMPLE_FRAMES,
        }
    }

    pub fn with_sample_frames(mut self, sample_frames: usize) -> Self {
        self.sample_frames = sample_frames.max(1);
        self
    }

    async fn probe(&self, path: &Path) -> Result<VideoProbe, DescribeError> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || frame_extractor::probe_video(&owned))
            .await
            .map_err(|e| DescribeError::Permanent(format!("probe task failed: {e}")))?
            .map_err(|e| DescribeError::Permanent(format!("failed to probe video: {e}")))
    }

    async fn extract_frame(&self, path: PathBuf, offset: f64) -> anyhow::Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || frame_extractor::extract_frame_jpeg_at(&path, offset))
            .await
            .map_err(|e| anyhow::anyhow!("extraction task failed: {e}"))?
    }
}

#[async_trait]
impl<B: VisionBackend> Describer for VisionDescriber<B> {
    async fn describe_image(&self, bytes: &[u8]) -> Result<ImageAnalysis, DescribeError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| DescribeError::Permanent(format!("failed to decode image: {e}")))?;
        let (width, height) = (decoded.width(), decoded.height());

        let _serial = self.serializer.lock().await;
        let aspects = self
            .backend
            .aspects(bytes, &prompts::analysis_prompts())
            .await?;

        let (caption, _alerts) = synthesis::compose_image_caption(&aspects);
        let confidence = synthesis::image_confidence(&caption, &aspects);

        Ok(ImageAnalysis {
            aspects,
            caption,
            confidence,
            width,
            height,
        })
    }

    async fn describe_video(&self, path: &Path) -> Result<VideoAnalysis, DescribeError> {
        let probe = self.probe(path).await?;
        debug!(
            video = %path.display(),
            duration = probe.duration_seconds,
            frames = probe.frame_count,
            "describing video"
        );

        let _serial = self.serializer.lock().await;

        let samples = self.sample_frames;
        let interval = probe.duration_seconds / (samples as f64 + 1.0);

        let mut timeline: Vec<TimelineEvent> = Vec::new();
        let mut all_alerts: Vec<AlertKind> = Vec::new();
        let mut previous_scene = String::new();
        let mut first_frame = true;

        for i in 1..=samples {
            let offset = interval * i as f64;
            let frame = match self.extract_frame(path.to_path_buf(), offset).await {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(video = %path.display(), offset, "frame extraction failed: {e}");
                    continue;
                }
            };

            let frame_prompts = prompts::timeline_prompts(first_frame, &previous_scene);
            let aspects = self.backend.aspects(&frame, &frame_prompts).await?;

            let alerts = synthesis::frame_alerts(&aspects);
            let description = aspect(&aspects, ASPECT_TIMELINE);
            let changes = extract_changes(&aspect(&aspects, ASPECT_CHANGES));
            let event_type = classify_event_type(&description);
            let confidence = synthesis::timeline_confidence(&aspects);

            if is_significant(first_frame, &alerts, &changes, &event_type, confidence) {
                for kind in &alerts {
                    if !all_alerts.contains(kind) {
                        all_alerts.push(*kind);
                    }
                }
                previous_scene = aspect(&aspects, ASPECT_SCENE_SUMMARY);
                timeline.push(TimelineEvent {
                    timestamp_s: offset,
                    time_formatted: synthesis::format_offset(offset),
                    event_type,
                    description,
                    changes,
                    alerts: alerts.iter().map(|a| a.name().to_string()).collect(),
                    confidence,
                });
            }
            first_frame = false;
        }

        all_alerts.sort();
        let caption =
            synthesis::compose_video_caption(&timeline, probe.duration_seconds, &all_alerts);
        let confidence = if timeline.is_empty() {
            0.0
        } else {
            timeline.iter().map(|e| e.confidence).sum::<f64>() / timeline.len() as f64
        };

        let thumbnail = match self
            .extract_frame(
                path.to_path_buf(),
                frame_extractor::thumbnail_offset(probe.duration_seconds),
            )
            .await
        {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(video = %path.display(), "thumbnail extraction failed: {e}");
                None
            }
        };

        let events = timeline
            .iter()
            .map(|event| format!("{}: {}", event.time_formatted, event.description))
            .collect();

        Ok(VideoAnalysis {
            timeline,
            events,
            caption,
            confidence,
            width: probe.width,
            height: probe.height,
            frame_count: probe.frame_count,
            duration_seconds: probe.duration_seconds,
            thumbnail,
        })
    }
}

/// Whether a sampled frame is worth a timeline entry: the opening frame
/// always is, as is anything with an alert, an extracted change, a notable
/// event type, or a confident change description.
fn is_significant(
    first_frame: bool,
    alerts: &[AlertKind],
    changes: &[String],
    event_type: &str,
    confidence: f64,
) -> bool {
    first_frame
        || !alerts.is_empty()
        || !changes.is_empty()
        || NOTABLE_EVENT_TYPES.contains(&event_type)
        || confidence > 0.7
}

fn aspect(aspects: &AspectMap, name: &str) -> String {
    aspects.get(name).cloned().unwrap_or_default()
}
