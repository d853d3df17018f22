//! Deterministic stubs for tests and demos.
//!
//! [`StubBackend`] answers every aspect pass with a fixed, configured
//! aspect map; [`StubDescriber`] short-circuits the whole describer so
//! pipeline tests run without ffmpeg or a model. Both can be scripted to
//! fail transiently a fixed number of times before succeeding.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::describe::{
    AspectMap, ImageAnalysis, TimelineEvent, VideoAnalysis, ASPECT_CHANGES, ASPECT_GENERAL,
    ASPECT_SCENE_SUMMARY, ASPECT_SECURITY, ASPECT_TIMELINE,
};
use common::keywords::{classify_event_type, extract_changes};

use crate::backend::VisionBackend;
use crate::prompts::AspectPrompt;
use crate::{synthesis, DescribeError, Describer};

/// JPEG SOI marker plus a JFIF tag, enough to look like a thumbnail.
const FAKE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// A [`VisionBackend`] that echoes a configured aspect map.
pub struct StubBackend {
    aspects: AspectMap,
    fail_transient: AtomicUsize,
}

impl StubBackend {
    pub fn new(aspects: AspectMap) -> Self {
        Self {
            aspects,
            fail_transient: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` calls with a transient error.
    pub fn with_transient_failures(self, count: usize) -> Self {
        self.fail_transient.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl VisionBackend for StubBackend {
    async fn aspects(
        &self,
        _frame_jpeg: &[u8],
        _prompts: &[AspectPrompt],
    ) -> Result<AspectMap, DescribeError> {
        if take_failure(&self.fail_transient) {
            return Err(DescribeError::Transient("scripted backend failure".into()));
        }
        Ok(self.aspects.clone())
    }
}

/// A [`Describer`] that synthesizes real captions from a configured aspect
/// map without touching the filesystem or a model.
pub struct StubDescriber {
    aspects: AspectMap,
    fail_transient: AtomicUsize,
    fail_permanent: AtomicUsize,
    video_duration: f64,
}

impl StubDescriber {
    pub fn new(aspects: AspectMap) -> Self {
        Self {
            aspects,
            fail_transient: AtomicUsize::new(0),
            fail_permanent: AtomicUsize::new(0),
            video_duration: 12.0,
        }
    }

    /// Convenience constructor from `(aspect, text)` pairs.
    pub fn with_aspects(entries: &[(&str, &str)]) -> Self {
        Self::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Fail the next `count` describe calls with a transient error.
    pub fn with_transient_failures(self, count: usize) -> Self {
        self.fail_transient.store(count, Ordering::SeqCst);
        self
    }

    /// Fail the next `count` describe calls with a permanent error.
    pub fn with_permanent_failures(self, count: usize) -> Self {
        self.fail_permanent.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_video_duration(mut self, seconds: f64) -> Self {
        self.video_duration = seconds;
        self
    }

    fn check_scripted_failures(&self) -> Result<(), DescribeError> {
        if take_failure(&self.fail_transient) {
            return Err(DescribeError::Transient("scripted transient failure".into()));
        }
        if take_failure(&self.fail_permanent) {
            return Err(DescribeError::Permanent("scripted permanent failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Describer for StubDescriber {
    async fn describe_image(&self, _bytes: &[u8]) -> Result<ImageAnalysis, DescribeError> {
        self.check_scripted_failures()?;

        let (caption, _alerts) = synthesis::compose_image_caption(&self.aspects);
        let confidence = synthesis::image_confidence(&caption, &self.aspects);
        Ok(ImageAnalysis {
            aspects: self.aspects.clone(),
            caption,
            confidence,
            width: 1280,
            height: 720,
        })
    }

    async fn describe_video(&self, _path: &Path) -> Result<VideoAnalysis, DescribeError> {
        self.check_scripted_failures()?;

        let alerts = synthesis::frame_alerts(&self.aspects);
        let description = [ASPECT_TIMELINE, ASPECT_SCENE_SUMMARY, ASPECT_GENERAL, ASPECT_SECURITY]
            .iter()
            .find_map(|name| self.aspects.get(*name).filter(|t| !t.is_empty()))
            .cloned()
            .unwrap_or_default();

        let event = TimelineEvent {
            timestamp_s: 0.0,
            time_formatted: synthesis::format_offset(0.0),
            event_type: classify_event_type(&description),
            description,
            changes: extract_changes(
                self.aspects
                    .get(ASPECT_CHANGES)
                    .map(String::as_str)
                    .unwrap_or_default(),
            ),
            alerts: alerts.iter().map(|a| a.name().to_string()).collect(),
            confidence: synthesis::timeline_confidence(&self.aspects),
        };

        let timeline = vec![event];
        let caption = synthesis::compose_video_caption(&timeline, self.video_duration, &alerts);
        let events = timeline
            .iter()
            .map(|e| format!("{}: {}", e.time_formatted, e.description))
            .collect();
        let confidence = timeline[0].confidence;

        Ok(VideoAnalysis {
            timeline,
            events,
            caption,
            confidence,
            width: 1280,
            height: 720,
            frame_count: (self.video_duration * 30.0) as i64,
            duration_seconds: self.video_duration,
            thumbnail: Some(FAKE_JPEG.to_vec()),
        })
    }
}
