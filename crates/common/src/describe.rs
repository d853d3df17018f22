//! Result contracts for the vision describer capability.
//!
//! These types are the boundary between the artifact processor and
//! whatever produces scene descriptions. The processor only depends on
//! this contract; backends are swappable (HTTP inference sidecar in
//! production, a deterministic stub in tests).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named aspect texts produced by one analysis pass over a single frame.
pub type AspectMap = BTreeMap<String, String>;

/// Aspect names for the still-image analysis pass.
pub const ASPECT_GENERAL: &str = "general";
pub const ASPECT_SECURITY: &str = "security";
pub const ASPECT_OBJECTS: &str = "objects";
pub const ASPECT_ACTIVITIES: &str = "activities";
pub const ASPECT_ENVIRONMENT: &str = "environment";

/// Aspect names for the per-frame timeline pass over videos.
pub const ASPECT_SCENE_SUMMARY: &str = "scene_summary";
pub const ASPECT_TIMELINE: &str = "timeline_description";
pub const ASPECT_CHANGES: &str = "change_detection";

/// Analysis result for a still image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysis {
    /// Raw per-aspect texts, persisted verbatim as the structured blob.
    pub aspects: AspectMap,

    /// Synthesized composite caption
    /// (`SCENE: … | SECURITY: … | … | ALERTS: …`).
    pub caption: String,

    /// Heuristic confidence in `[0, 1]`.
    pub confidence: f64,

    pub width: u32,
    pub height: u32,
}

/// One recorded event on a video timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Offset into the clip, seconds.
    pub timestamp_s: f64,

    /// `mm:ss` rendering of the offset.
    pub time_formatted: String,

    /// Classified event type (e.g. `person_enters`, `scene_change`).
    pub event_type: String,

    /// Timeline description for this frame.
    pub description: String,

    /// Change snippets extracted from the change-detection aspect.
    pub changes: Vec<String>,

    /// Alert kind names fired by this frame.
    pub alerts: Vec<String>,

    pub confidence: f64,
}

/// Analysis result for a video clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAnalysis {
    /// Significant-change events in clip order.
    pub timeline: Vec<TimelineEvent>,

    /// Rendered `mm:ss: description` entries, one per timeline event.
    pub events: Vec<String>,

    /// Synthesized composite caption
    /// (`TIMELINE ANALYSIS … | EVENTS: … | EVENT TYPES: … | ALERTS: …`).
    pub caption: String,

    /// Mean event confidence in `[0, 1]`.
    pub confidence: f64,

    pub width: u32,
    pub height: u32,
    pub frame_count: i64,
    pub duration_seconds: f64,

    /// Representative JPEG keyframe, when extraction succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Vec<u8>>,
}
