//! Row models and write-path records for the detection store.

use chrono::{DateTime, NaiveDateTime, Utc};
use common::camera::{MediaType, MotionType};
use common::keywords::AlertKind;
use serde::Serialize;
use sqlx::FromRow;

/// A camera row. One physical device, identified by
/// `(location, device_name)`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Camera {
    pub id: i64,
    pub location: String,
    pub device_name: String,
    pub device_type: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    pub total_detections: i64,
    pub total_alerts: i64,
}

/// A detection row: one ingested artifact with its derived description and
/// denormalized alert flags.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Detection {
    pub id: i64,
    pub filename: String,
    pub filepath: String,
    pub media_type: String,
    pub camera_id: i64,
    pub motion_type: Option<String>,
    pub processed: bool,
    pub processing_time_seconds: Option<f64>,
    pub description: Option<String>,
    pub confidence: Option<f64>,
    pub analysis_structured: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub file_timestamp: Option<NaiveDateTime>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub frame_count: Option<i64>,
    pub duration_seconds: Option<f64>,
    pub has_person: bool,
    pub has_vehicle: bool,
    pub has_package: bool,
    pub has_unusual_activity: bool,
    pub is_night_time: bool,
    pub alert_count: i64,
    pub thumbnail_path: Option<String>,
}

/// An alert catalog row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AlertType {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub priority: i64,
}

/// A detection/alert junction row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DetectionAlert {
    pub id: i64,
    pub detection_id: i64,
    pub alert_type_id: i64,
    pub confidence: Option<f64>,
    pub detected_at: DateTime<Utc>,
}

/// Everything needed to commit one artifact. The camera row is resolved
/// (created on first sight) inside the same transaction as the detection,
/// with its device type derived from `device_name`, and the boolean flags
/// are projected from `alert_kinds` at write time so flags and junction
/// rows cannot drift apart.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub filename: String,
    pub filepath: String,
    pub media_type: MediaType,
    pub location: String,
    pub device_name: String,
    pub motion_type: Option<MotionType>,
    pub processing_time_seconds: f64,
    pub description: String,
    pub confidence: f64,
    pub analysis_structured: Option<String>,
    pub file_timestamp: Option<NaiveDateTime>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub frame_count: Option<i64>,
    pub duration_seconds: Option<f64>,
    pub alert_kinds: Vec<AlertKind>,
    pub thumbnail_path: Option<String>,
}

/// Result of offering a new detection to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { detection_id: i64, camera_id: i64 },
    /// A row for this filepath already exists (lost a race to a concurrent
    /// producer); the transaction was rolled back.
    Duplicate,
}

/// Rewrite payload for an explicit reprocess of an existing detection.
#[derive(Debug, Clone)]
pub struct AnalysisRewrite {
    pub description: String,
    pub confidence: f64,
    pub analysis_structured: Option<String>,
    pub processing_time_seconds: f64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub frame_count: Option<i64>,
    pub duration_seconds: Option<f64>,
    pub alert_kinds: Vec<AlertKind>,
    pub thumbnail_path: Option<String>,
}

/// Camera counter drift found by the verification sweep.
#[derive(Debug, Clone, Serialize)]
pub struct CounterDrift {
    pub camera_id: i64,
    pub full_name: String,
    pub stored_detections: i64,
    pub actual_detections: i64,
    pub stored_alerts: i64,
    pub actual_alerts: i64,
}
