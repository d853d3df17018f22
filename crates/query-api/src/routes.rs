//! Read-only HTTP surface over the detection store.
//!
//! Everything here is side-effect-free; the dashboard (external to this
//! workspace) renders on top of these endpoints plus the `/media` static
//! mount of the camera tree.

use std::path::{Path as FsPath, PathBuf};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use detection_store::{DetectionFilter, DetectionStore, DetectionWithCamera};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::warn;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: DetectionStore,
    pub media_root: PathBuf,
}

pub fn create_router(state: AppState) -> Router {
    let media_root = state.media_root.clone();
    Router::new()
        .route("/health", axum::routing::get(health_check))
        .route("/readyz", axum::routing::get(ready_check))
        .route("/api/detections", axum::routing::get(list_detections))
        .route("/api/detections/stats", axum::routing::get(detection_stats))
        .route("/api/detections/heatmap", axum::routing::get(heatmap_daily))
        .route(
            "/api/detections/heatmap-hourly",
            axum::routing::get(heatmap_hourly),
        )
        .route(
            "/api/detections/:detection_id/thumbnail",
            axum::routing::get(detection_thumbnail),
        )
        .route("/api/cameras", axum::routing::get(list_cameras))
        .nest_service("/media", ServeDir::new(media_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "query-api"
    }))
}

async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(state.store.pool()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "database": "connected"
            })),
        )
            .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "database": "disconnected"
            })),
        )
            .into_response(),
    }
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_per_page")]
    per_page: i64,
    start_date: Option<String>,
    end_date: Option<String>,
    camera_ids: Option<String>,
    #[serde(default)]
    only_alerts: bool,
}

/// One listing row as the dashboard consumes it.
#[derive(Debug, Serialize)]
struct DetectionItem {
    id: i64,
    timestamp: String,
    camera_id: i64,
    camera_location: String,
    camera_full_name: String,
    media_type: String,
    motion_type: Option<String>,
    description: String,
    confidence: f64,
    has_person: bool,
    has_vehicle: bool,
    has_package: bool,
    has_unusual_activity: bool,
    is_night_time: bool,
    alert_count: i64,
    /// Path under the `/media` mount, when the artifact sits inside the
    /// served camera tree.
    media_filename: Option<String>,
    has_thumbnail: bool,
}

impl DetectionItem {
    fn from_row(row: DetectionWithCamera, media_root: &FsPath) -> Self {
        let timestamp = row
            .file_timestamp
            .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|| row.timestamp.to_rfc3339());

        let media_filename = FsPath::new(&row.filepath)
            .strip_prefix(media_root)
            .ok()
            .map(|rel| rel.to_string_lossy().to_string());

        Self {
            id: row.id,
            timestamp,
            camera_id: row.camera_id,
            camera_location: row.camera_location,
            camera_full_name: row.camera_full_name,
            media_type: row.media_type,
            motion_type: row.motion_type,
            description: row
                .description
                .unwrap_or_else(|| "No description".to_string()),
            confidence: row.confidence.unwrap_or(0.0),
            has_person: row.has_person,
            has_vehicle: row.has_vehicle,
            has_package: row.has_package,
            has_unusual_activity: row.has_unusual_activity,
            is_night_time: row.is_night_time,
            alert_count: row.alert_count,
            media_filename,
            has_thumbnail: row.thumbnail_path.is_some(),
        }
    }
}

async fn list_detections(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = DetectionFilter {
        start: parse_window_bound(params.start_date.as_deref(), "start_date")?,
        end: parse_window_bound(params.end_date.as_deref(), "end_date")?,
        camera_ids: parse_camera_ids(params.camera_ids.as_deref())?,
        only_alerts: params.only_alerts,
    };

    let page = state
        .store
        .list_detections(params.page, params.per_page, &filter)
        .await?;

    let items: Vec<DetectionItem> = page
        .items
        .into_iter()
        .map(|row| DetectionItem::from_row(row, &state.media_root))
        .collect();

    Ok(Json(json!({
        "detections": items,
        "pagination": page.pagination,
    })))
}

#[derive(Debug, Deserialize)]
struct StatsParams {
    camera_ids: Option<String>,
}

async fn detection_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let camera_ids = parse_camera_ids(params.camera_ids.as_deref())?;
    let stats = state.store.stats(camera_ids.as_deref()).await?;
    Ok(Json(stats))
}

fn default_days() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
struct DailyHeatmapParams {
    #[serde(default = "default_days")]
    days: i64,
    #[serde(default)]
    per_camera: bool,
    camera_ids: Option<String>,
}

async fn heatmap_daily(
    State(state): State<AppState>,
    Query(params): Query<DailyHeatmapParams>,
) -> Result<impl IntoResponse, ApiError> {
    let camera_ids = parse_camera_ids(params.camera_ids.as_deref())?;
    let buckets = state
        .store
        .heatmap_daily(params.days, params.per_camera, camera_ids.as_deref())
        .await?;
    Ok(Json(json!({ "heatmap_data": buckets })))
}

#[derive(Debug, Deserialize)]
struct HourlyHeatmapParams {
    #[serde(default)]
    per_camera: bool,
    camera_ids: Option<String>,
}

async fn heatmap_hourly(
    State(state): State<AppState>,
    Query(params): Query<HourlyHeatmapParams>,
) -> Result<impl IntoResponse, ApiError> {
    let camera_ids = parse_camera_ids(params.camera_ids.as_deref())?;
    let buckets = state
        .store
        .heatmap_hourly(params.per_camera, camera_ids.as_deref())
        .await?;
    Ok(Json(json!({ "heatmap_data": buckets })))
}

async fn list_cameras(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let cameras = state.store.list_cameras().await?;
    Ok(Json(json!({ "cameras": cameras })))
}

async fn detection_thumbnail(
    State(state): State<AppState>,
    Path(detection_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let detection = state
        .store
        .get_detection(detection_id)
        .await?
        .ok_or_else(|| ApiError::not_found("detection does not exist"))?;

    let thumbnail_path = detection
        .thumbnail_path
        .ok_or_else(|| ApiError::not_found("detection has no thumbnail"))?;

    match tokio::fs::read(&thumbnail_path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes)),
        Err(e) => {
            // Operators may prune the thumbnail directory out from under
            // the store; report the dangling reference on read.
            warn!(
                detection_id,
                thumbnail = %thumbnail_path,
                "thumbnail file unreadable: {e}"
            );
            Err(ApiError::not_found("thumbnail file is gone"))
        }
    }
}

/// Accept ISO timestamps (`2025-07-12T21:38:37`) and bare dates
/// (`2025-07-12`, meaning local midnight).
fn parse_window_bound(
    value: Option<&str>,
    field: &str,
) -> Result<Option<NaiveDateTime>, ApiError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if let Ok(ts) = value.parse::<NaiveDateTime>() {
        return Ok(Some(ts));
    }
    if let Ok(date) = value.parse::<NaiveDate>() {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(midnight));
        }
    }
    Err(ApiError::bad_request(format!("invalid {field} format")))
}

fn parse_camera_ids(value: Option<&str>) -> Result<Option<Vec<i64>>, ApiError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let ids: Result<Vec<i64>, _> = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect();
    match ids {
        Ok(ids) if ids.is_empty() => Ok(None),
        Ok(ids) => Ok(Some(ids)),
        Err(_) => Err(ApiError::bad_request("invalid camera_ids format")),
    }
}
