//! Read-side queries backing the dashboard API.
//!
//! All operations are side-effect-free. Time windows (today/week/month,
//! heatmaps) are computed against `file_timestamp`, the wall-clock time a
//! camera stamped on the artifact, in the system's local time zone.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite};

use crate::models::Camera;
use crate::store::DetectionStore;

/// Filters shared by the listing and aggregate queries.
#[derive(Debug, Clone, Default)]
pub struct DetectionFilter {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub camera_ids: Option<Vec<i64>>,
    pub only_alerts: bool,
}

/// One detection row joined with its camera, as the dashboard consumes it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DetectionWithCamera {
    pub id: i64,
    pub filename: String,
    pub filepath: String,
    pub media_type: String,
    pub camera_id: i64,
    pub camera_location: String,
    pub camera_full_name: String,
    pub motion_type: Option<String>,
    pub description: Option<String>,
    pub confidence: Option<f64>,
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

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionPage {
    pub items: Vec<DetectionWithCamera>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub today: i64,
    pub week: i64,
    pub month: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyBucket {
    /// `YYYY-MM-DD` local date. Serialized as `timestamp`, the field name
    /// the dashboard reads from the daily heatmap payload.
    #[serde(rename = "timestamp")]
    pub bucket_date: String,
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_breakdown: Option<BTreeMap<String, i64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourlyBucket {
    /// Start-of-hour bucket, `0..=23`.
    pub hour: i64,
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_breakdown: Option<BTreeMap<String, i64>>,
}

/// On-demand processing roll-up for one camera and hour of day.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CameraHourStats {
    pub camera_id: i64,
    pub full_name: String,
    pub hour: i64,
    pub files_processed: i64,
    pub images_processed: i64,
    pub videos_processed: i64,
    pub avg_processing_time: Option<f64>,
    pub avg_confidence: Option<f64>,
    pub total_alerts: i64,
}

#[derive(FromRow)]
struct BucketRow {
    bucket: String,
    location: String,
    count: i64,
}

impl DetectionStore {
    /// Paged detection listing, newest first (`file_timestamp` DESC,
    /// tiebroken by id DESC). `per_page` is clamped to `1..=100`.
    pub async fn list_detections(
        &self,
        page: i64,
        per_page: i64,
        filter: &DetectionFilter,
    ) -> Result<DetectionPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut count_query = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM detections d JOIN cameras c ON c.id = d.camera_id",
        );
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .context("failed to count detections")?;

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT d.id, d.filename, d.filepath, d.media_type, d.camera_id, \
             c.location AS camera_location, c.full_name AS camera_full_name, \
             d.motion_type, d.description, d.confidence, d.timestamp, d.file_timestamp, \
             d.width, d.height, d.frame_count, d.duration_seconds, d.has_person, \
             d.has_vehicle, d.has_package, d.has_unusual_activity, d.is_night_time, \
             d.alert_count, d.thumbnail_path \
             FROM detections d JOIN cameras c ON c.id = d.camera_id",
        );
        push_filters(&mut query, filter);
        query.push(" ORDER BY d.file_timestamp DESC, d.id DESC LIMIT ");
        query.push_bind(per_page);
        query.push(" OFFSET ");
        query.push_bind((page - 1) * per_page);

        let items = query
            .build_query_as::<DetectionWithCamera>()
            .fetch_all(self.pool())
            .await
            .context("failed to list detections")?;

        Ok(DetectionPage {
            items,
            pagination: Pagination {
                page,
                per_page,
                total,
                total_pages: (total + per_page - 1) / per_page,
            },
        })
    }

    /// All cameras, ordered by `(location, device_name)`.
    pub async fn list_cameras(&self) -> Result<Vec<Camera>> {
        let cameras = sqlx::query_as::<_, Camera>(
            "SELECT id, location, device_name, device_type, full_name, created_at, \
             last_seen, is_active, total_detections, total_alerts \
             FROM cameras ORDER BY location, device_name",
        )
        .fetch_all(self.pool())
        .await
        .context("failed to list cameras")?;
        Ok(cameras)
    }

    /// Detection counts for the standard dashboard windows, local time.
    /// `today` starts at local midnight.
    pub async fn stats(&self, camera_ids: Option<&[i64]>) -> Result<StatsSummary> {
        let now = Local::now().naive_local();
        let today = now
            .date()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time");
        let week = now - Duration::days(7);
        let month = now - Duration::days(30);

        Ok(StatsSummary {
            today: self.count_since(Some(today), camera_ids).await?,
            week: self.count_since(Some(week), camera_ids).await?,
            month: self.count_since(Some(month), camera_ids).await?,
            total: self.count_since(None, camera_ids).await?,
        })
    }

    /// Daily detection counts over the trailing `days` window.
    pub async fn heatmap_daily(
        &self,
        days: i64,
        per_camera: bool,
        camera_ids: Option<&[i64]>,
    ) -> Result<Vec<DailyBucket>> {
        let start = Local::now().naive_local() - Duration::days(days.max(1));
        let rows = self
            .bucket_counts("substr(d.file_timestamp, 1, 10)", start, camera_ids)
            .await?;

        let mut buckets: BTreeMap<String, (i64, BTreeMap<String, i64>)> = BTreeMap::new();
        for row in rows {
            let entry = buckets.entry(row.bucket).or_default();
            entry.0 += row.count;
            *entry.1.entry(row.location).or_default() += row.count;
        }

        Ok(buckets
            .into_iter()
            .map(|(bucket_date, (count, breakdown))| DailyBucket {
                bucket_date,
                count,
                camera_breakdown: per_camera.then_some(breakdown),
            })
            .collect())
    }

    /// Hourly detection counts for the last 24 hours, bucketed by
    /// start-of-hour. All 24 buckets are present, zero or not.
    pub async fn heatmap_hourly(
        &self,
        per_camera: bool,
        camera_ids: Option<&[i64]>,
    ) -> Result<Vec<HourlyBucket>> {
        let start = Local::now().naive_local() - Duration::hours(24);
        let rows = self
            .bucket_counts("substr(d.file_timestamp, 12, 2)", start, camera_ids)
            .await?;

        let mut counts = [0i64; 24];
        let mut breakdowns: Vec<BTreeMap<String, i64>> = vec![BTreeMap::new(); 24];
        for row in rows {
            let Ok(hour) = row.bucket.parse::<usize>() else {
                continue;
            };
            if hour < 24 {
                counts[hour] += row.count;
                *breakdowns[hour].entry(row.location).or_default() += row.count;
            }
        }

        Ok((0..24)
            .map(|hour| HourlyBucket {
                hour: hour as i64,
                count: counts[hour],
                camera_breakdown: per_camera.then(|| std::mem::take(&mut breakdowns[hour])),
            })
            .collect())
    }

    /// Per-camera, per-hour-of-day roll-up, optionally restricted to one
    /// local date. Rebuilt on demand; nothing is materialized.
    pub async fn stats_by_camera_hour(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<Vec<CameraHourStats>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT c.id AS camera_id, c.full_name AS full_name, \
             CAST(substr(d.file_timestamp, 12, 2) AS INTEGER) AS hour, \
             COUNT(*) AS files_processed, \
             SUM(d.media_type = 'image') AS images_processed, \
             SUM(d.media_type = 'video') AS videos_processed, \
             AVG(d.processing_time_seconds) AS avg_processing_time, \
             AVG(d.confidence) AS avg_confidence, \
             COALESCE(SUM(d.alert_count), 0) AS total_alerts \
             FROM detections d JOIN cameras c ON c.id = d.camera_id \
             WHERE d.processed = 1 AND d.file_timestamp IS NOT NULL",
        );
        if let Some(date) = date {
            query.push(" AND substr(d.file_timestamp, 1, 10) = ");
            query.push_bind(date.to_string());
        }
        query.push(" GROUP BY c.id, hour ORDER BY c.id, hour");

        let rows = query
            .build_query_as::<CameraHourStats>()
            .fetch_all(self.pool())
            .await
            .context("failed to build processing stats")?;
        Ok(rows)
    }

    async fn count_since(
        &self,
        since: Option<NaiveDateTime>,
        camera_ids: Option<&[i64]>,
    ) -> Result<i64> {
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM detections d WHERE d.processed = 1");
        if let Some(since) = since {
            query.push(" AND d.file_timestamp >= ");
            query.push_bind(since);
        }
        push_camera_filter(&mut query, camera_ids);

        let count: i64 = query
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .context("failed to count detections")?;
        Ok(count)
    }

    async fn bucket_counts(
        &self,
        bucket_expr: &str,
        start: NaiveDateTime,
        camera_ids: Option<&[i64]>,
    ) -> Result<Vec<BucketRow>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {bucket_expr} AS bucket, c.location AS location, COUNT(*) AS count \
             FROM detections d JOIN cameras c ON c.id = d.camera_id \
             WHERE d.processed = 1 AND d.file_timestamp IS NOT NULL \
             AND d.file_timestamp >= "
        ));
        query.push_bind(start);
        push_camera_filter(&mut query, camera_ids);
        query.push(" GROUP BY bucket, location ORDER BY bucket");

        let rows = query
            .build_query_as::<BucketRow>()
            .fetch_all(self.pool())
            .await
            .context("failed to aggregate heatmap buckets")?;
        Ok(rows)
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &DetectionFilter) {
    query.push(" WHERE d.processed = 1");
    if let Some(start) = filter.start {
        query.push(" AND d.file_timestamp >= ");
        query.push_bind(start);
    }
    if let Some(end) = filter.end {
        query.push(" AND d.file_timestamp <= ");
        query.push_bind(end);
    }
    push_camera_filter(query, filter.camera_ids.as_deref());
    if filter.only_alerts {
        query.push(" AND d.alert_count > 0");
    }
}

fn push_camera_filter(query: &mut QueryBuilder<'_, Sqlite>, camera_ids: Option<&[i64]>) {
    if let Some(ids) = camera_ids {
        if !ids.is_empty() {
            query.push(" AND d.camera_id IN (");
            let mut separated = query.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            query.push(")");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InsertOutcome;
    use crate::testing::{new_detection, test_store};
    use chrono::Timelike;
    use common::keywords::AlertKind;

    async fn seed_three(store: &DetectionStore) -> Vec<i64> {
        let mut ids = Vec::new();
        let seeds = [
            (
                "/data/yard/FoscamCamera_1/snap/MDAlarm_20250710-080000.jpg",
                vec![AlertKind::PersonDetected],
            ),
            (
                "/data/yard/FoscamCamera_1/snap/MDAlarm_20250711-090000.jpg",
                vec![],
            ),
            (
                "/data/dock/FoscamCamera_2/snap/MDAlarm_20250712-100000.jpg",
                vec![AlertKind::VehicleDetected, AlertKind::NightTime],
            ),
        ];
        for (path, kinds) in seeds {
            let new = new_detection(path, &kinds);
            let InsertOutcome::Inserted { detection_id, .. } =
                store.insert_detection(&new).await.unwrap()
            else {
                panic!("expected insert");
            };
            ids.push(detection_id);
        }
        ids
    }

    #[tokio::test]
    async fn listing_orders_newest_first_and_paginates() {
        let (store, _dir) = test_store().await;
        let ids = seed_three(&store).await;

        let page = store
            .list_detections(1, 2, &DetectionFilter::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.items.len(), 2);
        // Newest file_timestamp first.
        assert_eq!(page.items[0].id, ids[2]);
        assert_eq!(page.items[1].id, ids[1]);

        let page2 = store
            .list_detections(2, 2, &DetectionFilter::default())
            .await
            .unwrap();
        assert_eq!(page2.items.len(), 1);
        assert_eq!(page2.items[0].id, ids[0]);
    }

    #[tokio::test]
    async fn listing_filters_by_camera_window_and_alerts() {
        let (store, _dir) = test_store().await;
        let ids = seed_three(&store).await;

        let camera_2 = store.get_or_create_camera("dock", "FoscamCamera_2").await.unwrap();
        let filter = DetectionFilter {
            camera_ids: Some(vec![camera_2.id]),
            ..Default::default()
        };
        let page = store.list_detections(1, 50, &filter).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].camera_location, "dock");

        let filter = DetectionFilter {
            only_alerts: true,
            ..Default::default()
        };
        let page = store.list_detections(1, 50, &filter).await.unwrap();
        let listed: Vec<i64> = page.items.iter().map(|d| d.id).collect();
        assert_eq!(listed, vec![ids[2], ids[0]]);

        let filter = DetectionFilter {
            start: chrono::NaiveDate::from_ymd_opt(2025, 7, 11)
                .unwrap()
                .and_hms_opt(0, 0, 0),
            ..Default::default()
        };
        let page = store.list_detections(1, 50, &filter).await.unwrap();
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn stats_windows_count_from_local_midnight() {
        let (store, _dir) = test_store().await;

        let now = Local::now().naive_local();
        let mut today = new_detection("/data/yard/FoscamCamera_1/snap/MDAlarm_20250710-080000.jpg", &[]);
        today.filepath = "/data/yard/FoscamCamera_1/snap/today.jpg".into();
        today.file_timestamp = Some(now.with_nanosecond(0).unwrap());
        store.insert_detection(&today).await.unwrap();

        let mut last_year = new_detection("/data/yard/FoscamCamera_1/snap/MDAlarm_20240710-080000.jpg", &[]);
        last_year.filepath = "/data/yard/FoscamCamera_1/snap/old.jpg".into();
        last_year.file_timestamp = Some(now - Duration::days(400));
        store.insert_detection(&last_year).await.unwrap();

        let stats = store.stats(None).await.unwrap();
        assert_eq!(stats.today, 1);
        assert_eq!(stats.week, 1);
        assert_eq!(stats.month, 1);
        assert_eq!(stats.total, 2);
    }

    #[tokio::test]
    async fn hourly_heatmap_emits_all_24_buckets() {
        let (store, _dir) = test_store().await;

        let recent = Local::now().naive_local() - Duration::hours(1);
        let mut detection =
            new_detection("/data/yard/FoscamCamera_1/snap/MDAlarm_20250710-080000.jpg", &[]);
        detection.filepath = "/data/yard/FoscamCamera_1/snap/recent.jpg".into();
        detection.file_timestamp = Some(recent.with_nanosecond(0).unwrap());
        store.insert_detection(&detection).await.unwrap();

        let buckets = store.heatmap_hourly(true, None).await.unwrap();
        assert_eq!(buckets.len(), 24);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<i64>(), 1);

        let hit = buckets.iter().find(|b| b.count == 1).unwrap();
        assert_eq!(hit.hour, recent.hour() as i64);
        let breakdown = hit.camera_breakdown.as_ref().unwrap();
        assert_eq!(breakdown.get("yard"), Some(&1));
    }

    #[tokio::test]
    async fn daily_heatmap_groups_by_date_with_breakdown() {
        let (store, _dir) = test_store().await;

        let now = Local::now().naive_local().with_nanosecond(0).unwrap();
        for (i, loc) in [(0i64, "yard"), (1, "yard"), (2, "dock")] {
            let mut detection = new_detection(
                &format!("/data/{loc}/FoscamCamera_9/snap/MDAlarm_20250710-08000{i}.jpg"),
                &[],
            );
            detection.location = loc.to_string();
            detection.filepath = format!("/data/{loc}/file{i}.jpg");
            detection.file_timestamp = Some(now - Duration::days(i));
            store.insert_detection(&detection).await.unwrap();
        }

        let buckets = store.heatmap_daily(30, true, None).await.unwrap();
        assert_eq!(buckets.iter().map(|b| b.count).sum::<i64>(), 3);
        let today = buckets.last().unwrap();
        assert_eq!(today.bucket_date, now.date().to_string());
        assert_eq!(today.count, 1);
        assert_eq!(today.camera_breakdown.as_ref().unwrap().get("yard"), Some(&1));
    }

    #[tokio::test]
    async fn camera_hour_rollup_aggregates_counts() {
        let (store, _dir) = test_store().await;
        seed_three(&store).await;

        let rollup = store.stats_by_camera_hour(None).await.unwrap();
        assert_eq!(rollup.iter().map(|r| r.files_processed).sum::<i64>(), 3);
        let dock = rollup.iter().find(|r| r.full_name.starts_with("dock")).unwrap();
        assert_eq!(dock.hour, 10);
        assert_eq!(dock.total_alerts, 2);
        assert_eq!(dock.images_processed, 1);
        assert_eq!(dock.videos_processed, 0);
    }
}
