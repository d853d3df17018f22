//! Write path for cameras, detections and alerts.
//!
//! Every artifact commits in a single transaction: camera upsert →
//! detection insert → detection_alert inserts → camera counter bump.
//! A unique-constraint hit on `detections.filepath` rolls the whole
//! transaction back and reports `Duplicate`, so a race between two
//! producers leaves exactly one row.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use common::keywords::{AlertFlags, AlertKind};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::models::{
    AlertType, AnalysisRewrite, Camera, CounterDrift, Detection, DetectionAlert, InsertOutcome,
    NewDetection,
};

const CAMERA_COLUMNS: &str = "id, location, device_name, device_type, full_name, created_at, \
     last_seen, is_active, total_detections, total_alerts";

const DETECTION_COLUMNS: &str = "id, filename, filepath, media_type, camera_id, motion_type, \
     processed, processing_time_seconds, description, confidence, analysis_structured, \
     timestamp, file_timestamp, width, height, frame_count, duration_seconds, has_person, \
     has_vehicle, has_package, has_unusual_activity, is_night_time, alert_count, thumbnail_path";

#[derive(Clone)]
pub struct DetectionStore {
    pool: SqlitePool,
}

impl DetectionStore {
    /// Open (creating if missing) the database behind `database_url` and
    /// bring the schema up to date. The alert catalog is seeded by the
    /// migrations, so it exists before the first artifact commits.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url: {database_url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fetch the camera for `(location, device_name)`, creating it on
    /// first sight. `last_seen` is refreshed either way.
    pub async fn get_or_create_camera(&self, location: &str, device_name: &str) -> Result<Camera> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let camera = upsert_camera(&mut tx, location, device_name).await?;
        tx.commit().await.context("failed to commit camera upsert")?;
        Ok(camera)
    }

    pub async fn exists_by_filepath(&self, filepath: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM detections WHERE filepath = ?1")
                .bind(filepath)
                .fetch_one(&self.pool)
                .await
                .context("failed to check for existing detection")?;
        Ok(count > 0)
    }

    pub async fn get_detection(&self, detection_id: i64) -> Result<Option<Detection>> {
        let detection = sqlx::query_as::<_, Detection>(&format!(
            "SELECT {DETECTION_COLUMNS} FROM detections WHERE id = ?1"
        ))
        .bind(detection_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch detection")?;
        Ok(detection)
    }

    pub async fn list_alert_types(&self) -> Result<Vec<AlertType>> {
        let types = sqlx::query_as::<_, AlertType>(
            "SELECT id, name, description, priority FROM alert_types ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list alert types")?;
        Ok(types)
    }

    /// Commit one artifact. See the module docs for the transaction shape.
    pub async fn insert_detection(&self, new: &NewDetection) -> Result<InsertOutcome> {
        let flags = AlertFlags::from_kinds(&new.alert_kinds);
        let now = Utc::now();

        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let camera = upsert_camera(&mut tx, &new.location, &new.device_name).await?;

        let insert = sqlx::query(
            r#"
            INSERT INTO detections (
                filename, filepath, media_type, camera_id, motion_type, processed,
                processing_time_seconds, description, confidence, analysis_structured,
                timestamp, file_timestamp, width, height, frame_count, duration_seconds,
                has_person, has_vehicle, has_package, has_unusual_activity, is_night_time,
                alert_count, thumbnail_path
            )
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22)
            "#,
        )
        .bind(&new.filename)
        .bind(&new.filepath)
        .bind(new.media_type.as_str())
        .bind(camera.id)
        .bind(new.motion_type.map(|m| m.as_str()))
        .bind(new.processing_time_seconds)
        .bind(&new.description)
        .bind(new.confidence)
        .bind(&new.analysis_structured)
        .bind(now)
        .bind(new.file_timestamp)
        .bind(new.width)
        .bind(new.height)
        .bind(new.frame_count)
        .bind(new.duration_seconds)
        .bind(flags.has_person)
        .bind(flags.has_vehicle)
        .bind(flags.has_package)
        .bind(flags.has_unusual_activity)
        .bind(flags.is_night_time)
        .bind(flags.alert_count)
        .bind(&new.thumbnail_path)
        .execute(&mut *tx)
        .await;

        let detection_id = match insert {
            Ok(done) => done.last_insert_rowid(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                // Lost the race to a concurrent producer; dropping the
                // transaction rolls back the camera upsert too.
                debug!(filepath = %new.filepath, "duplicate filepath, rolling back");
                return Ok(InsertOutcome::Duplicate);
            }
            Err(e) => return Err(e).context("failed to insert detection"),
        };

        insert_alert_rows(&mut tx, detection_id, new.confidence, &new.alert_kinds).await?;

        sqlx::query(
            "UPDATE cameras SET total_detections = total_detections + 1, \
             total_alerts = total_alerts + ?1, last_seen = ?2 WHERE id = ?3",
        )
        .bind(flags.alert_count)
        .bind(now)
        .bind(camera.id)
        .execute(&mut *tx)
        .await
        .context("failed to bump camera counters")?;

        tx.commit().await.context("failed to commit detection")?;

        Ok(InsertOutcome::Inserted {
            detection_id,
            camera_id: camera.id,
        })
    }

    /// Replace the alert rows of an existing detection, keeping the
    /// denormalized flags and the owning camera's alert counter in step.
    pub async fn replace_detection_alerts(
        &self,
        detection_id: i64,
        kinds: &[AlertKind],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let confidence: Option<f64> =
            sqlx::query_scalar("SELECT confidence FROM detections WHERE id = ?1")
                .bind(detection_id)
                .fetch_optional(&mut *tx)
                .await
                .context("failed to load detection")?
                .ok_or_else(|| anyhow::anyhow!("detection {detection_id} does not exist"))?;

        rewrite_alerts(&mut tx, detection_id, confidence.unwrap_or(0.0), kinds).await?;
        tx.commit().await.context("failed to commit alert replacement")
    }

    /// Rewrite an existing detection's analysis output: description, flags
    /// and alert rows, media properties and thumbnail. Used by the explicit
    /// reprocess path; the filepath and camera identity never change.
    pub async fn rewrite_detection_analysis(
        &self,
        detection_id: i64,
        rewrite: &AnalysisRewrite,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        let updated = sqlx::query(
            r#"
            UPDATE detections
            SET description = ?1, confidence = ?2, analysis_structured = ?3,
                processing_time_seconds = ?4, width = ?5, height = ?6,
                frame_count = ?7, duration_seconds = ?8, thumbnail_path = ?9,
                timestamp = ?10
            WHERE id = ?11
            "#,
        )
        .bind(&rewrite.description)
        .bind(rewrite.confidence)
        .bind(&rewrite.analysis_structured)
        .bind(rewrite.processing_time_seconds)
        .bind(rewrite.width)
        .bind(rewrite.height)
        .bind(rewrite.frame_count)
        .bind(rewrite.duration_seconds)
        .bind(&rewrite.thumbnail_path)
        .bind(Utc::now())
        .bind(detection_id)
        .execute(&mut *tx)
        .await
        .context("failed to rewrite detection")?;

        if updated.rows_affected() == 0 {
            anyhow::bail!("detection {detection_id} does not exist");
        }

        rewrite_alerts(&mut tx, detection_id, rewrite.confidence, &rewrite.alert_kinds).await?;
        tx.commit().await.context("failed to commit reprocess")
    }

    /// Adjust a camera's cached counters by the given deltas.
    pub async fn bump_camera_counters(
        &self,
        camera_id: i64,
        detection_delta: i64,
        alert_delta: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE cameras SET total_detections = total_detections + ?1, \
             total_alerts = total_alerts + ?2 WHERE id = ?3",
        )
        .bind(detection_delta)
        .bind(alert_delta)
        .bind(camera_id)
        .execute(&self.pool)
        .await
        .context("failed to bump camera counters")?;
        Ok(())
    }

    /// Verification sweep: recompute camera counters from the detection
    /// rows, fix any drifted camera in place and report what changed.
    pub async fn recount_camera_counters(&self) -> Result<Vec<CounterDrift>> {
        #[derive(sqlx::FromRow)]
        struct Recount {
            camera_id: i64,
            full_name: String,
            stored_detections: i64,
            stored_alerts: i64,
            actual_detections: i64,
            actual_alerts: i64,
        }

        let rows = sqlx::query_as::<_, Recount>(
            r#"
            SELECT c.id AS camera_id, c.full_name AS full_name,
                   c.total_detections AS stored_detections,
                   c.total_alerts AS stored_alerts,
                   COUNT(d.id) AS actual_detections,
                   COALESCE(SUM(d.alert_count), 0) AS actual_alerts
            FROM cameras c
            LEFT JOIN detections d ON d.camera_id = c.id
            GROUP BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to recount camera counters")?;

        let mut drifted = Vec::new();
        for row in rows {
            if row.stored_detections == row.actual_detections
                && row.stored_alerts == row.actual_alerts
            {
                continue;
            }

            warn!(
                camera = %row.full_name,
                stored_detections = row.stored_detections,
                actual_detections = row.actual_detections,
                stored_alerts = row.stored_alerts,
                actual_alerts = row.actual_alerts,
                "camera counter drift detected, correcting"
            );

            sqlx::query(
                "UPDATE cameras SET total_detections = ?1, total_alerts = ?2 WHERE id = ?3",
            )
            .bind(row.actual_detections)
            .bind(row.actual_alerts)
            .bind(row.camera_id)
            .execute(&self.pool)
            .await
            .context("failed to correct camera counters")?;

            drifted.push(CounterDrift {
                camera_id: row.camera_id,
                full_name: row.full_name,
                stored_detections: row.stored_detections,
                actual_detections: row.actual_detections,
                stored_alerts: row.stored_alerts,
                actual_alerts: row.actual_alerts,
            });
        }

        if drifted.is_empty() {
            info!("camera counters verified, no drift");
        }
        Ok(drifted)
    }

    /// Video detections, oldest first, for the thumbnail backfill.
    pub async fn video_thumbnail_candidates(&self, limit: i64) -> Result<Vec<Detection>> {
        let rows = sqlx::query_as::<_, Detection>(&format!(
            "SELECT {DETECTION_COLUMNS} FROM detections \
             WHERE media_type = 'video' ORDER BY id ASC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to list video detections")?;
        Ok(rows)
    }

    pub async fn update_thumbnail_path(
        &self,
        detection_id: i64,
        thumbnail_path: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE detections SET thumbnail_path = ?1 WHERE id = ?2")
            .bind(thumbnail_path)
            .bind(detection_id)
            .execute(&self.pool)
            .await
            .context("failed to update thumbnail path")?;
        Ok(())
    }

    /// Junction rows recorded for a detection, in catalog order.
    pub async fn detection_alerts(&self, detection_id: i64) -> Result<Vec<DetectionAlert>> {
        let rows = sqlx::query_as::<_, DetectionAlert>(
            "SELECT id, detection_id, alert_type_id, confidence, detected_at \
             FROM detection_alerts WHERE detection_id = ?1 ORDER BY alert_type_id",
        )
        .bind(detection_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list detection alert rows")?;
        Ok(rows)
    }

    /// Alert kind names recorded for a detection, in catalog order.
    pub async fn alert_names_for(&self, detection_id: i64) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT t.name FROM detection_alerts a \
             JOIN alert_types t ON t.id = a.alert_type_id \
             WHERE a.detection_id = ?1 ORDER BY t.id",
        )
        .bind(detection_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list detection alerts")?;
        Ok(names)
    }
}

async fn upsert_camera(
    conn: &mut SqliteConnection,
    location: &str,
    device_name: &str,
) -> Result<Camera> {
    let now = Utc::now();

    let existing = sqlx::query_as::<_, Camera>(&format!(
        "SELECT {CAMERA_COLUMNS} FROM cameras WHERE location = ?1 AND device_name = ?2"
    ))
    .bind(location)
    .bind(device_name)
    .fetch_optional(&mut *conn)
    .await
    .context("failed to look up camera")?;

    if let Some(mut camera) = existing {
        sqlx::query("UPDATE cameras SET last_seen = ?1 WHERE id = ?2")
            .bind(now)
            .bind(camera.id)
            .execute(&mut *conn)
            .await
            .context("failed to refresh camera last_seen")?;
        camera.last_seen = now;
        return Ok(camera);
    }

    let device_type = common::camera::DeviceType::from_device_name(device_name);
    let full_name = format!("{location}_{device_name}");

    let done = sqlx::query(
        "INSERT INTO cameras (location, device_name, device_type, full_name, created_at, last_seen) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(location)
    .bind(device_name)
    .bind(device_type.as_str())
    .bind(&full_name)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("failed to create camera")?;

    info!(location, device_name, "registered new camera");

    Ok(Camera {
        id: done.last_insert_rowid(),
        location: location.to_string(),
        device_name: device_name.to_string(),
        device_type: device_type.as_str().to_string(),
        full_name,
        created_at: now,
        last_seen: now,
        is_active: true,
        total_detections: 0,
        total_alerts: 0,
    })
}

async fn insert_alert_rows(
    conn: &mut SqliteConnection,
    detection_id: i64,
    confidence: f64,
    kinds: &[AlertKind],
) -> Result<()> {
    let now = Utc::now();
    for kind in kinds {
        sqlx::query(
            "INSERT INTO detection_alerts (detection_id, alert_type_id, confidence, detected_at) \
             SELECT ?1, id, ?2, ?3 FROM alert_types WHERE name = ?4",
        )
        .bind(detection_id)
        .bind(confidence)
        .bind(now)
        .bind(kind.name())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to insert {} alert", kind.name()))?;
    }
    Ok(())
}

/// Delete and reinsert a detection's alert rows, update its flags, and
/// roll the camera's alert counter by the difference.
async fn rewrite_alerts(
    conn: &mut SqliteConnection,
    detection_id: i64,
    confidence: f64,
    kinds: &[AlertKind],
) -> Result<()> {
    let flags = AlertFlags::from_kinds(kinds);

    let (camera_id, old_count): (i64, i64) =
        sqlx::query_as("SELECT camera_id, alert_count FROM detections WHERE id = ?1")
            .bind(detection_id)
            .fetch_one(&mut *conn)
            .await
            .context("failed to load detection for alert rewrite")?;

    sqlx::query("DELETE FROM detection_alerts WHERE detection_id = ?1")
        .bind(detection_id)
        .execute(&mut *conn)
        .await
        .context("failed to clear detection alerts")?;

    insert_alert_rows(conn, detection_id, confidence, kinds).await?;

    sqlx::query(
        "UPDATE detections SET has_person = ?1, has_vehicle = ?2, has_package = ?3, \
         has_unusual_activity = ?4, is_night_time = ?5, alert_count = ?6 WHERE id = ?7",
    )
    .bind(flags.has_person)
    .bind(flags.has_vehicle)
    .bind(flags.has_package)
    .bind(flags.has_unusual_activity)
    .bind(flags.is_night_time)
    .bind(flags.alert_count)
    .bind(detection_id)
    .execute(&mut *conn)
    .await
    .context("failed to update detection flags")?;

    sqlx::query("UPDATE cameras SET total_alerts = total_alerts + ?1 WHERE id = ?2")
        .bind(flags.alert_count - old_count)
        .bind(camera_id)
        .execute(&mut *conn)
        .await
        .context("failed to adjust camera alert counter")?;

    Ok(())
}
