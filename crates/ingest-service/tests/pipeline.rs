//! End-to-end pipeline tests over a temp camera tree, a stub describer
//! and a real SQLite store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use describer::stub::StubDescriber;
use describer::Describer;
use detection_store::{DetectionFilter, DetectionStore};
use ingest_service::{
    crawler, ArtifactProcessor, CrawlOptions, IngestQueue, JobSource, Outcome,
};
use tempfile::TempDir;

struct Harness {
    store: DetectionStore,
    processor: Arc<ArtifactProcessor>,
    root: TempDir,
    thumbs: TempDir,
}

async fn harness(describer: StubDescriber) -> Harness {
    let root = tempfile::tempdir().expect("camera root");
    let thumbs = tempfile::tempdir().expect("thumbnail root");

    let url = format!("sqlite://{}", thumbs.path().join("detections.db").display());
    let store = DetectionStore::connect(&url).await.expect("connect store");

    let processor = Arc::new(
        ArtifactProcessor::new(
            store.clone(),
            Arc::new(describer) as Arc<dyn Describer>,
            thumbs.path().to_path_buf(),
        )
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
        .with_readiness(Duration::from_millis(10), Duration::from_millis(120)),
    );

    Harness {
        store,
        processor,
        root,
        thumbs,
    }
}

fn write_media(root: &Path, rel: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"fake media bytes").unwrap();
    path
}

fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, s)
        .unwrap()
}

async fn filepaths_by_id(store: &DetectionStore) -> Vec<String> {
    sqlx::query_scalar("SELECT filepath FROM detections ORDER BY id")
        .fetch_all(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn daytime_person_image_ingests_with_flags_and_rows() {
    let stub = StubDescriber::with_aspects(&[
        ("objects", "1 person, 3 vehicles"),
        ("environment", "daytime"),
    ]);
    let h = harness(stub).await;
    let path = write_media(
        h.root.path(),
        "ami_frontyard_left/FoscamCamera_00626EFE8B21/snap/MDAlarm_20250712-213837.jpg",
    );

    let outcome = h.processor.process(&path, JobSource::Crawler, 0).await;
    let Outcome::Ingested {
        detection_id,
        camera_id,
        alert_count,
    } = outcome
    else {
        panic!("expected ingest, got {outcome:?}");
    };
    assert_eq!(alert_count, 2);

    let detection = h.store.get_detection(detection_id).await.unwrap().unwrap();
    assert_eq!(detection.media_type, "image");
    assert_eq!(detection.motion_type.as_deref(), Some("MD"));
    assert_eq!(detection.file_timestamp.unwrap(), ts(2025, 7, 12, 21, 38, 37));
    assert!(detection.has_person);
    assert!(detection.has_vehicle);
    assert!(!detection.has_package);
    assert!(!detection.is_night_time);
    assert_eq!(detection.alert_count, 2);
    assert!(detection.description.unwrap().contains("OBJECTS: 1 person, 3 vehicles"));

    let names = h.store.alert_names_for(detection_id).await.unwrap();
    assert_eq!(names, vec!["PERSON_DETECTED", "VEHICLE_DETECTED"]);

    let camera = h
        .store
        .get_or_create_camera("ami_frontyard_left", "FoscamCamera_00626EFE8B21")
        .await
        .unwrap();
    assert_eq!(camera.id, camera_id);
    assert_eq!(camera.device_type, "FoscamCamera");
    assert_eq!(camera.total_detections, 1);
    assert_eq!(camera.total_alerts, 2);
}

#[tokio::test]
async fn night_video_ingests_with_thumbnail() {
    let stub = StubDescriber::with_aspects(&[("security", "suspicious loitering at night")]);
    let h = harness(stub).await;
    let path = write_media(
        h.root.path(),
        "dock_left/FoscamCamera_00626EFE89A8/record/MDalarm_20250714_003211.mkv",
    );

    let outcome = h.processor.process(&path, JobSource::Crawler, 0).await;
    let Outcome::Ingested { detection_id, .. } = outcome else {
        panic!("expected ingest, got {outcome:?}");
    };

    let detection = h.store.get_detection(detection_id).await.unwrap().unwrap();
    assert_eq!(detection.media_type, "video");
    assert_eq!(detection.motion_type.as_deref(), Some("MD"));
    assert_eq!(detection.file_timestamp.unwrap(), ts(2025, 7, 14, 0, 32, 11));
    assert!(detection.has_unusual_activity);
    assert!(detection.is_night_time);
    assert_eq!(detection.alert_count, 2);
    assert!(detection.frame_count.is_some());
    assert!(detection.duration_seconds.is_some());

    let thumbnail = detection.thumbnail_path.expect("thumbnail recorded");
    let thumbnail = Path::new(&thumbnail);
    assert!(thumbnail.exists(), "thumbnail file written");
    assert_eq!(
        thumbnail.file_name().unwrap().to_str().unwrap(),
        "MDalarm_20250714_003211.jpg"
    );
    assert_eq!(thumbnail.parent().unwrap(), h.thumbs.path());
}

#[tokio::test]
async fn human_motion_prefix_is_recorded_as_hmd() {
    let stub = StubDescriber::with_aspects(&[("general", "a kitchen")]);
    let h = harness(stub).await;
    let path = write_media(
        h.root.path(),
        "kitchen/R2C_AABBCC/snap/HMDAlarm_20250101-120000.jpg",
    );

    let Outcome::Ingested { detection_id, .. } =
        h.processor.process(&path, JobSource::Crawler, 0).await
    else {
        panic!("expected ingest");
    };
    let detection = h.store.get_detection(detection_id).await.unwrap().unwrap();
    assert_eq!(detection.motion_type.as_deref(), Some("HMD"));
}

#[tokio::test]
async fn unrecognized_path_leaves_no_trace() {
    let stub = StubDescriber::with_aspects(&[("general", "ignored")]);
    let h = harness(stub).await;
    let path = write_media(
        h.root.path(),
        "ami_frontyard_left/FoscamCamera_00626EFE8B21/snap/readme.txt",
    );

    let outcome = h.processor.process(&path, JobSource::Crawler, 0).await;
    assert_eq!(outcome, Outcome::SkippedUnrecognized);

    assert!(h.store.list_cameras().await.unwrap().is_empty());
    let page = h
        .store
        .list_detections(1, 10, &DetectionFilter::default())
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 0);
}

#[tokio::test]
async fn duplicate_offer_is_idempotent() {
    let stub = StubDescriber::with_aspects(&[("general", "a yard")]);
    let h = harness(stub).await;
    let path = write_media(
        h.root.path(),
        "yard/FoscamCamera_1/snap/MDAlarm_20250712-213837.jpg",
    );

    let first = h.processor.process(&path, JobSource::Crawler, 0).await;
    assert!(matches!(first, Outcome::Ingested { .. }));

    let second = h.processor.process(&path, JobSource::Crawler, 0).await;
    assert_eq!(second, Outcome::SkippedKnown);

    let page = h
        .store
        .list_detections(1, 10, &DetectionFilter::default())
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 1);
}

#[tokio::test]
async fn transient_describe_failure_retries_once_and_succeeds() {
    let stub = StubDescriber::with_aspects(&[("general", "a yard after rain")])
        .with_transient_failures(1);
    let h = harness(stub).await;
    let path = write_media(
        h.root.path(),
        "yard/FoscamCamera_1/snap/MDAlarm_20250712-213837.jpg",
    );

    let Outcome::Ingested { detection_id, .. } =
        h.processor.process(&path, JobSource::Crawler, 0).await
    else {
        panic!("expected the retry to succeed");
    };

    let detection = h.store.get_detection(detection_id).await.unwrap().unwrap();
    assert_eq!(detection.description.as_deref(), Some("SCENE: a yard after rain"));

    let page = h
        .store
        .list_detections(1, 10, &DetectionFilter::default())
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 1);
}

#[tokio::test]
async fn permanent_failure_commits_unanalyzable_detection() {
    let stub = StubDescriber::with_aspects(&[("general", "never seen")])
        .with_permanent_failures(1);
    let h = harness(stub).await;
    let path = write_media(
        h.root.path(),
        "yard/FoscamCamera_1/snap/MDAlarm_20250712-213837.jpg",
    );

    let outcome = h.processor.process(&path, JobSource::Crawler, 0).await;
    let Outcome::IngestedUnanalyzable { detection_id } = outcome else {
        panic!("expected unanalyzable commit, got {outcome:?}");
    };

    let detection = h.store.get_detection(detection_id).await.unwrap().unwrap();
    assert_eq!(detection.description.as_deref(), Some(""));
    assert_eq!(detection.confidence, Some(0.0));
    assert_eq!(detection.alert_count, 0);
    assert!(detection.thumbnail_path.is_none());
    assert!(detection.width.is_none());

    // Dedupe holds on the next sweep.
    let second = h.processor.process(&path, JobSource::Crawler, 0).await;
    assert_eq!(second, Outcome::SkippedKnown);
}

#[tokio::test]
async fn unparseable_timestamp_still_ingests_with_null_stamp() {
    let stub = StubDescriber::with_aspects(&[("general", "a yard")]);
    let h = harness(stub).await;
    let path = write_media(
        h.root.path(),
        "yard/FoscamCamera_1/snap/MDAlarm_corrupted.jpg",
    );

    let Outcome::Ingested { detection_id, .. } =
        h.processor.process(&path, JobSource::Crawler, 0).await
    else {
        panic!("a bad timestamp must not block ingestion");
    };

    let detection = h.store.get_detection(detection_id).await.unwrap().unwrap();
    assert!(detection.file_timestamp.is_none());
    assert_eq!(detection.description.as_deref(), Some("SCENE: a yard"));
}

#[tokio::test]
async fn zero_byte_image_is_recorded_unanalyzable() {
    // The production describer decodes image bytes itself, so an empty
    // file is a permanent decode failure rather than a stub concern.
    let root = tempfile::tempdir().unwrap();
    let thumbs = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", thumbs.path().join("detections.db").display());
    let store = DetectionStore::connect(&url).await.unwrap();

    let vision = describer::VisionDescriber::new(describer::StubBackend::new(Default::default()));
    let processor = ArtifactProcessor::new(
        store.clone(),
        Arc::new(vision) as Arc<dyn Describer>,
        thumbs.path().to_path_buf(),
    )
    .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));

    let path = root
        .path()
        .join("yard/FoscamCamera_1/snap/MDAlarm_20250712-213837.jpg");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"").unwrap();

    let outcome = processor.process(&path, JobSource::Crawler, 0).await;
    let Outcome::IngestedUnanalyzable { detection_id } = outcome else {
        panic!("expected unanalyzable commit, got {outcome:?}");
    };

    let detection = store.get_detection(detection_id).await.unwrap().unwrap();
    assert_eq!(detection.confidence, Some(0.0));
    assert_eq!(detection.alert_count, 0);
    assert!(detection.thumbnail_path.is_none());
}

#[tokio::test]
async fn concurrent_offers_commit_exactly_once() {
    let stub = StubDescriber::with_aspects(&[("general", "a yard")]);
    let h = harness(stub).await;
    let path = write_media(
        h.root.path(),
        "yard/FoscamCamera_1/snap/MDAlarm_20250712-213837.jpg",
    );

    let (a, b) = tokio::join!(
        h.processor.process(&path, JobSource::Crawler, 0),
        h.processor.process(&path, JobSource::Watcher, 0),
    );

    let outcomes = [a, b];
    let ingested = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Ingested { .. }))
        .count();
    let deduped = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::SkippedKnown))
        .count();
    assert_eq!(ingested, 1, "exactly one producer wins: {outcomes:?}");
    assert_eq!(deduped, 1, "the loser observes the duplicate: {outcomes:?}");

    assert_eq!(filepaths_by_id(&h.store).await.len(), 1);
}

#[tokio::test]
async fn watcher_jobs_wait_for_stable_files() {
    let stub = StubDescriber::with_aspects(&[("general", "a yard")]);
    let h = harness(stub).await;

    // A stable non-empty file passes the readiness wait.
    let ready = write_media(
        h.root.path(),
        "yard/FoscamCamera_1/snap/MDAlarm_20250712-213837.jpg",
    );
    let outcome = h.processor.process(&ready, JobSource::Watcher, 0).await;
    assert!(matches!(outcome, Outcome::Ingested { .. }));

    // A zero-byte file never stabilizes: requeue once, then drop.
    let empty = h
        .root
        .path()
        .join("yard/FoscamCamera_1/snap/MDAlarm_20250712-213838.jpg");
    std::fs::write(&empty, b"").unwrap();

    let first = h.processor.process(&empty, JobSource::Watcher, 0).await;
    assert_eq!(first, Outcome::NotReady);
    let second = h.processor.process(&empty, JobSource::Watcher, 1).await;
    assert!(matches!(second, Outcome::Dropped(_)), "got {second:?}");
}

#[tokio::test]
async fn crawl_reports_and_preserves_discovery_order() {
    let stub = StubDescriber::with_aspects(&[("general", "a yard")]);
    let h = harness(stub).await;

    let known = write_media(
        h.root.path(),
        "dock/FoscamCamera_A/snap/MDAlarm_20250102-000000.jpg",
    );
    write_media(
        h.root.path(),
        "dock/FoscamCamera_A/snap/MDAlarm_20250101-000000.jpg",
    );
    write_media(
        h.root.path(),
        "dock/FoscamCamera_A/snap/MDAlarm_20250103-000000.jpg",
    );
    write_media(h.root.path(), "dock/FoscamCamera_A/snap/readme.txt");
    write_media(
        h.root.path(),
        "yard/FoscamCamera_B/record/MDalarm_20250104_000000.mkv",
    );

    // Pre-ingest one file so the crawl observes a dedupe hit.
    let pre = h.processor.process(&known, JobSource::Crawler, 0).await;
    assert!(matches!(pre, Outcome::Ingested { .. }));

    // Capacity below the file count exercises producer back-pressure.
    let queue = IngestQueue::start(Arc::clone(&h.processor), 2, 1);
    let report = crawler::crawl(h.root.path(), &CrawlOptions::default(), &queue)
        .await
        .unwrap();
    queue.shutdown(Duration::from_secs(5)).await;

    assert_eq!(report.seen, 5);
    assert_eq!(report.processed_ok, 3);
    assert_eq!(report.skipped_known, 1);
    assert_eq!(report.skipped_unrecognized, 1);
    assert_eq!(report.failed, 0);

    // Detection ids increase in crawl order: dock ascending timestamps
    // (the pre-ingested file claimed the first id), then yard.
    let paths = filepaths_by_id(&h.store).await;
    let names: Vec<&str> = paths
        .iter()
        .map(|p| p.rsplit('/').next().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "MDAlarm_20250102-000000.jpg",
            "MDAlarm_20250101-000000.jpg",
            "MDAlarm_20250103-000000.jpg",
            "MDalarm_20250104_000000.mkv",
        ]
    );
}

#[tokio::test]
async fn crawl_honors_limit_and_camera_filter() {
    let stub = StubDescriber::with_aspects(&[("general", "a yard")]);
    let h = harness(stub).await;

    for i in 0..4 {
        write_media(
            h.root.path(),
            &format!("dock/FoscamCamera_A/snap/MDAlarm_2025010{}-000000.jpg", i + 1),
        );
    }
    write_media(
        h.root.path(),
        "yard/FoscamCamera_B/snap/MDAlarm_20250101-000000.jpg",
    );

    let queue = IngestQueue::start(Arc::clone(&h.processor), 4, 1);
    let options = CrawlOptions {
        limit: Some(2),
        cameras: Some(vec!["dock".to_string()]),
        ..Default::default()
    };
    let report = crawler::crawl(h.root.path(), &options, &queue).await.unwrap();
    queue.shutdown(Duration::from_secs(5)).await;

    assert_eq!(report.seen, 2);
    assert_eq!(report.processed_ok, 2);

    let paths = filepaths_by_id(&h.store).await;
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| p.contains("/dock/")));
}

#[tokio::test]
async fn reprocess_rewrites_description_and_alerts() {
    let stub = StubDescriber::with_aspects(&[("security", "a delivery person with a package")]);
    let h = harness(stub).await;
    let path = write_media(
        h.root.path(),
        "yard/FoscamCamera_1/snap/MDAlarm_20250712-213837.jpg",
    );

    let Outcome::Ingested { detection_id, .. } =
        h.processor.process(&path, JobSource::Crawler, 0).await
    else {
        panic!("expected ingest");
    };

    let before = h.store.get_detection(detection_id).await.unwrap().unwrap();
    assert!(before.has_person);
    assert!(before.has_package);

    h.processor.reprocess(detection_id).await.unwrap();

    let after = h.store.get_detection(detection_id).await.unwrap().unwrap();
    assert_eq!(after.filepath, before.filepath);
    assert!(after.has_person);
    assert_eq!(after.alert_count, before.alert_count);
    assert_eq!(
        filepaths_by_id(&h.store).await.len(),
        1,
        "reprocess must not add rows"
    );
}
