//! Ingest service configuration, loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Camera tree root (`<root>/<location>/<device>/(snap|record)/…`).
    pub foscam_root: PathBuf,

    /// Directory video thumbnails are written into.
    pub thumbnail_root: PathBuf,

    /// SQLite database URL.
    pub database_url: String,

    /// Admission queue capacity between producers and the processor.
    pub queue_capacity: usize,

    /// Processor worker count. Keep at 1 for GPU-bound deployments; the
    /// describer serializes model calls regardless.
    pub worker_count: usize,

    pub describer_image_timeout: Duration,
    pub describer_video_timeout: Duration,

    /// Inference sidecar endpoint for the HTTP vision backend.
    pub describer_endpoint: Url,

    /// Frames sampled per video clip.
    pub video_sample_frames: usize,

    /// Period of the watcher's camera-tree rescan.
    pub watcher_rediscovery: Duration,

    /// Whether to crawl existing files once at startup before watching.
    pub initial_sweep: bool,

    /// How long shutdown waits for in-flight work before abandoning it.
    pub shutdown_grace: Duration,

    /// Default log verbosity (debug/info/warning/error).
    pub log_level: String,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        let describer_endpoint = env::var("DESCRIBER_ENDPOINT")
            .unwrap_or_else(|_| "http://127.0.0.1:8600/describe".to_string());
        let describer_endpoint =
            Url::parse(&describer_endpoint).context("invalid DESCRIBER_ENDPOINT")?;

        Ok(Self {
            foscam_root: PathBuf::from(env_or("FOSCAM_ROOT", "foscam")),
            thumbnail_root: PathBuf::from(env_or("THUMBNAIL_ROOT", "video_thumbnails")),
            database_url: env_or("DATABASE_URL", "sqlite://foscam_detections.db"),
            queue_capacity: env_parse("QUEUE_CAPACITY", 64)?,
            worker_count: env_parse("WORKER_COUNT", 1)?,
            describer_image_timeout: Duration::from_secs(env_parse(
                "DESCRIBER_IMAGE_TIMEOUT_S",
                60,
            )?),
            describer_video_timeout: Duration::from_secs(env_parse(
                "DESCRIBER_VIDEO_TIMEOUT_S",
                180,
            )?),
            describer_endpoint,
            video_sample_frames: env_parse("VIDEO_SAMPLE_FRAMES", 6)?,
            watcher_rediscovery: Duration::from_secs(env_parse("WATCHER_REDISCOVERY_S", 60)?),
            initial_sweep: env_parse("INITIAL_SWEEP", true)?,
            shutdown_grace: Duration::from_secs(env_parse("SHUTDOWN_GRACE_S", 30)?),
            log_level: env_or("LOG_LEVEL", "info"),
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {name}: {e}")),
        Err(_) => Ok(default),
    }
}
