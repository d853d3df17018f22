//! Live filesystem watcher: forwards newly created artifacts into the
//! same processor entry point the crawler uses.
//!
//! Creation events from every recognized `snap/` and `record/` directory
//! are bridged onto a channel; duplicates within a one second window are
//! coalesced; a periodic rediscovery sweep picks up camera directories
//! created after startup. Partially written files are handled downstream
//! by the processor's readiness wait.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use common::camera::{is_camera_device_dir, ArtifactPath};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::queue::{Job, JobSource};

/// Duplicate creation notifications for one path inside this window
/// collapse to a single offer.
const COALESCE_WINDOW: Duration = Duration::from_secs(1);

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Watch `root` until cancelled, offering matching new files to the queue.
pub async fn watch(
    root: PathBuf,
    queue_tx: mpsc::Sender<Job>,
    rediscovery: Duration,
    mut cancel: watch::Receiver<bool>,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PathBuf>();

    // Subscription can fail outright (camera root unmounted at boot);
    // retry with exponential backoff and a warning per attempt.
    let mut backoff = BACKOFF_INITIAL;
    let (mut watcher, mut watched) = loop {
        if *cancel.borrow() {
            return Ok(());
        }
        match subscribe(&root, event_tx.clone()) {
            Ok(subscription) => break subscription,
            Err(e) => {
                warn!(
                    root = %root.display(),
                    retry_in_s = backoff.as_secs(),
                    "watch subscription failed, retrying: {e:#}"
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.changed() => return Ok(()),
                }
                backoff = (backoff * 2).min(BACKOFF_CAP);
            }
        }
    };
    info!(root = %root.display(), directories = watched.len(), "watcher started");

    let mut recent: HashMap<PathBuf, Instant> = HashMap::new();
    let mut sweep = tokio::time::interval(rediscovery.max(Duration::from_secs(1)));
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    sweep.tick().await; // first tick completes immediately

    loop {
        tokio::select! {
            _ = cancel.changed() => break,

            event = event_rx.recv() => {
                let Some(path) = event else { break };

                let now = Instant::now();
                recent.retain(|_, seen| now.duration_since(*seen) < COALESCE_WINDOW);
                if recent.contains_key(&path) {
                    continue;
                }
                recent.insert(path.clone(), now);

                if ArtifactPath::parse(&path).is_none() {
                    debug!(path = %path.display(), "ignoring file outside the camera grammar");
                    continue;
                }

                debug!(path = %path.display(), "new artifact observed");
                if queue_tx.send(Job::new(path, JobSource::Watcher)).await.is_err() {
                    warn!("ingest queue closed, stopping watcher");
                    break;
                }
            }

            _ = sweep.tick() => {
                for dir in monitor_dirs(&root) {
                    if watched.contains(&dir) {
                        continue;
                    }
                    match watcher.watch(&dir, RecursiveMode::Recursive) {
                        Ok(()) => {
                            info!(dir = %dir.display(), "watching new camera directory");
                            watched.insert(dir);
                        }
                        Err(e) => warn!(dir = %dir.display(), "failed to watch new directory: {e}"),
                    }
                }
            }
        }
    }

    info!("watcher stopped");
    Ok(())
}

fn subscribe(
    root: &Path,
    event_tx: mpsc::UnboundedSender<PathBuf>,
) -> Result<(RecommendedWatcher, HashSet<PathBuf>)> {
    if !root.exists() {
        anyhow::bail!("camera root does not exist: {}", root.display());
    }

    let mut watcher =
        notify::recommended_watcher(move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_)) {
                    for path in event.paths {
                        if path.is_file() {
                            let _ = event_tx.send(path);
                        }
                    }
                }
            }
            Err(e) => warn!("watch error: {e}"),
        })
        .context("failed to create filesystem watcher")?;

    let mut watched = HashSet::new();
    for dir in monitor_dirs(root) {
        watcher
            .watch(&dir, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
        watched.insert(dir);
    }

    Ok((watcher, watched))
}

/// Every `snap/` and `record/` directory under recognized camera devices.
pub fn monitor_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    let Ok(locations) = std::fs::read_dir(root) else {
        return dirs;
    };
    for location in locations.flatten() {
        let location_path = location.path();
        if !location_path.is_dir() {
            continue;
        }
        let Ok(devices) = std::fs::read_dir(&location_path) else {
            continue;
        };
        for device in devices.flatten() {
            let device_path = device.path();
            let device_name = device.file_name().to_string_lossy().to_string();
            if !device_path.is_dir() || !is_camera_device_dir(&device_name) {
                continue;
            }
            for kind in ["snap", "record"] {
                let dir = device_path.join(kind);
                if dir.is_dir() {
                    dirs.push(dir);
                }
            }
        }
    }

    dirs.sort();
    dirs
}
