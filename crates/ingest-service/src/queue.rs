//! Bounded admission queue between producers and the artifact processor.
//!
//! Producers (crawler, watcher) block on `enqueue` when the queue is full;
//! nothing is dropped under load. A small worker pool drains the queue.
//! On shutdown the queue is drained to empty (in-flight and queued items
//! complete) before the workers exit; a grace period bounds how long that
//! is allowed to take.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::processor::{ArtifactProcessor, Outcome};

/// Which producer offered a path. Watcher-sourced jobs go through the
/// readiness wait; crawler jobs bypass it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSource {
    Crawler,
    Watcher,
}

/// One path offered to the processor.
#[derive(Debug)]
pub struct Job {
    pub path: PathBuf,
    pub source: JobSource,
    pub attempt: u32,
    /// Producers that tally outcomes (the crawler) attach a reply channel.
    pub reply: Option<oneshot::Sender<Outcome>>,
}

impl Job {
    pub fn new(path: PathBuf, source: JobSource) -> Self {
        Self {
            path,
            source,
            attempt: 0,
            reply: None,
        }
    }

    pub fn with_reply(path: PathBuf, source: JobSource) -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let job = Self {
            path,
            source,
            attempt: 0,
            reply: Some(tx),
        };
        (job, rx)
    }
}

pub struct IngestQueue {
    tx: mpsc::Sender<Job>,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl IngestQueue {
    /// Spawn the worker pool and return the queue handle.
    pub fn start(processor: Arc<ArtifactProcessor>, capacity: usize, worker_count: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let processor = Arc::clone(&processor);
                let requeue_tx = tx.clone();
                let shutdown_rx = shutdown_tx.subscribe();
                tokio::spawn(worker_loop(worker_id, rx, requeue_tx, processor, shutdown_rx))
            })
            .collect();

        Self {
            tx,
            shutdown_tx,
            workers,
        }
    }

    /// Offer one job, blocking while the queue is at capacity.
    pub async fn enqueue(&self, job: Job) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| anyhow!("ingest queue is closed"))
    }

    /// A sender for long-lived producers.
    pub fn sender(&self) -> mpsc::Sender<Job> {
        self.tx.clone()
    }

    /// Drain and stop: queued items complete, then the workers exit.
    /// Workers still running after `grace` are abandoned.
    pub async fn shutdown(self, grace: Duration) {
        let Self {
            tx,
            shutdown_tx,
            workers,
        } = self;

        let _ = shutdown_tx.send(true);
        drop(tx);

        let deadline = tokio::time::Instant::now() + grace;
        for mut handle in workers {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                warn!("grace period elapsed, abandoning ingest worker");
                handle.abort();
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    requeue_tx: mpsc::Sender<Job>,
    processor: Arc<ArtifactProcessor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker_id, "ingest worker started");

    while let Some(job) = next_job(&rx, &mut shutdown_rx).await {
        let outcome = processor.process(&job.path, job.source, job.attempt).await;

        match outcome {
            Outcome::NotReady if job.attempt == 0 => {
                let requeued = Job {
                    path: job.path,
                    source: job.source,
                    attempt: 1,
                    reply: job.reply,
                };
                if let Err(send_error) = requeue_tx.try_send(requeued) {
                    let job = send_error.into_inner();
                    warn!(path = %job.path.display(), "could not requeue unready file, dropping");
                    if let Some(reply) = job.reply {
                        let _ = reply.send(Outcome::Dropped("requeue failed".to_string()));
                    }
                }
            }
            outcome => {
                if let Some(reply) = job.reply {
                    let _ = reply.send(outcome);
                }
            }
        }
    }

    debug!(worker_id, "ingest worker stopped");
}

/// Next job for a worker. In normal operation this waits on the channel;
/// once shutdown is signalled it only drains what is already queued.
async fn next_job(
    rx: &Mutex<mpsc::Receiver<Job>>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Option<Job> {
    let mut rx = rx.lock().await;
    loop {
        if *shutdown_rx.borrow() {
            return rx.try_recv().ok();
        }
        tokio::select! {
            job = rx.recv() => return job,
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    return rx.try_recv().ok();
                }
            }
        }
    }
}
