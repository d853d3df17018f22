pub mod config;
pub mod crawler;
pub mod processor;
pub mod queue;
pub mod watcher;

pub use config::IngestConfig;
pub use crawler::{crawl, CrawlOptions, CrawlReport};
pub use processor::{ArtifactProcessor, Outcome};
pub use queue::{IngestQueue, Job, JobSource};
