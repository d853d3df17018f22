//! Query API configuration, loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct QueryApiConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: String,

    /// SQLite database URL shared with the ingest service.
    pub database_url: String,

    /// Camera tree root, served read-only under `/media`.
    pub foscam_root: PathBuf,

    /// Default log verbosity.
    pub log_level: String,
}

impl QueryApiConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: env::var("QUERY_API_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://foscam_detections.db".to_string()),
            foscam_root: PathBuf::from(
                env::var("FOSCAM_ROOT").unwrap_or_else(|_| "foscam".to_string()),
            ),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
