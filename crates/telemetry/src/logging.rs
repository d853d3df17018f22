//! Structured logging bootstrap shared by every binary in the workspace.
//!
//! Every processed artifact yields exactly one terminal event (`ingested`,
//! `skipped_*`, `failed_*`), so operators can triage from the log stream
//! alone; this module only configures how those events are rendered.

use std::env;
use std::io;

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Log output format, selected by the `LOG_FORMAT` environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format (default for development).
    Pretty,
    /// Compact single-line text format.
    Compact,
    /// JSON format for log aggregation systems.
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the global subscriber.
///
/// `default_level` (the `LOG_LEVEL` config key: debug/info/warning/error)
/// sets the filter when `RUST_LOG` is absent; `RUST_LOG` wins when set.
pub fn init(service_name: &str, default_level: &str) {
    // The config surface says "warning"; tracing spells it "warn".
    let level = match default_level.to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        other => other.to_string(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level))
        .add_directive("hyper=warn".parse().expect("valid directive"))
        .add_directive("sqlx=warn".parse().expect("valid directive"))
        .add_directive("notify=warn".parse().expect("valid directive"));

    let registry = tracing_subscriber::registry().with(filter);
    let format = LogFormat::from_env();

    match format {
        LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_target(true)
                        .with_writer(io::stdout),
                )
                .init();
        }
        LogFormat::Compact => {
            registry
                .with(fmt::layer().compact().with_target(true))
                .init();
        }
        LogFormat::Pretty => {
            registry
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }

    tracing::info!(
        service.name = %service_name,
        format = ?format,
        "structured logging initialized"
    );
}
