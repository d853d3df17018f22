//! Vision describer capability.
//!
//! The [`Describer`] trait is what the artifact processor consumes: image
//! bytes in, structured description out; a video path in, a timeline
//! description plus keyframe thumbnail out. [`VisionDescriber`] is the
//! production implementation, generic over a [`VisionBackend`] so the
//! model itself is swappable (an HTTP inference sidecar in production, a
//! deterministic stub in tests).

pub mod backend;
pub mod http;
pub mod prompts;
pub mod stub;
pub mod synthesis;
pub mod vision;

use std::path::Path;

use async_trait::async_trait;
use common::describe::{ImageAnalysis, VideoAnalysis};
use thiserror::Error;

pub use backend::VisionBackend;
pub use http::HttpBackend;
pub use stub::StubBackend;
pub use vision::VisionDescriber;

/// Describer failures, split by retry policy: transient failures are worth
/// one retry after a short backoff, permanent ones are not.
#[derive(Debug, Error)]
pub enum DescribeError {
    #[error("transient describer failure: {0}")]
    Transient(String),

    #[error("permanent describer failure: {0}")]
    Permanent(String),
}

impl DescribeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The vision-language capability the processor depends on.
#[async_trait]
pub trait Describer: Send + Sync {
    /// Describe a still image from its raw bytes.
    async fn describe_image(&self, bytes: &[u8]) -> Result<ImageAnalysis, DescribeError>;

    /// Describe a video clip on disk, producing a timeline description
    /// and a representative keyframe.
    async fn describe_video(&self, path: &Path) -> Result<VideoAnalysis, DescribeError>;
}
