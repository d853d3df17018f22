//! HTTP vision backend: ships frames to an inference sidecar.
//!
//! The sidecar owns the model weights and exposes a single endpoint that
//! answers named prompts about one frame. Frames travel base64-encoded in
//! the JSON body; per-call deadlines are enforced by the caller, not here.

use async_trait::async_trait;
use base64::Engine;
use common::describe::AspectMap;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::VisionBackend;
use crate::prompts::AspectPrompt;
use crate::DescribeError;

#[derive(Serialize)]
struct DescribeRequest<'a> {
    image: String,
    prompts: &'a [AspectPrompt],
}

#[derive(Deserialize)]
struct DescribeResponse {
    aspects: AspectMap,
}

pub struct HttpBackend {
    client: Client,
    endpoint: Url,
}

impl HttpBackend {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl VisionBackend for HttpBackend {
    async fn aspects(
        &self,
        frame_jpeg: &[u8],
        prompts: &[AspectPrompt],
    ) -> Result<AspectMap, DescribeError> {
        let request = DescribeRequest {
            image: base64::engine::general_purpose::STANDARD.encode(frame_jpeg),
            prompts,
        };

        debug!(
            endpoint = %self.endpoint,
            prompt_count = prompts.len(),
            frame_bytes = frame_jpeg.len(),
            "requesting aspect analysis"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                // Connection and timeout failures are worth a retry; the
                // sidecar restarts independently of this process.
                DescribeError::Transient(format!("describe request failed: {e}"))
            })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DescribeError::Transient(format!(
                "describe endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(DescribeError::Permanent(format!(
                "describe endpoint rejected frame: {status}"
            )));
        }

        let body: DescribeResponse = response
            .json()
            .await
            .map_err(|e| DescribeError::Permanent(format!("invalid describe response: {e}")))?;

        Ok(body.aspects)
    }
}
