//! The backend seam between description synthesis and the model.

use async_trait::async_trait;
use common::describe::AspectMap;

use crate::prompts::AspectPrompt;
use crate::DescribeError;

/// A vision-language model that can answer a set of named prompts about
/// one JPEG frame. Implementations must be safe to call from multiple
/// tasks; serialization of GPU work happens above this trait.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn aspects(
        &self,
        frame_jpeg: &[u8],
        prompts: &[AspectPrompt],
    ) -> Result<AspectMap, DescribeError>;
}
