//! The render-service seam used by the poller and generator.

use std::sync::Arc;

use async_trait::async_trait;
use easel_core::JobSpec;

use crate::api::{ComfyUIApiError, SubmitResponse};
use crate::history::{History, ImageRef};

/// Operations the orchestration layer needs from a render service.
///
/// [`ComfyUIApi`](crate::api::ComfyUIApi) is the HTTP implementation.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Queue `spec` for execution under `prompt_id`.
    async fn submit(
        &self,
        spec: &JobSpec,
        client_id: &str,
        prompt_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError>;

    /// Fetch the history map for `prompt_id`.
    async fn history(&self, prompt_id: &str) -> Result<History, ComfyUIApiError>;

    /// Download one artifact.
    async fn view(&self, image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError>;
}

#[async_trait]
impl<T: RenderBackend + ?Sized> RenderBackend for Arc<T> {
    async fn submit(
        &self,
        spec: &JobSpec,
        client_id: &str,
        prompt_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        (**self).submit(spec, client_id, prompt_id).await
    }

    async fn history(&self, prompt_id: &str) -> Result<History, ComfyUIApiError> {
        (**self).history(prompt_id).await
    }

    async fn view(&self, image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError> {
        (**self).view(image).await
    }
}
