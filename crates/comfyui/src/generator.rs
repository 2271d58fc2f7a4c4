//! End-to-end image generation: build, submit, wait, fetch.
//!
//! [`Generator`] composes the workflow registry with a
//! [`RenderBackend`]. Each call to [`Generator::generate`] is
//! self-contained: it mints its own prompt id, and shares nothing with
//! concurrent calls besides the read-mostly registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use easel_core::{JobSpec, PromptFields, WorkflowRegistry};
use tokio::time::Instant;

use crate::api::ComfyUIApi;
use crate::backend::RenderBackend;
use crate::client;
use crate::config::{CompletionStrategy, ComfyUIConfig};
use crate::error::GenerationError;
use crate::history::{HistoryEntry, ImageRef};
use crate::poller::{wait_until_done, PollConfig};
use crate::retry::{retry_transient, RetryConfig};
use crate::watch::wait_for_completion;

/// Produced image bytes grouped by output node id, in manifest order.
pub type GeneratedImages = BTreeMap<String, Vec<Vec<u8>>>;

/// Orchestrates one render service and one template registry.
pub struct Generator<B> {
    backend: B,
    registry: Arc<WorkflowRegistry>,
    client_id: String,
    poll: PollConfig,
    retry: RetryConfig,
    /// WebSocket base URL when completion is push-based.
    push_url: Option<String>,
}

impl Generator<ComfyUIApi> {
    /// Build a generator talking HTTP to the configured ComfyUI server.
    pub fn from_config(config: &ComfyUIConfig) -> Result<Self, crate::api::ComfyUIApiError> {
        let api = ComfyUIApi::with_timeout(config.api_url(), config.http_timeout)?;
        let registry = Arc::new(WorkflowRegistry::with_builtin(
            config.workflows_dir.clone(),
            config.active_workflow.clone(),
        ));

        let push_url = match config.completion {
            CompletionStrategy::Poll => None,
            CompletionStrategy::Push => Some(config.ws_url()),
        };

        Ok(Generator::new(api, registry)
            .with_poll_config(config.poll.clone())
            .with_retry(config.retry.clone())
            .with_push_channel(push_url))
    }
}

impl<B: RenderBackend> Generator<B> {
    /// Create a generator with a fresh client session id and default
    /// poll/retry settings.
    pub fn new(backend: B, registry: Arc<WorkflowRegistry>) -> Self {
        Self {
            backend,
            registry,
            client_id: uuid::Uuid::new_v4().to_string(),
            poll: PollConfig::default(),
            retry: RetryConfig::default(),
            push_url: None,
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Use the WebSocket push channel at `ws_url` for completion, or
    /// polling when `None`.
    pub fn with_push_channel(mut self, ws_url: Option<String>) -> Self {
        self.push_url = ws_url;
        self
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Generate images with the active workflow.
    pub async fn generate(&self, overrides: PromptFields) -> Result<GeneratedImages, GenerationError> {
        self.generate_with(None, overrides).await
    }

    /// Generate images with workflow `workflow` (or the active one).
    ///
    /// Returns every produced artifact grouped by node id. Nodes with an
    /// empty artifact list are omitted. Any failure aborts the whole
    /// call; there are no partial results.
    pub async fn generate_with(
        &self,
        workflow: Option<&str>,
        overrides: PromptFields,
    ) -> Result<GeneratedImages, GenerationError> {
        let spec = self.registry.build(workflow, overrides).await?;
        let prompt_id = uuid::Uuid::new_v4().to_string();

        let entry = match &self.push_url {
            None => {
                self.submit(&spec, &prompt_id).await?;
                wait_until_done(&self.backend, &prompt_id, &self.poll, &self.retry).await?
            }
            Some(ws_url) => self.submit_and_watch(ws_url, &spec, &prompt_id).await?,
        };

        let images = self.fetch_outputs(&prompt_id, &entry).await?;
        tracing::info!(
            prompt_id = %prompt_id,
            nodes = images.len(),
            images = images.values().map(Vec::len).sum::<usize>(),
            "Generation finished",
        );
        Ok(images)
    }

    // ---- private helpers ----

    async fn submit(&self, spec: &JobSpec, prompt_id: &str) -> Result<(), GenerationError> {
        let response = self
            .backend
            .submit(spec, &self.client_id, prompt_id)
            .await
            .map_err(|source| GenerationError::SubmissionFailed {
                prompt_id: prompt_id.to_string(),
                source,
            })?;

        tracing::info!(
            prompt_id,
            client_id = %self.client_id,
            queue_number = ?response.number,
            "Prompt submitted",
        );
        Ok(())
    }

    /// Open the push channel before submitting so the completion message
    /// cannot be missed, then confirm the manifest through history.
    async fn submit_and_watch(
        &self,
        ws_url: &str,
        spec: &JobSpec,
        prompt_id: &str,
    ) -> Result<HistoryEntry, GenerationError> {
        let started = Instant::now();
        let mut conn = client::connect(ws_url, &self.client_id)
            .await
            .map_err(|e| GenerationError::PushChannel {
                prompt_id: prompt_id.to_string(),
                reason: e.to_string(),
            })?;

        self.submit(spec, prompt_id).await?;
        wait_for_completion(&mut conn.stream, prompt_id, self.poll.max_wait).await?;

        // History can lag the push message briefly; poll out the rest of
        // the budget rather than failing on the first empty read.
        let remaining = PollConfig {
            interval: self.poll.interval,
            max_wait: self.poll.max_wait.saturating_sub(started.elapsed()),
        };
        wait_until_done(&self.backend, prompt_id, &remaining, &self.retry).await
    }

    /// Download every artifact of every non-empty node. Artifacts of one
    /// node are fetched concurrently and kept in manifest order.
    async fn fetch_outputs(
        &self,
        prompt_id: &str,
        entry: &HistoryEntry,
    ) -> Result<GeneratedImages, GenerationError> {
        let mut images = GeneratedImages::new();

        for (node_id, output) in &entry.outputs {
            if output.images.is_empty() {
                continue;
            }
            let fetches = output
                .images
                .iter()
                .map(|image| self.fetch(prompt_id, image));
            let bytes = futures::future::try_join_all(fetches).await?;
            tracing::debug!(prompt_id, node_id = %node_id, count = bytes.len(), "Fetched node outputs");
            images.insert(node_id.clone(), bytes);
        }

        Ok(images)
    }

    async fn fetch(&self, prompt_id: &str, image: &ImageRef) -> Result<Vec<u8>, GenerationError> {
        retry_transient(&self.retry, "view", || self.backend.view(image))
            .await
            .map_err(|source| GenerationError::ArtifactFetchFailed {
                prompt_id: prompt_id.to_string(),
                filename: image.filename.clone(),
                subfolder: image.subfolder.clone(),
                kind: image.kind.clone(),
                source,
            })
    }
}
