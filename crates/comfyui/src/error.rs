use std::time::Duration;

use easel_core::WorkflowError;

use crate::api::ComfyUIApiError;

/// Terminal failures of a single generation.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Template lookup, loading or override resolution failed.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Failed to submit prompt {prompt_id}: {source}")]
    SubmissionFailed {
        prompt_id: String,
        #[source]
        source: ComfyUIApiError,
    },

    #[error("Prompt {prompt_id} did not finish within {elapsed:?}")]
    PollTimeout { prompt_id: String, elapsed: Duration },

    #[error("Transport error while waiting for prompt {prompt_id}: {source}")]
    Transport {
        prompt_id: String,
        #[source]
        source: ComfyUIApiError,
    },

    #[error("Failed to fetch {filename} (subfolder '{subfolder}', type '{kind}') for prompt {prompt_id}: {source}")]
    ArtifactFetchFailed {
        prompt_id: String,
        filename: String,
        subfolder: String,
        kind: String,
        #[source]
        source: ComfyUIApiError,
    },

    /// The server reported an execution error over the push channel.
    #[error("Prompt {prompt_id} failed on node {node_id}: {message}")]
    ExecutionFailed {
        prompt_id: String,
        node_id: String,
        message: String,
    },

    #[error("Push channel error for prompt {prompt_id}: {reason}")]
    PushChannel { prompt_id: String, reason: String },
}
