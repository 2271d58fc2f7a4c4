use std::path::PathBuf;

use crate::overrides::OverrideField;
use crate::workflow::GraphError;

/// Failures while resolving, loading or building a workflow template.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Unknown workflow '{name}'. Available: {available:?}")]
    UnknownTemplate { name: String, available: Vec<String> },

    #[error("No workflows configured")]
    NoTemplates,

    #[error("Workflow file not found for '{name}': {}", path.display())]
    TemplateFileMissing { name: String, path: PathBuf },

    #[error("Failed to read workflow file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workflow '{name}' is malformed: {source}")]
    MalformedTemplate {
        name: String,
        #[source]
        source: GraphError,
    },

    #[error("{field} text is required but no default exists for workflow '{name}'")]
    MissingRequiredField { name: String, field: OverrideField },
}
