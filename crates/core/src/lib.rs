//! Job template model and job descriptor builder.
//!
//! Parses ComfyUI workflow templates into a typed graph, locates the
//! overridable prompt fields, and builds submittable job specifications
//! from named templates.

pub mod error;
pub mod overrides;
pub mod registry;
pub mod workflow;

pub use error::WorkflowError;
pub use overrides::{FieldPaths, InputPath, OverrideField, PromptFields};
pub use registry::{JobSpec, WorkflowConfig, WorkflowRegistry, DEFAULT_WORKFLOW_NAME};
pub use workflow::{GraphError, WorkflowGraph};
