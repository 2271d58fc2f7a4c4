//! Execution history records returned by `GET /history/{prompt_id}`.
//!
//! The response is an object keyed by prompt id. Each record carries an
//! `outputs` manifest mapping node ids to the artifacts they produced:
//!
//! ```json
//! {
//!   "<prompt_id>": {
//!     "outputs": {
//!       "9": { "images": [{ "filename": "out.png", "subfolder": "", "type": "output" }] }
//!     },
//!     "status": { "status_str": "success", "completed": true }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Full `/history/{prompt_id}` response.
pub type History = HashMap<String, HistoryEntry>;

/// One prompt's history record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    /// Output manifest: node id to produced artifacts.
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
    /// Server-reported status block. Logged only; completion is decided
    /// from `outputs`.
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
}

/// Artifacts produced by a single node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// Descriptor of one retrievable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Storage kind, e.g. `output` or `temp`.
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl HistoryEntry {
    /// True once the manifest is non-empty and at least one node has
    /// produced a non-empty artifact list.
    pub fn is_complete(&self) -> bool {
        !self.outputs.is_empty() && self.outputs.values().any(|o| !o.images.is_empty())
    }

    /// Total number of artifacts across all nodes.
    pub fn artifact_count(&self) -> usize {
        self.outputs.values().map(|o| o.images.len()).sum()
    }
}
