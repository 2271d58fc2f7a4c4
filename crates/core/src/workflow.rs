//! Typed model of a ComfyUI job graph ("API format" workflow).
//!
//! A workflow is a JSON object keyed by node id, where every node has a
//! `class_type` and a map of `inputs`:
//!
//! ```json
//! {
//!   "3": {
//!     "class_type": "KSampler",
//!     "inputs": { "seed": 42, "model": ["4", 0] }
//!   }
//! }
//! ```
//!
//! Inputs are either literal values or links to another node's output
//! slot, encoded as a two-element `[node_id, slot]` array. Links are
//! checked at parse time so that a template referencing a missing node
//! is rejected before any override is applied.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String key identifying a node within a workflow graph.
pub type NodeId = String;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A parsed workflow graph.
///
/// Serializes back to the same object-of-nodes shape it was parsed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: BTreeMap<NodeId, WorkflowNode>,
}

/// A single node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// ComfyUI class type (e.g. "KSampler", "CLIPTextEncode").
    pub class_type: String,
    /// Input name to literal value or link. Omitted on output when the
    /// node had none.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputValue>,
    /// Node-level keys we do not interpret (e.g. `_meta`), kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The value bound to a node input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    /// Reference to another node's output slot.
    Link(NodeLink),
    /// Any literal JSON value (string, number, bool, ...).
    Literal(serde_json::Value),
}

/// A `[node_id, slot]` connection to another node's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLink(pub NodeId, pub u32);

impl NodeLink {
    /// Id of the node this link points at.
    pub fn node_id(&self) -> &str {
        &self.0
    }

    /// Output slot index on the target node.
    pub fn slot(&self) -> u32 {
        self.1
    }
}

/// Reasons a workflow document cannot be used as a template.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("workflow JSON must be an object")]
    NotAnObject,

    #[error("workflow JSON must contain at least one node")]
    Empty,

    #[error("node '{node_id}' is invalid: {source}")]
    InvalidNode {
        node_id: NodeId,
        #[source]
        source: serde_json::Error,
    },

    #[error("input '{node_id}.{input}' links to missing node '{target}'")]
    DanglingLink {
        node_id: NodeId,
        input: String,
        target: NodeId,
    },

    #[error("override '{field}' at '{path}' must be {expected}")]
    OverrideKind {
        field: &'static str,
        path: String,
        expected: &'static str,
    },

    #[error("override '{field}' targets missing node '{node_id}'")]
    OverrideTargetMissing { field: &'static str, node_id: NodeId },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl WorkflowGraph {
    /// Parse a workflow from raw JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, GraphError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::parse(value)
    }

    /// Parse a workflow from a JSON value, validating node shape and links.
    pub fn parse(value: serde_json::Value) -> Result<Self, GraphError> {
        let serde_json::Value::Object(obj) = value else {
            return Err(GraphError::NotAnObject);
        };
        if obj.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut nodes = BTreeMap::new();
        for (node_id, node_value) in obj {
            let node: WorkflowNode = serde_json::from_value(node_value).map_err(|source| {
                GraphError::InvalidNode {
                    node_id: node_id.clone(),
                    source,
                }
            })?;
            nodes.insert(node_id, node);
        }

        let graph = Self { nodes };
        graph.check_links()?;
        Ok(graph)
    }

    /// Every link must point at a node that exists in this graph.
    fn check_links(&self) -> Result<(), GraphError> {
        for (node_id, node) in &self.nodes {
            for (input, value) in &node.inputs {
                if let InputValue::Link(link) = value {
                    if !self.nodes.contains_key(link.node_id()) {
                        return Err(GraphError::DanglingLink {
                            node_id: node_id.clone(),
                            input: input.clone(),
                            target: link.node_id().to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(node_id)
    }

    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(node_id)
    }

    /// Iterate nodes in node-id order.
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &WorkflowNode)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Serialize to a JSON value suitable for a `/prompt` request body.
    pub fn to_json(&self) -> serde_json::Value {
        // Map keys are strings and every value is already JSON; this cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl InputValue {
    /// The literal value, if this input is not a link.
    pub fn as_literal(&self) -> Option<&serde_json::Value> {
        match self {
            InputValue::Literal(v) => Some(v),
            InputValue::Link(_) => None,
        }
    }
}
