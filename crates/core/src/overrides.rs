//! Overridable prompt fields and the typed paths that locate them.
//!
//! Each template declares where its positive text, negative text and
//! seed live as an [`InputPath`] (`node_id` + input name). Defaults are
//! read through the same paths, and caller overrides are written back
//! through them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflow::{GraphError, InputValue, NodeId, WorkflowGraph};

/// The recognised overridable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideField {
    Positive,
    Negative,
    Seed,
}

impl OverrideField {
    pub const ALL: [OverrideField; 3] = [
        OverrideField::Positive,
        OverrideField::Negative,
        OverrideField::Seed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OverrideField::Positive => "positive",
            OverrideField::Negative => "negative",
            OverrideField::Seed => "seed",
        }
    }

    fn expected_kind(self) -> &'static str {
        match self {
            OverrideField::Positive | OverrideField::Negative => "a string literal",
            OverrideField::Seed => "an unsigned integer literal",
        }
    }
}

impl fmt::Display for OverrideField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a literal input inside a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPath {
    pub node_id: NodeId,
    pub input: String,
}

impl InputPath {
    pub fn new(node_id: impl Into<NodeId>, input: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            input: input.into(),
        }
    }

    /// Read the input at this path. `None` if the node or input is absent.
    pub fn get<'a>(&self, graph: &'a WorkflowGraph) -> Option<&'a InputValue> {
        graph.node(&self.node_id)?.inputs.get(&self.input)
    }

    /// Write `value` at this path. The node must exist; the input is
    /// inserted if absent.
    pub fn set(
        &self,
        graph: &mut WorkflowGraph,
        field: OverrideField,
        value: InputValue,
    ) -> Result<(), GraphError> {
        let node = graph
            .node_mut(&self.node_id)
            .ok_or_else(|| GraphError::OverrideTargetMissing {
                field: field.as_str(),
                node_id: self.node_id.clone(),
            })?;
        node.inputs.insert(self.input.clone(), value);
        Ok(())
    }
}

impl fmt::Display for InputPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.inputs.{}", self.node_id, self.input)
    }
}

/// Per-template mapping from field to its location in the graph.
pub type FieldPaths = BTreeMap<OverrideField, InputPath>;

/// A typed value for one of the overridable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideValue {
    Text(String),
    Seed(u64),
}

impl OverrideValue {
    /// Interpret a graph input as a value for `field`.
    ///
    /// Fails if the input is a link or a literal of the wrong kind.
    fn from_input(
        field: OverrideField,
        path: &InputPath,
        input: &InputValue,
    ) -> Result<Self, GraphError> {
        let literal = input.as_literal();
        let value = match field {
            OverrideField::Positive | OverrideField::Negative => literal
                .and_then(|v| v.as_str())
                .map(|s| OverrideValue::Text(s.to_string())),
            OverrideField::Seed => literal.and_then(|v| v.as_u64()).map(OverrideValue::Seed),
        };
        value.ok_or_else(|| GraphError::OverrideKind {
            field: field.as_str(),
            path: path.to_string(),
            expected: field.expected_kind(),
        })
    }

    fn into_input(self) -> InputValue {
        match self {
            OverrideValue::Text(s) => InputValue::Literal(serde_json::Value::String(s)),
            OverrideValue::Seed(n) => InputValue::Literal(serde_json::Value::from(n)),
        }
    }
}

/// Values for the three overridable fields, each optional.
///
/// Used both for caller-supplied overrides and for template defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptFields {
    pub positive: Option<String>,
    pub negative: Option<String>,
    pub seed: Option<u64>,
}

impl PromptFields {
    /// Overrides carrying only positive text.
    pub fn positive(text: impl Into<String>) -> Self {
        Self {
            positive: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_negative(mut self, text: impl Into<String>) -> Self {
        self.negative = Some(text.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn get(&self, field: OverrideField) -> Option<OverrideValue> {
        match field {
            OverrideField::Positive => self.positive.clone().map(OverrideValue::Text),
            OverrideField::Negative => self.negative.clone().map(OverrideValue::Text),
            OverrideField::Seed => self.seed.map(OverrideValue::Seed),
        }
    }

    fn insert(&mut self, field: OverrideField, value: OverrideValue) {
        match (field, value) {
            (OverrideField::Positive, OverrideValue::Text(s)) => self.positive = Some(s),
            (OverrideField::Negative, OverrideValue::Text(s)) => self.negative = Some(s),
            (OverrideField::Seed, OverrideValue::Seed(n)) => self.seed = Some(n),
            // from_input only yields the kind matching the field
            _ => {}
        }
    }

    /// Field-wise `self` if present, else `fallback`.
    pub fn or(self, fallback: PromptFields) -> PromptFields {
        PromptFields {
            positive: self.positive.or(fallback.positive),
            negative: self.negative.or(fallback.negative),
            seed: self.seed.or(fallback.seed),
        }
    }
}

/// Read each field's current value out of `graph`.
///
/// A path whose node or input is absent contributes no default. A path
/// that resolves to a link or a literal of the wrong kind is an error.
pub fn extract_defaults(
    graph: &WorkflowGraph,
    paths: &FieldPaths,
) -> Result<PromptFields, GraphError> {
    let mut defaults = PromptFields::default();
    for (&field, path) in paths {
        let Some(input) = path.get(graph) else {
            continue;
        };
        let value = OverrideValue::from_input(field, path, input)?;
        defaults.insert(field, value);
    }
    Ok(defaults)
}

/// Write every present value in `resolved` into `graph` at its path.
///
/// Fields without a configured path are skipped.
pub fn apply_overrides(
    graph: &mut WorkflowGraph,
    paths: &FieldPaths,
    resolved: &PromptFields,
) -> Result<(), GraphError> {
    for field in OverrideField::ALL {
        let (Some(value), Some(path)) = (resolved.get(field), paths.get(&field)) else {
            continue;
        };
        path.set(graph, field, value.into_input())?;
    }
    Ok(())
}
