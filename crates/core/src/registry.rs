//! Named workflow templates and the job descriptor builder.
//!
//! [`WorkflowRegistry`] maps template names to files on disk together
//! with the [`FieldPaths`] used to override them. Templates are read
//! fresh on every [`build`](WorkflowRegistry::build) so stored files are
//! never mutated and edits on disk are picked up immediately.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::WorkflowError;
use crate::overrides::{
    apply_overrides, extract_defaults, FieldPaths, InputPath, OverrideField, PromptFields,
};
use crate::workflow::WorkflowGraph;

/// Name of the built-in default template.
pub const DEFAULT_WORKFLOW_NAME: &str = "illustrious";

/// Descriptor for one template file and its overridable fields.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub name: String,
    /// File name relative to the registry directory.
    pub filename: String,
    pub field_paths: FieldPaths,
}

impl WorkflowConfig {
    /// The built-in SDXL "illustrious" template.
    pub fn illustrious() -> Self {
        Self {
            name: DEFAULT_WORKFLOW_NAME.to_string(),
            filename: "illustrious.json".to_string(),
            field_paths: FieldPaths::from([
                (OverrideField::Positive, InputPath::new("12", "text")),
                (OverrideField::Negative, InputPath::new("7", "text")),
                (OverrideField::Seed, InputPath::new("3", "seed")),
            ]),
        }
    }
}

/// A template with overrides applied, ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JobSpec {
    graph: WorkflowGraph,
}

impl JobSpec {
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn into_graph(self) -> WorkflowGraph {
        self.graph
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.graph.to_json()
    }
}

/// Set of known templates plus the currently active selection.
pub struct WorkflowRegistry {
    dir: PathBuf,
    configs: BTreeMap<String, WorkflowConfig>,
    active: RwLock<String>,
}

impl WorkflowRegistry {
    /// Create a registry over `dir` with the given templates.
    ///
    /// `active` need not be registered; [`active_workflow`](Self::active_workflow)
    /// falls back to the first registered name.
    pub fn new(
        dir: impl Into<PathBuf>,
        configs: impl IntoIterator<Item = WorkflowConfig>,
        active: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            configs: configs.into_iter().map(|c| (c.name.clone(), c)).collect(),
            active: RwLock::new(active.into()),
        }
    }

    /// Registry with only the built-in templates.
    pub fn with_builtin(dir: impl Into<PathBuf>, active: impl Into<String>) -> Self {
        Self::new(dir, [WorkflowConfig::illustrious()], active)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Registered template names, sorted.
    pub fn list_workflows(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }

    /// The active template name.
    ///
    /// If the stored selection is not registered, the first registered
    /// name becomes active.
    pub async fn active_workflow(&self) -> Result<String, WorkflowError> {
        {
            let active = self.active.read().await;
            if self.configs.contains_key(active.as_str()) {
                return Ok(active.clone());
            }
        }

        let first = self
            .configs
            .keys()
            .next()
            .cloned()
            .ok_or(WorkflowError::NoTemplates)?;

        let mut active = self.active.write().await;
        tracing::warn!(
            configured = %active,
            fallback = %first,
            "Active workflow not registered, falling back",
        );
        *active = first.clone();
        Ok(first)
    }

    /// Switch the active template.
    pub async fn set_active(&self, name: &str) -> Result<(), WorkflowError> {
        self.config(name)?;
        *self.active.write().await = name.to_string();
        tracing::info!(workflow = %name, "Active workflow changed");
        Ok(())
    }

    /// Defaults for the overridable fields of `name` (or the active template).
    pub async fn defaults(&self, name: Option<&str>) -> Result<PromptFields, WorkflowError> {
        let (config, graph) = self.load(name).await?;
        extract_defaults(&graph, &config.field_paths).map_err(|source| {
            WorkflowError::MalformedTemplate {
                name: config.name.clone(),
                source,
            }
        })
    }

    /// Build a job specification from template `name` (or the active one).
    ///
    /// Each field resolves to the override if given, else the template
    /// default. Positive text is required after resolution. Only the
    /// resolved fields are written; every other node stays as loaded.
    pub async fn build(
        &self,
        name: Option<&str>,
        overrides: PromptFields,
    ) -> Result<JobSpec, WorkflowError> {
        let (config, mut graph) = self.load(name).await?;
        let malformed = |source| WorkflowError::MalformedTemplate {
            name: config.name.clone(),
            source,
        };

        let defaults = extract_defaults(&graph, &config.field_paths).map_err(malformed)?;
        let resolved = overrides.or(defaults);

        if resolved.positive.is_none() {
            return Err(WorkflowError::MissingRequiredField {
                name: config.name.clone(),
                field: OverrideField::Positive,
            });
        }

        apply_overrides(&mut graph, &config.field_paths, &resolved).map_err(malformed)?;

        tracing::debug!(
            workflow = %config.name,
            seed = ?resolved.seed,
            has_negative = resolved.negative.is_some(),
            "Built job specification",
        );

        Ok(JobSpec { graph })
    }

    // ---- private helpers ----

    fn config(&self, name: &str) -> Result<&WorkflowConfig, WorkflowError> {
        self.configs
            .get(name)
            .ok_or_else(|| WorkflowError::UnknownTemplate {
                name: name.to_string(),
                available: self.list_workflows(),
            })
    }

    /// Resolve `name` and read its graph fresh from disk.
    async fn load(
        &self,
        name: Option<&str>,
    ) -> Result<(&WorkflowConfig, WorkflowGraph), WorkflowError> {
        let target = match name {
            Some(n) => n.to_string(),
            None => self.active_workflow().await?,
        };
        let config = self.config(&target)?;
        let path = self.dir.join(&config.filename);

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkflowError::TemplateFileMissing {
                    name: config.name.clone(),
                    path,
                });
            }
            Err(source) => return Err(WorkflowError::Io { path, source }),
        };

        let graph = WorkflowGraph::from_json_str(&text).map_err(|source| {
            WorkflowError::MalformedTemplate {
                name: config.name.clone(),
                source,
            }
        })?;

        Ok((config, graph))
    }
}
