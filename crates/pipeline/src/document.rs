//! Workflow documents: the JSON form of a workflow.
//!
//! The same shape describes pre-registered workflows on disk and the one-step
//! template a client embeds in a remote node call:
//!
//! ```json
//! {
//!   "name": "World Countries",
//!   "version": "1.0.0",
//!   "description": "",
//!   "trigger": { "http": { "method": "GET", "path": "/", "accept": "application/json" } },
//!   "steps": [ { "name": "get-countries", "node": "@nanoservice-ts/api-call", "type": "module" } ],
//!   "nodes": { "get-countries": { "inputs": { "url": "https://example.com" } } }
//! }
//! ```
//!
//! Documents are parsed leniently (every field optional) and validated when
//! turned into a [`WorkflowDefinition`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{NodeName, RuntimeKind, Step, StepName, Trigger, WorkflowDefinition};

/// Why a document could not become a [`WorkflowDefinition`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("workflow declares no steps")]
    NoSteps,

    #[error("step {index} has no name")]
    UnnamedStep { index: usize },

    #[error("step {step} names no node")]
    MissingNode { step: String },
}

/// One entry of a document's `steps` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    /// Declared runtime type (`"module"`, `"local"`, `"runtime.python3"`).
    #[serde(default, rename = "type")]
    pub node_type: Option<String>,
    /// Inline inputs. Take precedence over the `nodes` map.
    #[serde(default)]
    pub inputs: Option<Value>,
}

/// One entry of a document's `nodes` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    #[serde(default)]
    pub inputs: Option<Value>,
}

/// A workflow as written in JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    /// `{ <kind>: <config> }`; only the first entry is used.
    #[serde(default)]
    pub trigger: Map<String, Value>,
    #[serde(default)]
    pub steps: Vec<StepDocument>,
    #[serde(default)]
    pub nodes: Map<String, Value>,
}

impl WorkflowDocument {
    /// Returns the document's trigger: the first key is the kind, its value
    /// the configuration. A missing or non-object configuration is empty.
    pub fn trigger(&self) -> Trigger {
        match self.trigger.iter().next() {
            Some((kind, config)) => Trigger {
                kind: kind.clone(),
                config: config.as_object().cloned().unwrap_or_default(),
            },
            None => Trigger {
                kind: "http".to_owned(),
                config: Map::new(),
            },
        }
    }

    /// Inputs declared for `key` in the `nodes` map, or `Value::Null`.
    pub fn node_inputs(&self, key: &str) -> Value {
        self.nodes
            .get(key)
            .and_then(|entry| entry.get("inputs"))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Validates the document and resolves every step.
    pub fn into_definition(self) -> Result<WorkflowDefinition, DocumentError> {
        if self.steps.is_empty() {
            return Err(DocumentError::NoSteps);
        }

        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let name = step
                    .name
                    .as_deref()
                    .and_then(StepName::new)
                    .ok_or(DocumentError::UnnamedStep { index })?;
                let node = step
                    .node
                    .as_deref()
                    .and_then(NodeName::new)
                    .ok_or_else(|| DocumentError::MissingNode {
                        step: name.to_string(),
                    })?;
                let inputs = step
                    .inputs
                    .clone()
                    .unwrap_or_else(|| self.node_inputs(name.as_str()));
                Ok(Step {
                    runtime: RuntimeKind::from_declared(step.node_type.as_deref()),
                    name,
                    node,
                    inputs,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(WorkflowDefinition {
            trigger: self.trigger(),
            name: self.name,
            version: self.version,
            description: self.description,
            steps,
        })
    }
}

/// The decoded body of a remote node call: `{ request, workflow }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteNodePayload {
    /// Request data the caller wants the node to see as its request body.
    #[serde(default)]
    pub request: Value,
    pub workflow: WorkflowDocument,
}
