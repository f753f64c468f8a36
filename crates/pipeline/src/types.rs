//! Shared value types for the dispatch domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! the structure that flows through a request: the resolved workflow
//! definition, the per-request [`Context`] handed to nodes, the node response,
//! and the resource metrics reported by the execution engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{NodeName, RequestId, StepName};

// ---------------------------------------------------------------------------
// Runtime kinds
// ---------------------------------------------------------------------------

/// Execution-environment tag for a node.
///
/// Derived from the declared step `type` string with [`RuntimeKind::from_declared`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RuntimeKind {
    /// Executed by an out-of-process python3 runtime.
    #[serde(rename = "runtime.python3")]
    Python3,
    /// A node registered locally by the host application.
    #[serde(rename = "local")]
    Local,
    /// A node shipped as a module in the static capability registry.
    #[default]
    #[serde(rename = "module")]
    Module,
}

impl RuntimeKind {
    /// Maps a declared step type to a runtime kind.
    ///
    /// `"runtime.python3"` → [`RuntimeKind::Python3`], `"local"` →
    /// [`RuntimeKind::Local`], anything else (including a missing type) →
    /// [`RuntimeKind::Module`].
    pub fn from_declared(declared: Option<&str>) -> Self {
        match declared {
            Some("runtime.python3") => Self::Python3,
            Some("local") => Self::Local,
            _ => Self::Module,
        }
    }

    /// Returns the declared type string for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python3 => "runtime.python3",
            Self::Local => "local",
            Self::Module => "module",
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Workflow definitions
// ---------------------------------------------------------------------------

/// The entry condition of a workflow: a kind (e.g. `"http"`) and its
/// free-form configuration object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: String,
    pub config: Map<String, Value>,
}

/// Method and path pattern an HTTP trigger accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRoute {
    /// Configured method; `None` or `"*"` accepts any method.
    pub method: Option<String>,
    /// Route pattern understood by [`crate::routing`]. Empty when the trigger
    /// declares no path, which never validates.
    pub path: String,
}

impl HttpRoute {
    /// Returns `true` if `method` satisfies the configured method.
    pub fn accepts_method(&self, method: &str) -> bool {
        match self.method.as_deref() {
            None | Some("*") | Some("") => true,
            Some(configured) => configured.eq_ignore_ascii_case(method),
        }
    }
}

impl Trigger {
    /// Returns the HTTP route of this trigger, or `None` when the workflow is
    /// not triggered over HTTP.
    pub fn http_route(&self) -> Option<HttpRoute> {
        if self.kind != "http" {
            return None;
        }
        let text = |key: &str| {
            self.config
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
        };
        Some(HttpRoute {
            method: text("method"),
            path: text("path").unwrap_or_default(),
        })
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: StepName,
    /// The node this step invokes.
    pub node: NodeName,
    pub runtime: RuntimeKind,
    /// Inputs handed to the node's `handle` call. `Value::Null` when the
    /// workflow document declares none.
    pub inputs: Value,
}

/// A resolved, executable workflow.
///
/// Pre-registered workflows live for the lifetime of the process; ephemeral
/// ones (built for a single remote node call) live for exactly one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub version: String,
    pub description: String,
    pub trigger: Trigger,
    pub steps: Vec<Step>,
}

/// Shared handle to a workflow definition, as returned by the registry.
pub type ResolvedWorkflow = Arc<WorkflowDefinition>;

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

/// The inbound HTTP request as seen by nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestContext {
    pub method: String,
    /// Path relative to the workflow segment (always starts with `/`).
    pub path: String,
    pub params: BTreeMap<String, String>,
    /// Query parameters with `requestId` already removed. A key repeated in
    /// the query string holds an array of its values in order.
    pub query: BTreeMap<String, Value>,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

/// Body of a node (and therefore HTTP) response.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseBody {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

impl ResponseBody {
    /// Renders the body as the bytes written to the HTTP response.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Empty => Vec::new(),
            Self::Json(value) => serde_json::to_vec(value).unwrap_or_default(),
            Self::Text(text) => text.clone().into_bytes(),
            Self::Binary(bytes) => bytes.clone(),
        }
    }
}

// Binary bodies cross JSON boundaries (python3 runtime) as base64 text.
impl Serialize for ResponseBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_none(),
            Self::Json(value) => value.serialize(serializer),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Binary(bytes) => serializer
                .serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }
}

/// What a node hands back: a body plus an optional content type.
///
/// A missing content type is resolved to `application/json` when the HTTP
/// response is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeResponse {
    #[serde(rename = "data")]
    pub body: ResponseBody,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
}

impl NodeResponse {
    /// A JSON response with the default content type.
    pub fn json(value: Value) -> Self {
        Self {
            body: ResponseBody::Json(value),
            content_type: None,
        }
    }

    /// A text response with an explicit content type (e.g. `text/html`).
    pub fn text(text: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            body: ResponseBody::Text(text.into()),
            content_type: Some(content_type.into()),
        }
    }

    /// A binary response with an explicit content type (e.g. `application/pdf`).
    pub fn binary(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            body: ResponseBody::Binary(bytes),
            content_type: Some(content_type.into()),
        }
    }
}

/// Per-request state threaded through every step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    pub id: RequestId,
    pub workflow_name: String,
    pub started_at: DateTime<Utc>,
    pub request: RequestContext,
    pub response: NodeResponse,
    /// Scratch variables shared between steps.
    pub vars: Map<String, Value>,
}

impl Context {
    /// Creates an empty context for `request`.
    pub fn new(id: RequestId, workflow_name: impl Into<String>, request: RequestContext) -> Self {
        Self {
            id,
            workflow_name: workflow_name.into(),
            started_at: Utc::now(),
            request,
            response: NodeResponse::default(),
            vars: Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution metrics
// ---------------------------------------------------------------------------

/// Resident memory observed while a workflow ran, in megabytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MemoryMetrics {
    pub min_mb: f64,
    pub avg_mb: f64,
    pub max_mb: f64,
}

/// CPU consumption of a workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuMetrics {
    /// CPU time as a percentage of wall-clock time.
    pub percentage: f64,
    /// CPU time consumed, in seconds.
    pub usage: f64,
    /// Logical cores available to the process.
    pub total: usize,
    pub model: String,
}

/// Resource usage reported by the execution engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionMetrics {
    pub elapsed: Duration,
    pub memory: MemoryMetrics,
    pub cpu: CpuMetrics,
}

/// Result of a successful workflow execution.
#[derive(Debug, Clone)]
pub struct Execution {
    pub context: Context,
    pub metrics: ExecutionMetrics,
}
