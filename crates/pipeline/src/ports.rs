//! Port traits implemented by infrastructure crates.
//!
//! | Trait | Implemented by |
//! |-------|----------------|
//! | [`Node`] | built-in nodes in `nodes`, host-application nodes |
//! | [`RuntimeBridge`] | `nodes::HttpRuntimeBridge` (python3 runtime) |
//! | [`ExecutionEngine`] | `nodes::WorkflowRunner` |
//! | [`MetricsSink`] | `listener::OtelMetricsSink` |

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    Context, DispatchError, DispatchTarget, ErrorKind, Execution, NodeError, NodeName,
    NodeResponse, ResolvedWorkflow, RoutingError, WorkflowRegistry,
};

/// A unit of compute invoked as one workflow step.
#[async_trait]
pub trait Node: Send + Sync {
    /// Handles one step. `inputs` are the step's declared inputs.
    async fn handle(&self, ctx: &Context, inputs: &Value) -> Result<NodeResponse, NodeError>;
}

/// Executes nodes that live outside this process (e.g. the python3 runtime).
#[async_trait]
pub trait RuntimeBridge: Send + Sync {
    async fn invoke(
        &self,
        node: &NodeName,
        ctx: &Context,
        inputs: &Value,
    ) -> Result<NodeResponse, NodeError>;
}

/// Runs a resolved workflow.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Resolves `target` to the workflow that will run.
    fn configure(
        &self,
        target: &DispatchTarget,
        registry: &WorkflowRegistry,
    ) -> Result<ResolvedWorkflow, DispatchError> {
        registry
            .resolve(target)
            .ok_or_else(|| RoutingError::UnknownWorkflow(target.to_string()).into())
    }

    /// Executes every step of `workflow` against `ctx`.
    async fn execute(
        &self,
        workflow: ResolvedWorkflow,
        ctx: Context,
    ) -> Result<Execution, DispatchError>;
}

/// Tags attached to the failure counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureTags {
    pub env: String,
    pub workflow_name: String,
    pub workflow_version: String,
    pub kind: ErrorKind,
}

/// Counts failed requests.
pub trait MetricsSink: Send + Sync {
    fn record_failure(&self, tags: &FailureTags);
}
