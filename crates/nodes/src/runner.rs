//! The reference [`ExecutionEngine`].
//!
//! Runs the steps of a workflow in declaration order. Each step sees the
//! previous step's response in `ctx.response` and replaces it with its own;
//! the first failing step ends the run.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    Context, DispatchError, Execution, ExecutionEngine, NodeError, NodeResponse,
    ResolvedWorkflow, RuntimeBridge, RuntimeKind, Step,
};
use tracing::Instrument;

use crate::{NodeRegistry, ResourceSampler};

pub struct WorkflowRunner {
    nodes: Arc<NodeRegistry>,
    python3: Option<Arc<dyn RuntimeBridge>>,
}

impl std::fmt::Debug for WorkflowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRunner")
            .field("nodes", &self.nodes)
            .field("python3", &self.python3.is_some())
            .finish()
    }
}

impl WorkflowRunner {
    pub fn new(nodes: Arc<NodeRegistry>) -> Self {
        Self {
            nodes,
            python3: None,
        }
    }

    /// Routes `runtime.python3` steps through `bridge`.
    #[must_use]
    pub fn with_python3(mut self, bridge: Arc<dyn RuntimeBridge>) -> Self {
        self.python3 = Some(bridge);
        self
    }

    async fn run_step(&self, step: &Step, ctx: &Context) -> Result<NodeResponse, DispatchError> {
        let result = match step.runtime {
            RuntimeKind::Python3 => {
                let bridge = self.python3.as_ref().ok_or_else(|| {
                    DispatchError::Internal(format!(
                        "No {} runtime configured for node {}",
                        RuntimeKind::Python3,
                        step.node
                    ))
                })?;
                bridge.invoke(&step.node, ctx, &step.inputs).await
            }
            RuntimeKind::Local | RuntimeKind::Module => {
                let node = self.nodes.create(step.node.as_str()).ok_or_else(|| {
                    DispatchError::Internal(format!("Node not found: {}", step.node))
                })?;
                node.handle(ctx, &step.inputs).await
            }
        };
        result.map_err(|error| attribute(error, step).into())
    }
}

/// Names the failing node when the node did not name itself.
fn attribute(mut error: NodeError, step: &Step) -> NodeError {
    if error.name.is_none() {
        error.name = Some(step.node.to_string());
    }
    error
}

#[async_trait]
impl ExecutionEngine for WorkflowRunner {
    async fn execute(
        &self,
        workflow: ResolvedWorkflow,
        mut ctx: Context,
    ) -> Result<Execution, DispatchError> {
        let mut sampler = ResourceSampler::start();

        for step in &workflow.steps {
            let span = tracing::debug_span!(
                "step",
                step = %step.name,
                node = %step.node,
                runtime = %step.runtime,
            );
            let response = self.run_step(step, &ctx).instrument(span).await;
            sampler.sample();
            ctx.response = response?;
        }

        Ok(Execution {
            context: ctx,
            metrics: sampler.finish(),
        })
    }
}
