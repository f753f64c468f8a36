//! Ephemeral workflows for remote node calls.
//!
//! A remote node call carries a one-step workflow template. This module turns
//! that template plus the request path into a [`WorkflowDefinition`] that
//! names the addressed node, and registers it for the lifetime of the request.
//!
//! ## Node naming
//!
//! The node is addressed by the request path: the workflow segment followed by
//! the rest of the path, with one trailing `/` removed.
//!
//! | Request path | Prefix | Sub-path | Node |
//! |--------------|--------|----------|------|
//! | `/add` | `add` | `/` | `add` |
//! | `/tools/summarise` | `tools` | `/summarise` | `tools/summarise` |
//! | `/tools/summarise/` | `tools` | `/summarise/` | `tools/summarise` |

use std::sync::Arc;

use crate::{
    DispatchError, EphemeralRegistration, NodeName, RemoteNodePayload, RequestId, RuntimeKind,
    Step, StepName, WorkflowDefinition, WorkflowRegistry,
};

/// Key of the template's `nodes` entry that carries the step inputs.
const TEMPLATE_NODE_KEY: &str = "node";

/// Composes the fully-qualified remote node name.
pub fn qualified_node_name(prefix: &str, subpath: &str) -> String {
    let mut name = format!("{prefix}{subpath}");
    if name.ends_with('/') {
        name.pop();
    }
    name
}

/// Builds the one-step workflow for a remote node call.
pub fn build(
    payload: &RemoteNodePayload,
    prefix: &str,
    subpath: &str,
) -> Result<WorkflowDefinition, DispatchError> {
    let template = &payload.workflow;
    let step = template.steps.first().ok_or_else(|| {
        DispatchError::InvalidPayload("workflow template declares no steps".into())
    })?;

    let runtime = RuntimeKind::from_declared(step.node_type.as_deref());
    let qualified = qualified_node_name(prefix, subpath);
    let node = NodeName::new(qualified.as_str())
        .ok_or_else(|| DispatchError::InvalidPayload("request path names no node".into()))?;

    let step_name = StepName::new(TEMPLATE_NODE_KEY).ok_or_else(|| {
        DispatchError::Internal("template step name must not be empty".into())
    })?;

    Ok(WorkflowDefinition {
        name: format!("Remote Node: {qualified}"),
        version: "1.0.0".to_owned(),
        description: "Remote Node".to_owned(),
        trigger: template.trigger(),
        steps: vec![Step {
            name: step_name,
            node,
            runtime,
            inputs: template.node_inputs(TEMPLATE_NODE_KEY),
        }],
    })
}

/// Builds the workflow and inserts it into `registry` under `id`.
///
/// The returned registration owns the entry; dropping it removes the entry.
pub fn build_and_register(
    registry: &Arc<WorkflowRegistry>,
    id: &RequestId,
    payload: &RemoteNodePayload,
    prefix: &str,
    subpath: &str,
) -> Result<EphemeralRegistration, DispatchError> {
    let workflow = build(payload, prefix, subpath)?;
    tracing::debug!(
        request_id = %id,
        node = %workflow.steps[0].node,
        runtime = %workflow.steps[0].runtime,
        "registering ephemeral workflow"
    );
    EphemeralRegistration::acquire(Arc::clone(registry), id.clone(), workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(node_type: Option<&str>) -> RemoteNodePayload {
        let mut step = json!({ "name": "node", "node": "add" });
        if let Some(t) = node_type {
            step["type"] = json!(t);
        }
        serde_json::from_value(json!({
            "request": {},
            "workflow": {
                "name": "Remote Node",
                "version": "1.0.0",
                "trigger": { "http": { "method": "POST", "path": "*", "accept": "application/json" } },
                "steps": [step],
                "nodes": { "node": { "inputs": { "a": 1, "b": 2 } } }
            }
        }))
        .unwrap()
    }

    #[test]
    fn node_names_strip_a_single_trailing_slash() {
        assert_eq!(qualified_node_name("add", "/"), "add");
        assert_eq!(qualified_node_name("tools", "/summarise"), "tools/summarise");
        assert_eq!(qualified_node_name("tools", "/summarise/"), "tools/summarise");
        assert_eq!(qualified_node_name("tools", "/x//"), "tools/x/");
    }

    #[test]
    fn builds_a_single_python3_step() {
        let def = build(&payload(Some("runtime.python3")), "add", "/").unwrap();
        assert_eq!(def.name, "Remote Node: add");
        assert_eq!(def.steps.len(), 1);
        let step = &def.steps[0];
        assert_eq!(step.node.as_str(), "add");
        assert_eq!(step.runtime, RuntimeKind::Python3);
        assert_eq!(step.inputs, json!({ "a": 1, "b": 2 }));
        let route = def.trigger.http_route().unwrap();
        assert_eq!(route.method.as_deref(), Some("POST"));
        assert_eq!(route.path, "*");
    }

    #[test]
    fn runtime_defaults_to_module() {
        assert_eq!(build(&payload(None), "add", "/").unwrap().steps[0].runtime, RuntimeKind::Module);
        assert_eq!(
            build(&payload(Some("local")), "add", "/").unwrap().steps[0].runtime,
            RuntimeKind::Local
        );
    }

    #[test]
    fn template_without_steps_is_invalid() {
        let mut p = payload(None);
        p.workflow.steps.clear();
        assert!(matches!(build(&p, "add", "/"), Err(DispatchError::InvalidPayload(_))));
    }

    #[test]
    fn empty_path_is_invalid() {
        assert!(matches!(
            build(&payload(None), "", "/"),
            Err(DispatchError::InvalidPayload(_))
        ));
    }

    #[test]
    fn registration_is_visible_until_dropped() {
        let registry = Arc::new(WorkflowRegistry::new());
        let id = RequestId::new("req-1").unwrap();
        let registration = build_and_register(&registry, &id, &payload(None), "add", "/").unwrap();
        let seen = registry.ephemeral(&id).unwrap();
        assert_eq!(seen.steps[0].node.as_str(), "add");
        drop(registration);
        assert!(registry.ephemeral(&id).is_none());
    }
}
