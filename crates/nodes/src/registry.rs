//! Static node capability registry.
//!
//! Nodes are registered by name at start-up with a factory that produces a
//! fresh [`Node`] per step execution. Resolution is a map lookup; nothing is
//! loaded at runtime.

use std::collections::HashMap;
use std::sync::Arc;

use pipeline::Node;

use crate::builtin::{ApiCallNode, EchoNode, ErrorNode};

/// Produces a node instance for one step execution.
pub type NodeFactory = Arc<dyn Fn() -> Box<dyn Node> + Send + Sync>;

#[derive(Default, Clone)]
pub struct NodeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.names())
            .finish()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in nodes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let client = reqwest::Client::new();
        registry.register(ApiCallNode::NAME, move || {
            Box::new(ApiCallNode::new(client.clone()))
        });
        registry.register(EchoNode::NAME, || Box::new(EchoNode));
        registry.register(ErrorNode::NAME, || Box::new(ErrorNode));
        registry
    }

    /// Registers `factory` under `name`, replacing any previous registration.
    ///
    /// Returns `true` if a previous registration was replaced.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Node> + Send + Sync + 'static,
    {
        let name = name.into();
        let replaced = self.factories.insert(name.clone(), Arc::new(factory)).is_some();
        if replaced {
            tracing::warn!(node = %name, "node registration replaced");
        }
        replaced
    }

    /// Creates a fresh instance of the node registered under `name`.
    pub fn create(&self, name: &str) -> Option<Box<dyn Node>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered node names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{Context, NodeError, NodeResponse, RequestContext, RequestId};
    use serde_json::{json, Value};

    struct Constant(Value);

    #[async_trait::async_trait]
    impl Node for Constant {
        async fn handle(&self, _ctx: &Context, _inputs: &Value) -> Result<NodeResponse, NodeError> {
            Ok(NodeResponse::json(self.0.clone()))
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = NodeRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            ["@nanoservice-ts/api-call", "echo", "error"]
        );
        assert!(registry.create("missing").is_none());
    }

    #[tokio::test]
    async fn factories_produce_working_nodes() {
        let mut registry = NodeRegistry::new();
        assert!(!registry.register("one", || Box::new(Constant(json!(1)))));
        assert!(registry.register("one", || Box::new(Constant(json!(2)))));

        let ctx = Context::new(RequestId::generate(), "test", RequestContext::default());
        let node = registry.create("one").unwrap();
        let response = node.handle(&ctx, &Value::Null).await.unwrap();
        assert_eq!(response, NodeResponse::json(json!(2)));
    }
}
