//! Bridge to the out-of-process python3 runtime.
//!
//! Each invocation posts one BASE64 [`Envelope`] to the runtime endpoint. The
//! envelope's `Name` is the node to run and its message is the serialised
//! step context:
//!
//! ```json
//! { "id": "...", "workflow_name": "...", "request": {..}, "response": {..}, "vars": {..}, "config": {..} }
//! ```
//!
//! The runtime replies with an envelope of the same shape. A decoded reply
//! carrying an `error` key is a node failure; anything else is the node
//! response (`data` plus optional `contentType`).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use pipeline::codec::{self, Encoding, Envelope};
use pipeline::{Context, NodeError, NodeName, NodeResponse, ResponseBody, RuntimeBridge};
use serde_json::{json, Value};
use thiserror::Error;

/// Origin recorded on failures raised by the bridge itself.
const ORIGIN: &str = "runtime.python3";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("runtime endpoint must start with http:// or https://: {0}")]
    InvalidEndpoint(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// [`RuntimeBridge`] for the python3 runtime over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRuntimeBridge {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRuntimeBridge {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, BridgeError> {
        Self::with_timeout(endpoint, None)
    }

    /// Creates a bridge whose calls are aborted after `timeout`.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, BridgeError> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(BridgeError::InvalidEndpoint(endpoint));
        }
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn step_payload(ctx: &Context, inputs: &Value) -> Value {
    json!({
        "id": ctx.id,
        "workflow_name": ctx.workflow_name,
        "request": ctx.request,
        "response": ctx.response,
        "vars": ctx.vars,
        "config": inputs,
    })
}

/// Interprets a decoded runtime reply.
pub(crate) fn interpret_reply(node: &NodeName, reply: Value) -> Result<NodeResponse, NodeError> {
    let Value::Object(mut fields) = reply else {
        return Ok(NodeResponse::json(reply));
    };

    if let Some(error) = fields.remove("error") {
        let message = match &error {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let mut node_error = NodeError::new(message).with_name(node.as_str());
        if let Some(code) = fields
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
        {
            node_error = node_error.with_code(code);
        }
        if let Some(stack) = fields.get("stack").and_then(Value::as_str) {
            node_error = node_error.with_stack(stack);
        }
        return Err(node_error);
    }

    let Some(data) = fields.remove("data") else {
        return Ok(NodeResponse::json(Value::Object(fields)));
    };
    let content_type = fields
        .get("contentType")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let body = match (content_type.as_deref(), data) {
        (None, data) => ResponseBody::Json(data),
        (Some(ct), data) if ct.contains("json") => ResponseBody::Json(data),
        (Some(ct), Value::String(text)) if ct.starts_with("text/") => ResponseBody::Text(text),
        (Some(_), Value::String(encoded)) => {
            match base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes()) {
                Ok(bytes) => ResponseBody::Binary(bytes),
                Err(_) => ResponseBody::Text(encoded),
            }
        }
        (Some(_), data) => ResponseBody::Json(data),
    };
    Ok(NodeResponse { body, content_type })
}

#[async_trait]
impl RuntimeBridge for HttpRuntimeBridge {
    async fn invoke(
        &self,
        node: &NodeName,
        ctx: &Context,
        inputs: &Value,
    ) -> Result<NodeResponse, NodeError> {
        let envelope = codec::encode(node.as_str(), &step_payload(ctx, inputs), Encoding::Base64)
            .map_err(|e| NodeError::new(e.to_string()).with_name(ORIGIN))?;

        tracing::debug!(node = %node, endpoint = %self.endpoint, "invoking python3 node");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NodeError::aborted(ORIGIN, e.to_string())
                } else {
                    NodeError::new(format!("python3 runtime unreachable: {e}"))
                        .with_code(502)
                        .with_name(ORIGIN)
                }
            })?;

        let status = response.status();
        let reply: Envelope = response.json().await.map_err(|e| {
            NodeError::new(format!("invalid python3 runtime reply ({status}): {e}"))
                .with_code(502)
                .with_name(ORIGIN)
        })?;
        let decoded = codec::response_decode(&reply)
            .map_err(|e| NodeError::new(e.to_string()).with_code(502).with_name(ORIGIN))?;
        interpret_reply(node, decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use pipeline::{RequestContext, RequestId};

    fn add() -> NodeName {
        NodeName::new("add").unwrap()
    }

    /// A stand-in runtime that adds `config.a` and `config.b`.
    async fn spawn_runtime() -> String {
        let app = Router::new().route(
            "/",
            post(|Json(envelope): Json<Envelope>| async move {
                let ctx = codec::request_decode(&envelope).unwrap();
                let reply = match (ctx["config"]["a"].as_i64(), ctx["config"]["b"].as_i64()) {
                    (Some(a), Some(b)) => json!({ "data": { "result": a + b } }),
                    _ => json!({ "error": "a and b are required", "stack": "Traceback" }),
                };
                Json(codec::encode(envelope.name, &reply, Encoding::Base64).unwrap())
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn ctx() -> Context {
        Context::new(RequestId::generate(), "Remote Node: add", RequestContext::default())
    }

    #[test]
    fn endpoint_must_be_http() {
        assert!(matches!(
            HttpRuntimeBridge::new("localhost:50051"),
            Err(BridgeError::InvalidEndpoint(_))
        ));
        assert!(HttpRuntimeBridge::new("http://localhost:50051").is_ok());
    }

    #[test]
    fn replies_are_interpreted() {
        assert_eq!(
            interpret_reply(&add(), json!({ "data": { "result": 3 } })).unwrap(),
            NodeResponse::json(json!({ "result": 3 }))
        );
        assert_eq!(
            interpret_reply(&add(), json!({ "data": "<p/>", "contentType": "text/html" })).unwrap(),
            NodeResponse::text("<p/>", "text/html")
        );
        assert_eq!(
            interpret_reply(&add(), json!({ "data": "AQI=", "contentType": "application/pdf" }))
                .unwrap(),
            NodeResponse::binary(vec![1, 2], "application/pdf")
        );

        let err = interpret_reply(&add(), json!({ "error": "boom", "stack": "trace" })).unwrap_err();
        assert_eq!(err.message, "boom");
        assert_eq!(err.stack.as_deref(), Some("trace"));
        assert_eq!(err.name.as_deref(), Some("add"));
        assert_eq!(err.code, None);
    }

    #[tokio::test]
    async fn invokes_the_runtime() {
        let bridge = HttpRuntimeBridge::new(spawn_runtime().await).unwrap();
        let response = bridge
            .invoke(&add(), &ctx(), &json!({ "a": 1, "b": 2 }))
            .await
            .unwrap();
        assert_eq!(response, NodeResponse::json(json!({ "result": 3 })));

        let err = bridge.invoke(&add(), &ctx(), &json!({})).await.unwrap_err();
        assert_eq!(err.message, "a and b are required");
    }

    #[tokio::test]
    async fn unreachable_runtime_is_a_bad_gateway() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let bridge = HttpRuntimeBridge::new(format!("http://{addr}/")).unwrap();
        let err = bridge.invoke(&add(), &ctx(), &json!({})).await.unwrap_err();
        assert_eq!(err.code, Some(502));
        assert!(!err.is_platform_abort());
    }
}
