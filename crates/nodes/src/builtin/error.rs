use async_trait::async_trait;
use pipeline::{Context, Node, NodeError, NodeResponse};
use serde_json::Value;

/// Fails with the error described by its inputs.
///
/// Inputs: `message` (string), optional `code` (HTTP status), optional `json`
/// (body returned to the caller verbatim).
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorNode;

impl ErrorNode {
    pub const NAME: &'static str = "error";
}

#[async_trait]
impl Node for ErrorNode {
    async fn handle(&self, _ctx: &Context, inputs: &Value) -> Result<NodeResponse, NodeError> {
        let message = inputs
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        let mut error = NodeError::new(message).with_name(Self::NAME);
        if let Some(code) = inputs
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
        {
            error = error.with_code(code);
        }
        if let Some(json) = inputs.get("json") {
            error = error.with_json(json.clone());
        }
        Err(error)
    }
}
