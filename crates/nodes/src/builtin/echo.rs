use async_trait::async_trait;
use pipeline::{Context, Node, NodeError, NodeResponse};
use serde_json::{json, Value};

/// Responds with its inputs and the request it was invoked for.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoNode;

impl EchoNode {
    pub const NAME: &'static str = "echo";
}

#[async_trait]
impl Node for EchoNode {
    async fn handle(&self, ctx: &Context, inputs: &Value) -> Result<NodeResponse, NodeError> {
        Ok(NodeResponse::json(json!({
            "inputs": inputs,
            "request": {
                "method": ctx.request.method,
                "path": ctx.request.path,
                "params": ctx.request.params,
                "query": ctx.request.query,
                "body": ctx.request.body,
            },
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{RequestContext, RequestId, ResponseBody};

    #[tokio::test]
    async fn echoes_inputs_and_query() {
        let mut request = RequestContext {
            method: "GET".into(),
            path: "/".into(),
            ..RequestContext::default()
        };
        request.query.insert("q".into(), "1".into());
        let ctx = Context::new(RequestId::generate(), "echo", request);

        let response = EchoNode.handle(&ctx, &json!({ "a": 1 })).await.unwrap();
        let ResponseBody::Json(body) = response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["inputs"], json!({ "a": 1 }));
        assert_eq!(body["request"]["query"], json!({ "q": "1" }));
        assert_eq!(response.content_type, None);
    }
}
