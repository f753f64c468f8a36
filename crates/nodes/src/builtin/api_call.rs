use async_trait::async_trait;
use pipeline::{Context, Node, NodeError, NodeResponse, ResponseBody};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;

const DEFAULT_RESPONSE_TYPE: &str = "application/json";

/// Calls an HTTP endpoint and returns its response.
///
/// | Input | Default | |
/// |-------|---------|---|
/// | `url` | required | target URL |
/// | `method` | `GET` | HTTP method |
/// | `headers` | none | object of header name → string value |
/// | `body` | previous step's JSON response | request body, sent as JSON |
/// | `responseType` | `application/json` | how the reply body is read |
#[derive(Debug, Clone)]
pub struct ApiCallNode {
    client: reqwest::Client,
}

impl ApiCallNode {
    pub const NAME: &'static str = "@nanoservice-ts/api-call";

    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn invalid_input(message: impl Into<String>) -> NodeError {
    NodeError::new(message).with_code(400).with_name(ApiCallNode::NAME)
}

fn header_map(headers: Option<&Value>) -> Result<HeaderMap, NodeError> {
    let mut map = HeaderMap::new();
    let Some(headers) = headers.and_then(Value::as_object) else {
        return Ok(map);
    };
    for (name, value) in headers {
        let Some(value) = value.as_str() else {
            continue;
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| invalid_input(format!("Invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| invalid_input(format!("Invalid value for header {name}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl Node for ApiCallNode {
    async fn handle(&self, ctx: &Context, inputs: &Value) -> Result<NodeResponse, NodeError> {
        let url = inputs
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| invalid_input("Missing required input: url"))?;
        let method = inputs.get("method").and_then(Value::as_str).unwrap_or("GET");
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| invalid_input(format!("Invalid HTTP method: {method}")))?;
        let response_type = inputs
            .get("responseType")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_RESPONSE_TYPE)
            .to_owned();

        let body = match inputs.get("body") {
            Some(body) => Some(body.clone()),
            None => match &ctx.response.body {
                ResponseBody::Json(previous) => Some(previous.clone()),
                _ => None,
            },
        };

        let mut request = self
            .client
            .request(method.clone(), url)
            .headers(header_map(inputs.get("headers"))?);
        if method != Method::GET && method != Method::HEAD {
            if let Some(body) = &body {
                request = request.json(body);
            }
        }

        tracing::debug!(%method, url, "calling endpoint");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NodeError::aborted(Self::NAME, e.to_string())
            } else {
                NodeError::new(e.to_string()).with_code(502).with_name(Self::NAME)
            }
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| NodeError::new(e.to_string()).with_code(502).with_name(Self::NAME))?;

        if !status.is_success() {
            let mut error = NodeError::new(format!("Request failed with status {}", status.as_u16()))
                .with_code(status.as_u16())
                .with_name(Self::NAME);
            if let Ok(json) = serde_json::from_slice::<Value>(&bytes) {
                error = error.with_json(json);
            }
            return Err(error);
        }

        if response_type.contains("json") {
            if bytes.is_empty() {
                return Ok(NodeResponse::json(Value::Null));
            }
            let value = serde_json::from_slice(&bytes).map_err(|e| {
                NodeError::new(format!("Invalid JSON response: {e}")).with_name(Self::NAME)
            })?;
            return Ok(NodeResponse::json(value));
        }
        if response_type.starts_with("text/") {
            return Ok(NodeResponse::text(
                String::from_utf8_lossy(&bytes).into_owned(),
                response_type,
            ));
        }
        Ok(NodeResponse::binary(bytes.to_vec(), response_type))
    }
}
