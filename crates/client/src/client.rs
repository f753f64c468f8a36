use std::collections::BTreeMap;

use pipeline::codec::{self, Encoding, Envelope};
use pipeline::CodecError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use thiserror::Error;

use crate::response::{interpret, SdkResponse};

pub const DEFAULT_HOST: &str = "http://localhost:4000";

/// Runtime tag for nodes executed by the python3 runtime.
pub const PYTHON3_RUNTIME: &str = "runtime.python3";

/// Runtime tag used by [`NodeClient::nodejs`] when none is given.
pub const DEFAULT_NODEJS_RUNTIME: &str = "module";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid host format. Please provide a valid host with http:// or https://")]
    InvalidHost(String),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Calls single nodes on a Nanoserve server.
#[derive(Debug, Clone)]
pub struct NodeClient {
    http: reqwest::Client,
    host: String,
    token: String,
    custom_headers: BTreeMap<String, String>,
    debug: bool,
}

impl NodeClient {
    /// Creates a client for `host`. An empty host means [`DEFAULT_HOST`].
    pub fn new(
        host: impl Into<String>,
        token: impl Into<String>,
        debug: bool,
    ) -> Result<Self, ClientError> {
        let mut host = host.into();
        if host.is_empty() {
            host = DEFAULT_HOST.to_owned();
        }
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ClientError::InvalidHost(host));
        }
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            host: host.trim_end_matches('/').to_owned(),
            token: token.into(),
            custom_headers: BTreeMap::new(),
            debug,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Replaces the custom headers. They are sent after, and override, the
    /// default ones.
    pub fn set_headers<K, V>(&mut self, headers: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.custom_headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
    }

    pub async fn python3(&self, node: &str, inputs: Value) -> SdkResponse {
        self.call(PYTHON3_RUNTIME, node, inputs).await
    }

    /// Calls a node hosted by the server itself; `runtime` defaults to
    /// [`DEFAULT_NODEJS_RUNTIME`].
    pub async fn nodejs(&self, node: &str, inputs: Value, runtime: Option<&str>) -> SdkResponse {
        self.call(runtime.unwrap_or(DEFAULT_NODEJS_RUNTIME), node, inputs)
            .await
    }

    pub async fn call(&self, runtime: &str, node: &str, inputs: Value) -> SdkResponse {
        let headers = self.headers();
        let workflow = workflow_template(runtime, node, inputs);
        if self.debug {
            tracing::info!(headers = ?headers, workflow = %workflow, "remote node request");
        }

        let envelope = match envelope(node, workflow) {
            Ok(envelope) => envelope,
            Err(e) => return SdkResponse::transport_error(e.to_string()),
        };
        let url = format!("{}/{}", self.host, envelope.name);
        if self.debug {
            tracing::info!(url = %url, "sending remote node call");
        }

        let body = match serde_json::to_vec(&envelope) {
            Ok(body) => body,
            Err(e) => return SdkResponse::transport_error(e.to_string()),
        };
        let request = self.http.post(&url).headers(header_map(&headers)).body(body);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return SdkResponse::transport_error(e.to_string()),
        };
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        match response.bytes().await {
            Ok(body) => interpret(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
                content_type,
                &body,
            ),
            Err(e) => SdkResponse::transport_error(e.to_string()),
        }
    }

    /// Default headers overlaid with the custom ones.
    fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::from([
            ("Authorization".to_owned(), format!("Bearer {}", self.token)),
            ("x-nanoservice-execute-node".to_owned(), "true".to_owned()),
            ("Content-Type".to_owned(), "application/json".to_owned()),
        ]);
        for (name, value) in &self.custom_headers {
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            headers.insert(name.clone(), value.clone());
        }
        headers
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "skipping invalid header"),
        }
    }
    map
}

/// The one-step workflow sent for a remote node call.
pub fn workflow_template(runtime: &str, node: &str, inputs: Value) -> Value {
    json!({
        "name": "Remote Node",
        "description": "Execution of remote node",
        "version": "1.0.0",
        "trigger": {
            "http": { "method": "POST", "path": "*", "accept": "application/json" }
        },
        "steps": [{ "name": "node", "node": node, "type": runtime }],
        "nodes": { "node": { "inputs": inputs } }
    })
}

fn envelope(node: &str, workflow: Value) -> Result<Envelope, CodecError> {
    codec::encode(
        node,
        &json!({ "request": {}, "workflow": workflow }),
        Encoding::Base64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use pipeline::RemoteNodePayload;

    #[test]
    fn host_must_carry_a_scheme() {
        assert!(matches!(
            NodeClient::new("localhost:4000", "", false),
            Err(ClientError::InvalidHost(_))
        ));
        assert_eq!(NodeClient::new("", "", false).unwrap().host(), DEFAULT_HOST);
        assert_eq!(
            NodeClient::new("https://api.example.com/", "t", false).unwrap().host(),
            "https://api.example.com"
        );
    }

    #[test]
    fn custom_headers_override_defaults() {
        let mut client = NodeClient::new(DEFAULT_HOST, "secret", false).unwrap();
        client.set_headers([("authorization", "Basic abc"), ("X-Trace", "1")]);
        let headers = client.headers();
        assert_eq!(headers.get("authorization").map(String::as_str), Some("Basic abc"));
        assert!(!headers.contains_key("Authorization"));
        assert_eq!(headers.get("X-Trace").map(String::as_str), Some("1"));
        assert_eq!(
            headers.get("x-nanoservice-execute-node").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn envelope_decodes_to_a_remote_payload() {
        let env = envelope("add", workflow_template(PYTHON3_RUNTIME, "add", json!({ "a": 1 })))
            .unwrap();
        assert_eq!(env.name, "add");
        assert_eq!(env.encoding, Encoding::Base64);
        let decoded = codec::request_decode(&env).unwrap();
        let payload: RemoteNodePayload = serde_json::from_value(decoded).unwrap();
        assert_eq!(payload.request, json!({}));
        assert_eq!(payload.workflow.steps[0].node_type.as_deref(), Some(PYTHON3_RUNTIME));
        assert_eq!(payload.workflow.node_inputs("node"), json!({ "a": 1 }));
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn posts_the_envelope_to_the_node_path() {
        let app = Router::new().route(
            "/greet",
            post(|headers: HeaderMap, Json(envelope): Json<Envelope>| async move {
                Json(json!({
                    "name": envelope.name,
                    "auth": headers["authorization"].to_str().unwrap(),
                    "flag": headers["x-nanoservice-execute-node"].to_str().unwrap(),
                }))
            }),
        );
        let client = NodeClient::new(spawn(app).await, "tok", true).unwrap();
        let response = client.nodejs("greet", json!({}), None).await;
        assert!(response.success);
        assert_eq!(
            response.data,
            Some(json!({ "name": "greet", "auth": "Bearer tok", "flag": "true" }))
        );
    }

    #[tokio::test]
    async fn server_errors_are_reported_not_raised() {
        let app = Router::new().route(
            "/fail",
            post(|| async { (StatusCode::NOT_FOUND, Json(json!({ "error": "Invalid HTTP path" }))) }),
        );
        let client = NodeClient::new(spawn(app).await, "", false).unwrap();
        let response = client.python3("fail", json!({})).await;
        assert!(!response.success);
        let errors = response.errors.unwrap();
        assert_eq!(errors[0].status, 404);
        assert_eq!(errors[0].fields["error"], json!("Invalid HTTP path"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_500_record() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = NodeClient::new(format!("http://{addr}"), "", false).unwrap();
        let response = client.python3("add", json!({})).await;
        assert!(!response.success);
        assert_eq!(response.errors.unwrap()[0].status, 500);
    }
}
