//! HTTP responses produced by the dispatch core.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use pipeline::{ErrorResponse, NodeResponse};

/// Content type used when a node does not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// A fully mapped response: status, content type, and body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl DispatchResponse {
    /// 200 with the node's body and content type.
    pub fn success(response: &NodeResponse) -> Self {
        Self {
            status: 200,
            content_type: response
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned()),
            body: response.body.to_bytes(),
        }
    }

    /// The JSON body and status of a mapped error.
    pub fn failure(error: &ErrorResponse) -> Self {
        Self {
            status: error.status,
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            body: serde_json::to_vec(&error.body).unwrap_or_default(),
        }
    }

    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

impl IntoResponse for DispatchResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        (status, [(header::CONTENT_TYPE, content_type)], Body::from(self.body)).into_response()
    }
}
