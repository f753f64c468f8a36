//! Error taxonomy for the dispatch domain.
//!
//! Every failure a request can hit is a [`DispatchError`]. The boundary never
//! inspects error *types* ad hoc; it asks the error for its [`ErrorKind`] and
//! turns it into an explicit [`ErrorResponse`] (status code, JSON body, and the
//! message recorded on the trace span) with [`DispatchError::to_response`].
//!
//! | Kind | Source | Status |
//! |------|--------|--------|
//! | [`ErrorKind::Protocol`] | envelope or payload could not be decoded | 400 |
//! | [`ErrorKind::Routing`] | unknown workflow, method or path mismatch | 404 / 405 |
//! | [`ErrorKind::Conflict`] | request id already in flight | 409 |
//! | [`ErrorKind::Domain`] | a node raised a [`NodeError`] | node-supplied, default 500 |
//! | [`ErrorKind::PlatformAbort`] | a node call was cancelled underneath the node | 500 |
//! | [`ErrorKind::Opaque`] | anything else (engine fault, panic) | 500 |

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::RequestId;

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

/// Failures decoding a wire envelope.
///
/// Protocol errors are fatal for the request: they abort before dispatch and
/// are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The envelope names an encoding or content type this codec does not speak.
    #[error("Unsupported {field}: {value}")]
    UnsupportedFormat {
        /// `"encoding"` or `"type"`.
        field: &'static str,
        value: String,
    },

    /// The envelope format is supported but the message itself is corrupt
    /// (bad base64, non-UTF-8 text, invalid JSON).
    #[error("Malformed message: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Routing errors
// ---------------------------------------------------------------------------

/// The request does not match the trigger of the workflow it addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Workflow not found: {0}")]
    UnknownWorkflow(String),

    /// The workflow exists but is not triggered over HTTP.
    #[error("Workflow {0} has no HTTP trigger")]
    NotHttpTriggered(String),

    #[error("Invalid HTTP method")]
    MethodNotAllowed { expected: String, actual: String },

    #[error("Invalid HTTP path")]
    PathMismatch { pattern: String, path: String },
}

// ---------------------------------------------------------------------------
// Node (domain) errors
// ---------------------------------------------------------------------------

/// A structured error raised by a node while handling a step.
///
/// Mirrors what nodes can express: an optional HTTP status, a message, an
/// optional JSON body returned verbatim to the caller, the name of the raising
/// node, and a stack/trace string for local logs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct NodeError {
    pub code: Option<u16>,
    pub message: String,
    pub json: Option<Value>,
    pub name: Option<String>,
    pub stack: Option<String>,
    /// Set when the node call was aborted underneath the node (cancelled
    /// transport, dropped runtime). Carries the stringified cause.
    pub aborted: Option<String>,
}

impl NodeError {
    /// Creates an error with a message and no status code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Creates the platform-abort shape: an empty message wrapping the
    /// cancellation cause.
    pub fn aborted(origin: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            name: Some(origin.into()),
            aborted: Some(cause.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn with_json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Returns `true` for the platform-abort shape (empty message plus cause).
    pub fn is_platform_abort(&self) -> bool {
        self.message.is_empty() && self.aborted.is_some()
    }
}

// ---------------------------------------------------------------------------
// Dispatch errors and their HTTP mapping
// ---------------------------------------------------------------------------

/// Every failure a dispatched request can end in.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Protocol(#[from] CodecError),

    /// The envelope decoded but the payload does not describe a one-step
    /// remote workflow.
    #[error("Invalid remote node payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("Request id already in flight: {0}")]
    DuplicateRequest(RequestId),

    #[error(transparent)]
    Node(#[from] NodeError),

    /// Unrecognised failure: engine faults, panicking nodes, missing runtimes.
    #[error("{0}")]
    Internal(String),
}

/// Classification of a [`DispatchError`] at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Protocol,
    Routing,
    Conflict,
    Domain,
    PlatformAbort,
    Opaque,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Routing => "routing",
            Self::Conflict => "conflict",
            Self::Domain => "domain",
            Self::PlatformAbort => "platform_abort",
            Self::Opaque => "opaque",
        }
    }
}

/// The explicit outcome of mapping an error: what the caller receives and
/// what is recorded on the span and in the logs.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub status: u16,
    pub body: Value,
    /// Resolved message for the span status and the error log.
    pub message: String,
    pub stack: Option<String>,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(_) | Self::InvalidPayload(_) => ErrorKind::Protocol,
            Self::Routing(_) => ErrorKind::Routing,
            Self::DuplicateRequest(_) => ErrorKind::Conflict,
            Self::Node(e) if e.is_platform_abort() => ErrorKind::PlatformAbort,
            Self::Node(_) => ErrorKind::Domain,
            Self::Internal(_) => ErrorKind::Opaque,
        }
    }

    /// Maps the error onto its HTTP status and body.
    ///
    /// Node errors follow these rules, in order:
    ///
    /// 1. platform abort → 500 `{ origin, error: cause }`, ignoring code and JSON;
    /// 2. a missing code defaults to 500;
    /// 3. a JSON body is returned verbatim;
    /// 4. otherwise `{ error: message }`.
    pub fn to_response(&self) -> ErrorResponse {
        let kind = self.kind();
        match self {
            Self::Node(node) if kind == ErrorKind::PlatformAbort => {
                let cause = node.aborted.clone().unwrap_or_default();
                ErrorResponse {
                    kind,
                    status: 500,
                    body: json!({ "origin": node.name, "error": cause }),
                    message: cause,
                    stack: node.stack.clone(),
                }
            }
            Self::Node(node) => {
                let status = node.code.unwrap_or(500);
                match &node.json {
                    Some(body) => ErrorResponse {
                        kind,
                        status,
                        body: body.clone(),
                        message: body.to_string(),
                        stack: node.stack.clone(),
                    },
                    None => ErrorResponse {
                        kind,
                        status,
                        body: json!({ "error": node.message }),
                        message: node.message.clone(),
                        stack: node.stack.clone(),
                    },
                }
            }
            other => {
                let status = match other {
                    Self::Protocol(_) | Self::InvalidPayload(_) => 400,
                    Self::Routing(RoutingError::MethodNotAllowed { .. }) => 405,
                    Self::Routing(_) => 404,
                    Self::DuplicateRequest(_) => 409,
                    _ => 500,
                };
                let message = other.to_string();
                ErrorResponse {
                    kind,
                    status,
                    body: json!({ "error": message }),
                    message,
                    stack: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_error_with_code_and_json_is_returned_verbatim() {
        let err = DispatchError::from(NodeError::new("x").with_code(404).with_json(json!({ "msg": "x" })));
        let resp = err.to_response();
        assert_eq!(resp.kind, ErrorKind::Domain);
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, json!({ "msg": "x" }));
    }

    #[test]
    fn node_error_without_code_defaults_to_500() {
        let resp = DispatchError::from(NodeError::new("y")).to_response();
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body, json!({ "error": "y" }));
        assert_eq!(resp.message, "y");
    }

    #[test]
    fn node_error_with_code_but_no_json_wraps_the_message() {
        let resp = DispatchError::from(NodeError::new("teapot").with_code(418)).to_response();
        assert_eq!(resp.status, 418);
        assert_eq!(resp.body, json!({ "error": "teapot" }));
    }

    #[test]
    fn platform_abort_bypasses_code_and_json() {
        let err = NodeError::aborted("add", "AbortError: operation was aborted")
            .with_code(404)
            .with_json(json!({ "ignored": true }));
        let resp = DispatchError::from(err).to_response();
        assert_eq!(resp.kind, ErrorKind::PlatformAbort);
        assert_eq!(resp.status, 500);
        assert_eq!(
            resp.body,
            json!({ "origin": "add", "error": "AbortError: operation was aborted" })
        );
    }

    #[test]
    fn an_abort_cause_with_a_message_is_an_ordinary_domain_error() {
        let mut err = NodeError::aborted("add", "cancelled");
        err.message = "boom".into();
        let resp = DispatchError::from(err).to_response();
        assert_eq!(resp.kind, ErrorKind::Domain);
        assert_eq!(resp.body, json!({ "error": "boom" }));
    }

    #[test]
    fn opaque_errors_map_to_500() {
        let resp = DispatchError::Internal("engine fault".into()).to_response();
        assert_eq!(resp.kind, ErrorKind::Opaque);
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body, json!({ "error": "engine fault" }));
    }

    #[test]
    fn routing_and_protocol_statuses() {
        let method = DispatchError::from(RoutingError::MethodNotAllowed {
            expected: "GET".into(),
            actual: "POST".into(),
        });
        assert_eq!(method.to_response().status, 405);
        assert_eq!(method.to_response().body, json!({ "error": "Invalid HTTP method" }));

        let path = DispatchError::from(RoutingError::PathMismatch {
            pattern: "/".into(),
            path: "/x".into(),
        });
        assert_eq!(path.to_response().status, 404);

        let codec = DispatchError::from(CodecError::UnsupportedFormat {
            field: "encoding",
            value: "GZIP".into(),
        });
        assert_eq!(codec.kind(), ErrorKind::Protocol);
        assert_eq!(codec.to_response().status, 400);
        assert_eq!(
            codec.to_response().body,
            json!({ "error": "Unsupported encoding: GZIP" })
        );
    }

    #[test]
    fn duplicate_request_is_a_conflict() {
        let id = RequestId::new("r-1").unwrap();
        let resp = DispatchError::DuplicateRequest(id).to_response();
        assert_eq!(resp.kind, ErrorKind::Conflict);
        assert_eq!(resp.status, 409);
    }
}
