//! Nanoserve HTTP front end.
//!
//! Receives every inbound request, decides whether it runs a pre-registered
//! workflow or a remote node call, drives the workflow through the
//! [`pipeline::ExecutionEngine`], and maps the outcome to an HTTP response
//! with consistent span attributes and failure metrics.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, span recording, and the OpenTelemetry
//! counter live here. Domain rules (routing, codec, error mapping, the
//! ephemeral registry) come from [`pipeline`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`dispatch`] | `Dispatcher`: the per-request state machine |
//! | [`response`] | `DispatchResponse` and its axum conversion |
//! | [`server`] | axum router, binding, graceful shutdown |
//! | [`telemetry`] | `OtelMetricsSink` (`workflow_errors` counter, `initialization` gauge) |

pub mod dispatch;
pub mod response;
pub mod server;
pub mod telemetry;

pub use dispatch::{Dispatcher, InboundRequest, Mode, EXECUTE_NODE_HEADER, REQUEST_ID_PARAM};
pub use response::{DispatchResponse, DEFAULT_CONTENT_TYPE};
pub use server::{bind, router, serve, shutdown_signal, ServerError};
pub use telemetry::OtelMetricsSink;
