//! The dispatch core.
//!
//! Every inbound request walks the same state machine:
//!
//! ```text
//! ReceiveRequest → DetermineMode → [BuildEphemeralWorkflow] → ResolveConfig
//!   → ValidateRoute → Execute → MapResponse | MapError → Cleanup → End
//! ```
//!
//! A request is a *remote node call* when it is a `POST` carrying
//! `x-nanoservice-execute-node: true`; its body is an [`Envelope`] describing
//! a one-step workflow that is registered under the request id for exactly
//! the lifetime of the request. Any other request runs the pre-registered
//! workflow named by the first path segment.
//!
//! Route validation runs against the path *after* the workflow segment: a
//! workflow registered as `users` with trigger path `/:id` serves
//! `GET /users/42`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use pipeline::codec::{self, Envelope};
use pipeline::ephemeral;
use pipeline::{
    CodecError, Context, DispatchError, DispatchTarget, EphemeralRegistration, Execution,
    ExecutionEngine, FailureTags, MetricsSink, RemoteNodePayload, RequestContext, RequestId,
    ResolvedWorkflow, RouteParams, RoutePattern, RoutingError, WorkflowName,
};
use serde_json::Value;
use tracing::field::Empty;
use tracing::{Instrument, Span};

use crate::response::DispatchResponse;

/// Header that marks a remote node call.
pub const EXECUTE_NODE_HEADER: &str = "x-nanoservice-execute-node";

/// Query parameter carrying the caller-supplied request id.
pub const REQUEST_ID_PARAM: &str = "requestId";

// ---------------------------------------------------------------------------
// Inbound request
// ---------------------------------------------------------------------------

/// The parts of an HTTP request the dispatch core reads.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    pub path: String,
    /// See [`collect_query`].
    pub query: BTreeMap<String, Value>,
    /// Header names in lower case.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

/// How a request selects its workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run the pre-registered workflow named by the first path segment.
    Direct,
    /// Build and run a one-step workflow from the request body.
    Remote,
}

impl Mode {
    pub fn detect(method: &str, headers: &BTreeMap<String, String>) -> Self {
        let flagged = headers
            .get(EXECUTE_NODE_HEADER)
            .is_some_and(|v| v.trim() == "true");
        if flagged && method.eq_ignore_ascii_case("POST") {
            Self::Remote
        } else {
            Self::Direct
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Remote => "remote",
        }
    }
}

/// Splits a request path into the workflow segment and the sub-path after it.
///
/// The sub-path always starts with `/`.
pub fn split_path(path: &str) -> (&str, String) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.split_once('/') {
        Some((segment, rest)) => (segment, format!("/{rest}")),
        None => (trimmed, "/".to_owned()),
    }
}

/// Folds decoded query pairs into a map.
///
/// A key that appears once maps to its string value; a repeated key maps to
/// an array of every value in query-string order.
pub fn collect_query(pairs: impl IntoIterator<Item = (String, String)>) -> BTreeMap<String, Value> {
    let mut query = BTreeMap::new();
    for (key, value) in pairs {
        match query.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Value::String(value));
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(values) => values.push(Value::String(value)),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value)]);
                }
            },
        }
    }
    query
}

/// The first usable id in a `requestId` query value.
fn request_id_from(value: Value) -> Option<RequestId> {
    match value {
        Value::String(id) => RequestId::new(id),
        Value::Array(ids) => ids.into_iter().find_map(request_id_from),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// State a single request accumulates while it runs.
///
/// The registration is dropped with the scope, so an ephemeral workflow is
/// removed even if the request future is cancelled mid-flight.
#[derive(Default)]
struct RequestScope {
    registration: Option<EphemeralRegistration>,
    workflow: Option<ResolvedWorkflow>,
}

pub struct Dispatcher {
    registry: Arc<pipeline::WorkflowRegistry>,
    engine: Arc<dyn ExecutionEngine>,
    metrics: Arc<dyn MetricsSink>,
    env: String,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        registry: Arc<pipeline::WorkflowRegistry>,
        engine: Arc<dyn ExecutionEngine>,
        metrics: Arc<dyn MetricsSink>,
        env: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            engine,
            metrics,
            env: env.into(),
        }
    }

    pub fn registry(&self) -> &Arc<pipeline::WorkflowRegistry> {
        &self.registry
    }

    /// Runs one request to completion and maps the outcome.
    pub async fn dispatch(&self, request: InboundRequest) -> DispatchResponse {
        let mode = Mode::detect(&request.method, &request.headers);
        let otel_name = match split_path(&request.path).0 {
            "" => "/",
            segment => segment,
        };
        let span = tracing::info_span!(
            "workflow",
            otel.name = %otel_name,
            otel.kind = "server",
            otel.status_code = Empty,
            otel.status_message = Empty,
            success = Empty,
            http.method = %request.method,
            http.path = %request.path,
            dispatch.mode = mode.as_str(),
            request_id = Empty,
            workflow_name = Empty,
            workflow_version = Empty,
            content_type = Empty,
            elapsed_ms = Empty,
            memory_min_mb = Empty,
            memory_avg_mb = Empty,
            memory_max_mb = Empty,
            cpu_percentage = Empty,
            cpu_usage = Empty,
            cpu_total = Empty,
            cpu_model = Empty,
            error.kind = Empty,
        );
        self.dispatch_in_span(request, mode).instrument(span).await
    }

    async fn dispatch_in_span(&self, mut request: InboundRequest, mode: Mode) -> DispatchResponse {
        let span = Span::current();
        let id = request
            .query
            .remove(REQUEST_ID_PARAM)
            .and_then(request_id_from)
            .unwrap_or_else(RequestId::generate);
        span.record("request_id", id.as_str());

        let mut scope = RequestScope::default();
        let outcome = self.run(&request, mode, &id, &mut scope).await;

        let response = match outcome {
            Ok(execution) => self.map_success(&span, &execution),
            Err(error) => self.map_error(&span, &request, scope.workflow.as_deref(), &error),
        };

        if let Some(registration) = scope.registration.take() {
            registration.release();
        }
        response
    }

    async fn run(
        &self,
        request: &InboundRequest,
        mode: Mode,
        id: &RequestId,
        scope: &mut RequestScope,
    ) -> Result<Execution, DispatchError> {
        let (segment, subpath) = split_path(&request.path);

        let (target, body) = match mode {
            Mode::Remote => {
                let payload = decode_remote_payload(&request.body)?;
                let registration =
                    ephemeral::build_and_register(&self.registry, id, &payload, segment, &subpath)?;
                let target = registration.target();
                scope.registration = Some(registration);
                (target, payload.request)
            }
            Mode::Direct => {
                let name = WorkflowName::new(segment)
                    .ok_or_else(|| RoutingError::UnknownWorkflow(segment.to_owned()))?;
                (DispatchTarget::Registered(name), parse_body(&request.body))
            }
        };

        let workflow = self.engine.configure(&target, &self.registry)?;
        scope.workflow = Some(Arc::clone(&workflow));
        let span = Span::current();
        span.record("workflow_name", workflow.name.as_str());
        span.record("workflow_version", workflow.version.as_str());

        let params = validate_route(&workflow, &request.method, &subpath)?;

        let ctx = Context::new(
            id.clone(),
            workflow.name.clone(),
            RequestContext {
                method: request.method.clone(),
                path: subpath,
                params: params.into_values(),
                query: request.query.clone(),
                headers: request.headers.clone(),
                body,
            },
        );
        self.execute(workflow, ctx).await
    }

    /// Executes on a separate task so a panicking node only fails its own request.
    async fn execute(
        &self,
        workflow: ResolvedWorkflow,
        ctx: Context,
    ) -> Result<Execution, DispatchError> {
        let engine = Arc::clone(&self.engine);
        let task = tokio::spawn(
            async move { engine.execute(workflow, ctx).await }.instrument(Span::current()),
        );
        match task.await {
            Ok(result) => result,
            Err(join) if join.is_panic() => {
                let payload = join.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "workflow execution panicked".to_owned());
                Err(DispatchError::Internal(message))
            }
            Err(join) => Err(DispatchError::Internal(join.to_string())),
        }
    }

    fn map_success(&self, span: &Span, execution: &Execution) -> DispatchResponse {
        let response = DispatchResponse::success(&execution.context.response);
        let metrics = &execution.metrics;
        span.record("content_type", response.content_type.as_str());
        span.record("elapsed_ms", metrics.elapsed.as_secs_f64() * 1000.0);
        span.record("memory_min_mb", metrics.memory.min_mb);
        span.record("memory_avg_mb", metrics.memory.avg_mb);
        span.record("memory_max_mb", metrics.memory.max_mb);
        span.record("cpu_percentage", metrics.cpu.percentage);
        span.record("cpu_usage", metrics.cpu.usage);
        span.record("cpu_total", metrics.cpu.total as u64);
        span.record("cpu_model", metrics.cpu.model.as_str());
        span.record("otel.status_code", "OK");
        span.record("success", true);
        tracing::debug!(status = response.status, "workflow completed");
        response
    }

    fn map_error(
        &self,
        span: &Span,
        request: &InboundRequest,
        workflow: Option<&pipeline::WorkflowDefinition>,
        error: &DispatchError,
    ) -> DispatchResponse {
        let mapped = error.to_response();
        span.record("otel.status_code", "ERROR");
        span.record("otel.status_message", mapped.message.as_str());
        span.record("success", false);
        span.record("error.kind", mapped.kind.as_str());

        match &mapped.stack {
            Some(stack) => tracing::error!(
                kind = mapped.kind.as_str(),
                status = mapped.status,
                stack = %stack,
                "{}",
                mapped.message
            ),
            None => tracing::error!(
                kind = mapped.kind.as_str(),
                status = mapped.status,
                "{}",
                mapped.message
            ),
        }

        let (workflow_name, workflow_version) = match workflow {
            Some(w) => (w.name.clone(), w.version.clone()),
            None => (fallback_workflow_name(&request.path), "unknown".to_owned()),
        };
        self.metrics.record_failure(&FailureTags {
            env: self.env.clone(),
            workflow_name,
            workflow_version,
            kind: mapped.kind,
        });

        DispatchResponse::failure(&mapped)
    }
}

fn fallback_workflow_name(path: &str) -> String {
    match split_path(path).0 {
        "" => "unknown".to_owned(),
        segment => segment.to_owned(),
    }
}

fn decode_remote_payload(body: &[u8]) -> Result<RemoteNodePayload, DispatchError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| CodecError::Malformed(format!("invalid envelope: {e}")))?;
    let decoded = codec::request_decode(&envelope)?;
    serde_json::from_value(decoded).map_err(|e| DispatchError::InvalidPayload(e.to_string()))
}

/// Direct-mode bodies: JSON when they parse, text otherwise.
fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn validate_route(
    workflow: &pipeline::WorkflowDefinition,
    method: &str,
    subpath: &str,
) -> Result<RouteParams, DispatchError> {
    let route = workflow
        .trigger
        .http_route()
        .ok_or_else(|| RoutingError::NotHttpTriggered(workflow.name.clone()))?;

    if !route.accepts_method(method) {
        return Err(RoutingError::MethodNotAllowed {
            expected: route.method.clone().unwrap_or_default(),
            actual: method.to_owned(),
        }
        .into());
    }

    let pattern = RoutePattern::compile(&route.path)
        .filter(|p| p.matches(subpath))
        .ok_or_else(|| RoutingError::PathMismatch {
            pattern: route.path.clone(),
            path: subpath.to_owned(),
        })?;
    Ok(pattern.extract(subpath))
}
