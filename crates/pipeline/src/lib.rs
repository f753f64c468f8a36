//! Core dispatch domain for Nanoserve.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, and error type used to expose nodes over HTTP. Infrastructure crates
//! implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! The route matcher and the wire codec are pure functions; the registry is an
//! in-memory concurrent map.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RequestId`, `WorkflowName`, `NodeName`, `StepName`) |
//! | [`types`] | Workflow definitions, request context, node responses, execution metrics |
//! | [`errors`] | Error taxonomy and its HTTP mapping |
//! | [`routing`] | Route pattern matching and parameter extraction |
//! | [`codec`] | Wire envelope encoding/decoding |
//! | [`document`] | JSON workflow documents and the remote node payload |
//! | [`ephemeral`] | One-step workflows built per remote node call |
//! | [`registry`] | Registered and ephemeral workflow storage |
//! | [`ports`] | Traits implemented by infrastructure crates |

pub mod codec;
pub mod document;
pub mod ephemeral;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod registry;
pub mod routing;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use codec::{Encoding, Envelope, PayloadType};
pub use document::{DocumentError, RemoteNodePayload, WorkflowDocument};
pub use errors::{
    CodecError, DispatchError, ErrorKind, ErrorResponse, NodeError, RoutingError,
};
pub use identifiers::{NodeName, RequestId, StepName, WorkflowName};
pub use ports::{ExecutionEngine, FailureTags, MetricsSink, Node, RuntimeBridge};
pub use registry::{DispatchTarget, EphemeralRegistration, WorkflowRegistry};
pub use routing::{ParamSource, RouteParams, RoutePattern};
pub use types::{
    Context, CpuMetrics, Execution, ExecutionMetrics, HttpRoute, MemoryMetrics, NodeResponse,
    RequestContext, ResolvedWorkflow, ResponseBody, RuntimeKind, Step, Trigger,
    WorkflowDefinition,
};
