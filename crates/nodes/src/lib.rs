//! Nanoserve node implementations and the reference execution engine.
//!
//! This crate provides the static node capability registry, the built-in
//! nodes, the bridge to the out-of-process python3 runtime, and the
//! [`WorkflowRunner`] that executes workflow steps in order.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The runner sequences calls between the domain
//! types in [`pipeline`] and node implementations. It adds no dispatch rules
//! of its own; routing, registration, and error mapping live in `pipeline`
//! and `listener`.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`registry`] | `NodeRegistry`: node name → factory |
//! | [`builtin`] | `@nanoservice-ts/api-call`, `echo`, `error` |
//! | [`bridge`] | `HttpRuntimeBridge` for `runtime.python3` steps |
//! | [`resources`] | Memory and CPU sampling during a run |
//! | [`runner`] | `WorkflowRunner`, the [`pipeline::ExecutionEngine`] implementation |

pub mod bridge;
pub mod builtin;
pub mod registry;
pub mod resources;
pub mod runner;

pub use bridge::{BridgeError, HttpRuntimeBridge};
pub use builtin::{ApiCallNode, EchoNode, ErrorNode};
pub use registry::{NodeFactory, NodeRegistry};
pub use resources::ResourceSampler;
pub use runner::WorkflowRunner;
