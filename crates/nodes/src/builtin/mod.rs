//! Nodes shipped with the service.
//!
//! | Name | Node | Purpose |
//! |------|------|---------|
//! | `@nanoservice-ts/api-call` | [`ApiCallNode`] | outbound HTTP call |
//! | `echo` | [`EchoNode`] | reflects inputs and request |
//! | `error` | [`ErrorNode`] | raises a configured error |

mod api_call;
mod echo;
mod error;

pub use api_call::ApiCallNode;
pub use echo::EchoNode;
pub use error::ErrorNode;
