//! Nanoserve client.
//!
//! Builds remote node calls (a one-step workflow wrapped in a BASE64
//! [`pipeline::codec::Envelope`]) and turns the server's reply into an
//! [`SdkResponse`]. The client shares nothing with the server except the wire
//! contract in [`pipeline::codec`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), client::ClientError> {
//! let client = client::NodeClient::new("http://localhost:4000", "token", false)?;
//! let response = client.python3("add", serde_json::json!({ "a": 1, "b": 2 })).await;
//! assert!(response.success);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod response;

pub use client::{
    workflow_template, ClientError, NodeClient, DEFAULT_HOST, DEFAULT_NODEJS_RUNTIME,
    PYTHON3_RUNTIME,
};
pub use response::{classify_content_type, interpret, ContentClass, ErrorRecord, RawData, SdkResponse};
