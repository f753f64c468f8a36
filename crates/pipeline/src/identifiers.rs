//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`WorkflowName`] with a [`RequestId`] even though both are strings under the
//! hood. The distinction matters in the registry: an ephemeral workflow is keyed
//! by the request id, a pre-registered one by its name.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Request identity
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies one inbound HTTP request for its whole lifetime.
    ///
    /// Supplied by the caller through the `requestId` query parameter or
    /// generated with [`RequestId::generate`]. Ephemeral workflows are stored in
    /// the registry under this id, so it must be unique among in-flight
    /// requests; the registry rejects duplicates.
    RequestId
}

impl RequestId {
    /// Generates a fresh random (UUID v4) request identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

// ---------------------------------------------------------------------------
// Workflow and node names
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a pre-registered workflow by the path segment that selects it
    /// (e.g. `"countries-helper"` for `GET /countries-helper`).
    WorkflowName
}

string_id! {
    /// Identifies a node implementation (e.g. `"@nanoservice-ts/api-call"`,
    /// `"echo"`, or a remote python3 node such as `"add"`).
    ///
    /// Remote node names may contain `/` when the caller addresses a nested
    /// path (`POST /tools/summarise` targets node `"tools/summarise"`).
    NodeName
}

string_id! {
    /// Names a step within a workflow (e.g. `"get-countries-api"`).
    ///
    /// Step names key the `nodes` map of a workflow document, which supplies
    /// each step's inputs.
    StepName
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(RequestId::new("").is_none());
        assert!(WorkflowName::new("").is_none());
        assert_eq!(NodeName::new("add").unwrap().as_str(), "add");
    }

    #[test]
    fn generated_request_ids_are_distinct() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }
}
