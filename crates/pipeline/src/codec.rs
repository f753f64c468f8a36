//! Wire envelope shared by the server, the client SDK, and the python3 runtime.
//!
//! ```json
//! { "Name": "add", "Message": "eyJyZXF1ZXN0Ijp7fX0=", "Encoding": "BASE64", "Type": "JSON" }
//! ```
//!
//! Decoding dispatches first on the transport encoding, then on the content
//! type. Anything the codec does not speak is a [`CodecError::UnsupportedFormat`];
//! decoding never produces partial output.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CodecError;

/// Transport encoding of [`Envelope::message`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Encoding {
    Base64,
    /// The message is the literal text.
    Text,
    /// Any value this codec does not understand, kept so it can be reported.
    Other(String),
}

impl From<String> for Encoding {
    fn from(value: String) -> Self {
        match value.as_str() {
            "BASE64" => Self::Base64,
            "STRING" => Self::Text,
            _ => Self::Other(value),
        }
    }
}

impl From<Encoding> for String {
    fn from(value: Encoding) -> Self {
        match value {
            Encoding::Base64 => "BASE64".to_owned(),
            Encoding::Text => "STRING".to_owned(),
            Encoding::Other(other) => other,
        }
    }
}

/// Content type of the decoded message text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PayloadType {
    Json,
    Other(String),
}

impl From<String> for PayloadType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "JSON" => Self::Json,
            _ => Self::Other(value),
        }
    }
}

impl From<PayloadType> for String {
    fn from(value: PayloadType) -> Self {
        match value {
            PayloadType::Json => "JSON".to_owned(),
            PayloadType::Other(other) => other,
        }
    }
}

/// The wire message. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Encoding")]
    pub encoding: Encoding,
    #[serde(rename = "Type")]
    pub payload_type: PayloadType,
}

/// Builds a JSON envelope for `payload`.
///
/// Only [`Encoding::Base64`] and [`Encoding::Text`] can be produced; any other
/// encoding is rejected so that every envelope this codec emits can also be
/// decoded by it.
pub fn encode(
    name: impl Into<String>,
    payload: &Value,
    encoding: Encoding,
) -> Result<Envelope, CodecError> {
    let text = payload.to_string();
    let message = match &encoding {
        Encoding::Base64 => base64::engine::general_purpose::STANDARD.encode(text),
        Encoding::Text => text,
        Encoding::Other(other) => {
            return Err(CodecError::UnsupportedFormat {
                field: "encoding",
                value: other.clone(),
            })
        }
    };
    Ok(Envelope {
        name: name.into(),
        message,
        encoding,
        payload_type: PayloadType::Json,
    })
}

/// Decodes an inbound request envelope.
pub fn request_decode(envelope: &Envelope) -> Result<Value, CodecError> {
    decode(envelope)
}

/// Decodes a response envelope (python3 runtime replies).
pub fn response_decode(envelope: &Envelope) -> Result<Value, CodecError> {
    decode(envelope)
}

fn decode(envelope: &Envelope) -> Result<Value, CodecError> {
    let text = match &envelope.encoding {
        Encoding::Base64 => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(envelope.message.as_bytes())
                .map_err(|e| CodecError::Malformed(format!("invalid base64: {e}")))?;
            String::from_utf8(bytes)
                .map_err(|e| CodecError::Malformed(format!("invalid UTF-8: {e}")))?
        }
        Encoding::Text => envelope.message.clone(),
        Encoding::Other(other) => {
            return Err(CodecError::UnsupportedFormat {
                field: "encoding",
                value: other.clone(),
            })
        }
    };

    match &envelope.payload_type {
        PayloadType::Json => serde_json::from_str(&text)
            .map_err(|e| CodecError::Malformed(format!("invalid JSON: {e}"))),
        PayloadType::Other(other) => Err(CodecError::UnsupportedFormat {
            field: "type",
            value: other.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({ "name": "n", "inputs": { "a": 1 } })
    }

    #[test]
    fn base64_and_string_encodings_reproduce_the_payload() {
        for encoding in [Encoding::Base64, Encoding::Text] {
            let envelope = encode("n", &sample(), encoding).unwrap();
            assert_eq!(request_decode(&envelope).unwrap(), sample());
            assert_eq!(response_decode(&envelope).unwrap(), sample());
        }
    }

    #[test]
    fn envelope_uses_capitalised_wire_fields() {
        let envelope = encode("add", &json!({}), Encoding::Base64).unwrap();
        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            wire,
            json!({ "Name": "add", "Message": "e30=", "Encoding": "BASE64", "Type": "JSON" })
        );
    }

    #[test]
    fn unknown_encoding_is_a_protocol_error() {
        let envelope: Envelope = serde_json::from_value(json!({
            "Name": "n", "Message": "{}", "Encoding": "GZIP", "Type": "JSON"
        }))
        .unwrap();
        assert_eq!(
            request_decode(&envelope),
            Err(CodecError::UnsupportedFormat {
                field: "encoding",
                value: "GZIP".into()
            })
        );
    }

    #[test]
    fn unknown_type_is_a_protocol_error() {
        let envelope: Envelope = serde_json::from_value(json!({
            "Name": "n", "Message": "<a/>", "Encoding": "STRING", "Type": "XML"
        }))
        .unwrap();
        assert!(matches!(
            response_decode(&envelope),
            Err(CodecError::UnsupportedFormat { field: "type", .. })
        ));
    }

    #[test]
    fn corrupt_messages_are_malformed() {
        let mut envelope = encode("n", &sample(), Encoding::Base64).unwrap();
        envelope.message = "not base64!".into();
        assert!(matches!(request_decode(&envelope), Err(CodecError::Malformed(_))));

        let mut envelope = encode("n", &sample(), Encoding::Text).unwrap();
        envelope.message = "{ unterminated".into();
        assert!(matches!(request_decode(&envelope), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn cannot_encode_with_an_unknown_encoding() {
        assert!(encode("n", &sample(), Encoding::Other("GZIP".into())).is_err());
    }
}
