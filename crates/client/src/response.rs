//! The client-side response envelope.
//!
//! Every call resolves to an [`SdkResponse`]; transport and server failures are
//! reported through [`SdkResponse::errors`] rather than as `Err`.
//!
//! ## Content negotiation
//!
//! Exactly one branch is taken per response, checked in this order:
//!
//! | Content type contains | Result |
//! |-----------------------|--------|
//! | `application/json` | parsed into `data` |
//! | `text/` | text `rawData` |
//! | `application/pdf`, `application/octet-stream`, `image/`, `application/zip` | binary `rawData` |
//! | anything else (or no content type) | text `rawData` |

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Json,
    Text,
    Binary,
    /// Unrecognised content; read as text.
    Fallback,
}

const BINARY_TYPES: [&str; 4] = [
    "application/pdf",
    "application/octet-stream",
    "image/",
    "application/zip",
];

pub fn classify_content_type(content_type: Option<&str>) -> ContentClass {
    let Some(ct) = content_type else {
        return ContentClass::Fallback;
    };
    if ct.contains("application/json") {
        ContentClass::Json
    } else if ct.contains("text/") {
        ContentClass::Text
    } else if BINARY_TYPES.iter().any(|b| ct.contains(b)) {
        ContentClass::Binary
    } else {
        ContentClass::Fallback
    }
}

/// A non-JSON response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RawData {
    Text(String),
    Binary(Vec<u8>),
}

/// One reported failure: the HTTP status plus whatever fields the server sent.
///
/// The HTTP status always wins over a `status` field in the server's body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ErrorRecord {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            fields: Map::new(),
        }
    }

    /// Merges `status` with one error value from the server.
    pub fn from_server(status: u16, value: Value) -> Self {
        match value {
            Value::Object(mut fields) => {
                fields.remove("status");
                let message = match fields.remove("message") {
                    Some(Value::String(text)) => Some(text),
                    Some(other) => Some(other.to_string()),
                    None => None,
                };
                Self {
                    status,
                    message,
                    fields,
                }
            }
            Value::String(text) => Self::new(status, text),
            other => Self::new(status, other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub raw_data: Option<RawData>,
    pub errors: Option<Vec<ErrorRecord>>,
    pub content_type: Option<String>,
    pub status: Option<u16>,
}

impl SdkResponse {
    /// The response for a request that never produced an HTTP reply.
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            errors: Some(vec![ErrorRecord::new(500, message)]),
            ..Self::default()
        }
    }
}

/// Builds the envelope for an HTTP reply.
pub fn interpret(
    status: u16,
    status_text: &str,
    content_type: Option<String>,
    body: &[u8],
) -> SdkResponse {
    let class = classify_content_type(content_type.as_deref());
    let mut response = SdkResponse {
        status: Some(status),
        content_type,
        ..SdkResponse::default()
    };

    if !(200..300).contains(&status) {
        let json = match class {
            ContentClass::Json => serde_json::from_slice::<Value>(body).ok(),
            _ => None,
        };
        let errors = match json {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| ErrorRecord::from_server(status, item))
                .collect(),
            Some(value) => vec![ErrorRecord::from_server(status, value)],
            None => vec![ErrorRecord::new(status, status_text)],
        };
        response.errors = Some(errors);
        return response;
    }

    response.success = true;
    let text = || String::from_utf8_lossy(body).into_owned();
    match class {
        ContentClass::Json => match serde_json::from_slice(body) {
            Ok(value) => response.data = Some(value),
            Err(_) => response.raw_data = Some(RawData::Text(text())),
        },
        ContentClass::Text | ContentClass::Fallback => {
            response.raw_data = Some(RawData::Text(text()));
        }
        ContentClass::Binary => response.raw_data = Some(RawData::Binary(body.to_vec())),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_types_are_classified_once() {
        let cases = [
            (Some("application/json; charset=utf-8"), ContentClass::Json),
            (Some("text/html"), ContentClass::Text),
            (Some("text/csv"), ContentClass::Text),
            (Some("application/pdf"), ContentClass::Binary),
            (Some("image/png"), ContentClass::Binary),
            (Some("application/zip"), ContentClass::Binary),
            (Some("application/octet-stream"), ContentClass::Binary),
            (Some("application/xml"), ContentClass::Fallback),
            (None, ContentClass::Fallback),
        ];
        for (ct, expected) in cases {
            assert_eq!(classify_content_type(ct), expected, "{ct:?}");
        }
    }

    #[test]
    fn json_success_fills_data_only() {
        let r = interpret(200, "OK", Some("application/json".into()), br#"{"result":3}"#);
        assert!(r.success);
        assert_eq!(r.data, Some(json!({ "result": 3 })));
        assert_eq!(r.raw_data, None);
        assert_eq!(r.errors, None);
        assert_eq!(r.status, Some(200));
    }

    #[test]
    fn html_and_pdf_fill_raw_data() {
        let html = interpret(200, "OK", Some("text/html".into()), b"<h1>x</h1>");
        assert_eq!(html.raw_data, Some(RawData::Text("<h1>x</h1>".into())));
        assert_eq!(html.data, None);

        let pdf = interpret(200, "OK", Some("application/pdf".into()), &[37, 80, 68, 70]);
        assert_eq!(pdf.raw_data, Some(RawData::Binary(vec![37, 80, 68, 70])));
    }

    #[test]
    fn json_errors_merge_status_with_server_fields() {
        let r = interpret(
            400,
            "Bad Request",
            Some("application/json".into()),
            br#"{"error":"bad"}"#,
        );
        assert!(!r.success);
        let errors = r.errors.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            serde_json::to_value(&errors[0]).unwrap(),
            json!({ "status": 400, "error": "bad" })
        );

        let many = interpret(
            422,
            "Unprocessable Entity",
            Some("application/json".into()),
            br#"[{"message":"a"},{"message":"b","field":"x"}]"#,
        );
        let errors = many.errors.unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].message.as_deref(), Some("b"));
        assert_eq!(errors[1].fields["field"], json!("x"));
        assert!(errors.iter().all(|e| e.status == 422));
    }

    #[test]
    fn non_json_errors_use_the_status_text() {
        let r = interpret(502, "Bad Gateway", Some("text/plain".into()), b"upstream");
        assert_eq!(r.errors, Some(vec![ErrorRecord::new(502, "Bad Gateway")]));
    }

    #[test]
    fn transport_errors_have_no_status() {
        let r = SdkResponse::transport_error("connection refused");
        assert!(!r.success);
        assert_eq!(r.status, None);
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({
                "success": false,
                "data": null,
                "rawData": null,
                "errors": [{ "status": 500, "message": "connection refused" }],
                "contentType": null,
                "status": null,
            })
        );
    }
}
