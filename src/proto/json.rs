//! JSON and restJson1 dialect primitives.
//!
//! Grounded on the teacher's `core::proto::json::{error, payload}` modules:
//! `Error::parse`/`Error::parse_rest` are kept close to verbatim (they
//! already implement exactly the dialect-aware envelope detection the
//! response pipeline needs) and `ResponsePayload`'s empty/`null`-body
//! normalization is folded into `decode`.

use bytes::Bytes;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Encodes `value` as a JSON document. The whole-shape case (no declared
/// payload member) and the single-payload-member case are both just "encode
/// this value as JSON" from this facade's point of view; which value is
/// passed in is decided by generated code walking the shape's descriptors.
pub fn encode(value: &impl Serialize) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(value).map(Bytes::from)
}

/// Decodes a JSON body into `T`, normalizing an empty or literal `null`
/// body to `{}` first (AWS returns `{}` for field-less responses; an empty
/// body is also seen on some 204s that generated code still routes here).
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, serde_json::Error> {
    let normalized: &[u8] = if body.is_empty() || body == b"null" {
        b"{}"
    } else {
        body
    };
    debug!("decoding json body ({} bytes)", normalized.len());
    serde_json::from_slice(normalized)
}

/// A detected dialect error envelope: the resolved error code (service
/// shape name) and message, plus any other top-level string fields the
/// server included (`additionalFields` in the spec's taxonomy).
#[derive(Debug, Clone, Default)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub additional_fields: HashMap<String, String>,
}

#[derive(serde::Deserialize)]
struct RawError {
    #[serde(rename = "__type", default)]
    typ: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// `json` dialect envelope: `{"__type": "...", "message": "..."}`. The
/// type may carry a `namespace#ErrorName` prefix; only the trailing segment
/// is the error code.
pub fn parse_json_error(body: &[u8]) -> Option<ErrorEnvelope> {
    let raw: RawError = serde_json::from_slice(body).ok()?;
    let raw_type = raw.typ.unwrap_or_else(|| "Unknown".to_owned());
    let code = raw_type.rsplit('#').next().unwrap_or("Unknown").to_owned();
    Some(ErrorEnvelope {
        code,
        message: raw.message.unwrap_or_default(),
        additional_fields: HashMap::new(),
    })
}

/// `restjson` dialect envelope: code from the `x-amzn-errortype` header
/// (stripping any trailing `:...` URL) if present, else from a top-level
/// `code`/`Code` JSON field; message from `message`/`Message`; every other
/// top-level string field becomes an additional field.
pub fn parse_restjson_error(
    body: &[u8],
    error_type_header: Option<&str>,
) -> Option<ErrorEnvelope> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;

    let code = match error_type_header {
        Some(header) => {
            let trimmed = header.split(':').next().unwrap_or("Unknown");
            trimmed.rsplit('#').next().unwrap_or(trimmed).to_owned()
        }
        None => {
            let raw = json
                .get("code")
                .or_else(|| json.get("Code"))
                .or_else(|| json.get("__type"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("Unknown");
            raw.rsplit('#').next().unwrap_or(raw).to_owned()
        }
    };

    let message = json
        .get("message")
        .or_else(|| json.get("Message"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("")
        .to_owned();

    let mut additional_fields = HashMap::new();
    if let serde_json::Value::Object(map) = &json {
        for (k, v) in map {
            if matches!(k.as_str(), "code" | "Code" | "message" | "Message" | "__type") {
                continue;
            }
            if let Some(s) = v.as_str() {
                additional_fields.insert(k.clone(), s.to_owned());
            }
        }
    }

    Some(ErrorEnvelope {
        code,
        message,
        additional_fields,
    })
}
