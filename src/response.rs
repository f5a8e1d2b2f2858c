//! Response Pipeline (C7): collate the body, detect and map the
//! dialect-specific error envelope through the service/common/generic
//! taxonomy chain, or decode a success body into a typed output.
//!
//! Grounded on the teacher's `core::proto::json::{error, payload}` dialect
//! parsing (already generalized into `crate::proto::json`/`crate::proto::xml`)
//! plus `core::error::Ks3Error`'s `Unknown(BufferedHttpResponse)` fallback
//! for a response that carries no parseable envelope at all.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::encoding::{Location, ShapeEncodingDescriptor};
use crate::error::{AwsErrorKind, GenericResponseError, SdkError};
use crate::proto::{json, xml, Dialect};
use crate::transport::BufferedHttpResponse;

/// Maps a detected error `code` to a service-specific error `E`. Generated
/// per-service code supplies this; the core only calls it.
pub trait ErrorTaxonomy<E> {
    fn map(&self, code: &str, response: &BufferedHttpResponse, message: &str) -> Option<E>;
}

/// A no-op taxonomy for operations/tests with no service-specific errors;
/// every code falls through to the common/generic path.
pub struct EmptyTaxonomy;

impl<E> ErrorTaxonomy<E> for EmptyTaxonomy {
    fn map(&self, _code: &str, _response: &BufferedHttpResponse, _message: &str) -> Option<E> {
        None
    }
}

/// Detects the dialect-specific error envelope in `response.body` and
/// returns the envelope's fields, or `None` if no envelope could be
/// parsed at all (the caller then falls back to `SdkError::Unknown`).
fn detect_envelope(dialect: Dialect, response: &BufferedHttpResponse) -> Option<json::ErrorEnvelope> {
    match dialect {
        Dialect::Json => json::parse_json_error(&response.body),
        Dialect::RestJson => json::parse_restjson_error(&response.body, response.header("x-amzn-errortype")),
        Dialect::RestXml => xml::parse_restxml_error(&response.body),
        Dialect::Query | Dialect::Ec2 => xml::parse_query_error(&response.body),
    }
}

/// Runs steps 2–3 of §4.5: detect the envelope, then map its code through
/// the service taxonomy, falling back to the common client/server set,
/// then to a generic `GenericResponseError`.
pub fn classify_error<E>(
    dialect: Dialect,
    response: &BufferedHttpResponse,
    taxonomy: &dyn ErrorTaxonomy<E>,
) -> SdkError<E> {
    let envelope = match detect_envelope(dialect, response) {
        Some(env) => env,
        None => return SdkError::Unknown(response.clone()),
    };

    if let Some(service_error) = taxonomy.map(&envelope.code, response, &envelope.message) {
        return SdkError::Service(service_error);
    }

    let kind = AwsErrorKind::from_code(&envelope.code);
    SdkError::Generic(GenericResponseError {
        code: envelope.code,
        kind,
        message: envelope.message,
        status: response.status,
        additional_fields: envelope.additional_fields.into_iter().collect(),
    })
}

/// Whether an error, once classified, is eligible for the orchestrator's
/// retry surface: 5xx/429 status, or a common error code in the
/// retryable subset (§7's **Retryable** bucket).
pub fn is_retryable<E>(status: u16, err: &SdkError<E>) -> bool {
    if status == 429 || (500..600).contains(&status) {
        return true;
    }
    matches!(err, SdkError::Generic(g) if g.kind.is_retryable())
}

/// Success-path decode (§4.5 step 4/5): decode the body into `T` per
/// dialect, then populate any `header`/`headerPrefix`/`statusCode`-located
/// members from the response's headers/status. `output_descriptors` lists
/// only the members with such a location; `populate` is called once per
/// descriptor with the resolved string value so generated code can write
/// it back onto the typed output (reflection into `T` itself stays
/// out of scope, same as encoding).
pub fn decode_success<T, E>(
    dialect: Dialect,
    response: &BufferedHttpResponse,
    output_descriptors: &[ShapeEncodingDescriptor],
    mut populate: impl FnMut(&str, HeaderBoundValue),
) -> Result<T, SdkError<E>>
where
    T: DeserializeOwned + Default,
{
    let body = match dialect {
        Dialect::Json | Dialect::RestJson => json::decode(&response.body)?,
        Dialect::RestXml | Dialect::Query | Dialect::Ec2 => {
            let unwrapped = xml::unwrap_operation_result(&response.body);
            if unwrapped.is_empty() {
                T::default()
            } else {
                quick_xml_decode(&unwrapped)?
            }
        }
    };

    for descriptor in output_descriptors {
        match &descriptor.location {
            Some(Location::Header { name }) => {
                if let Some(value) = response.header(name) {
                    populate(descriptor.label, HeaderBoundValue::Str(value.to_owned()));
                }
            }
            Some(Location::HeaderPrefix { prefix }) => {
                let mut map = BTreeMap::new();
                for (k, v) in &response.headers {
                    if let Some(stripped) = k.strip_prefix(prefix.to_ascii_lowercase().as_str()) {
                        map.insert(stripped.to_owned(), v.clone());
                    }
                }
                populate(descriptor.label, HeaderBoundValue::Map(map));
            }
            Some(Location::StatusCode) => {
                populate(descriptor.label, HeaderBoundValue::Status(response.status));
            }
            _ => {}
        }
    }

    Ok(body)
}

/// A response-header-derived value handed to the `populate` callback in
/// `decode_success`, since header/status values are always strings/ints
/// rather than the structured `MemberValue` the request side uses.
pub enum HeaderBoundValue {
    Str(String),
    Map(BTreeMap<String, String>),
    Status(u16),
}

/// restXml/query/ec2 share the same XML decode entry point from the
/// facade's point of view. This core carries no generic XML-to-struct
/// derive (§1's reflective decoder is out of scope), so it can't decode
/// an arbitrary `T`'s nested list/map members — those stay generated-code
/// territory, decoded via hand-written `{Op}OutputDeserializer`s calling
/// `crate::proto::xml`'s element-walking primitives directly, the way the
/// teacher's `CreateBucketOutputDeserializer` does. What this facade *can*
/// do generically is the common case: walk the result root's immediate
/// children via `xml::decode_flat_scalars` and hand the collected
/// `name -> text` pairs to `T`'s `Deserialize` impl as a flat JSON object,
/// which round-trips correctly for any output shape whose body members are
/// plain scalars. A shape with nested members simply fails that
/// deserialize and falls back to `T::default()`, same as before.
fn quick_xml_decode<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, serde_json::Error> {
    let fields = xml::decode_flat_scalars(body).unwrap_or_default();
    let object = fields
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    Ok(serde_json::from_value(serde_json::Value::Object(object)).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn response(status: u16, headers: HashMap<String, String>, body: &[u8]) -> BufferedHttpResponse {
        BufferedHttpResponse {
            status,
            headers,
            body: bytes::Bytes::copy_from_slice(body),
        }
    }

    #[derive(Debug, PartialEq)]
    enum DemoError {
        ResourceNotFound,
    }

    struct DemoTaxonomy;
    impl ErrorTaxonomy<DemoError> for DemoTaxonomy {
        fn map(&self, code: &str, _response: &BufferedHttpResponse, _message: &str) -> Option<DemoError> {
            match code {
                "ResourceNotFoundException" => Some(DemoError::ResourceNotFound),
                _ => None,
            }
        }
    }

    #[test]
    fn restjson_error_maps_through_the_service_taxonomy() {
        let body = br#"{"__type":"ResourceNotFoundException","message":"no such table"}"#;
        let res = response(400, HashMap::new(), body);
        let err = classify_error(Dialect::RestJson, &res, &DemoTaxonomy);
        assert!(matches!(err, SdkError::Service(DemoError::ResourceNotFound)));
    }

    #[test]
    fn unrecognized_restjson_code_falls_back_to_generic() {
        let body = br#"{"__type":"SomeNewException","message":"boom"}"#;
        let res = response(400, HashMap::new(), body);
        let err: SdkError<DemoError> = classify_error(Dialect::RestJson, &res, &DemoTaxonomy);
        match err {
            SdkError::Generic(g) => assert_eq!(g.code, "SomeNewException"),
            other => panic!("expected Generic, got {:?}", other),
        }
    }

    #[test]
    fn throttling_code_is_retryable() {
        let body = br#"{"__type":"ThrottlingException","message":"slow down"}"#;
        let res = response(400, HashMap::new(), body);
        let err: SdkError<DemoError> = classify_error(Dialect::RestJson, &res, &DemoTaxonomy);
        assert!(is_retryable(400, &err));
    }

    #[test]
    fn non_json_body_with_no_envelope_is_unknown() {
        let res = response(500, HashMap::new(), b"not json at all");
        let err: SdkError<DemoError> = classify_error(Dialect::RestJson, &res, &DemoTaxonomy);
        assert!(matches!(err, SdkError::Unknown(_)));
    }

    #[test]
    fn status_5xx_is_always_retryable_regardless_of_code() {
        let body = br#"{"__type":"SomeOtherException","message":"x"}"#;
        let res = response(503, HashMap::new(), body);
        let err: SdkError<DemoError> = classify_error(Dialect::RestJson, &res, &DemoTaxonomy);
        assert!(is_retryable(503, &err));
    }

    #[derive(Debug, PartialEq, Default, serde::Deserialize)]
    struct CreateBucketOutput {
        #[serde(rename = "Location")]
        location: String,
    }

    #[test]
    fn restxml_success_body_decodes_scalar_result_members() {
        let body = br#"<CreateBucketResponse xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
            <CreateBucketResult><Location>/mybucket</Location></CreateBucketResult>
        </CreateBucketResponse>"#;
        let res = response(200, HashMap::new(), body);
        let out = decode_success::<CreateBucketOutput, ()>(Dialect::RestXml, &res, &[], |_, _| {}).unwrap();
        assert_eq!(out, CreateBucketOutput { location: "/mybucket".to_owned() });
    }

    #[test]
    fn query_dialect_success_body_decodes_through_result_unwrap() {
        let body = br#"<CreateBucketResponse><CreateBucketResult><Location>/other</Location></CreateBucketResult></CreateBucketResponse>"#;
        let res = response(200, HashMap::new(), body);
        let out = decode_success::<CreateBucketOutput, ()>(Dialect::Query, &res, &[], |_, _| {}).unwrap();
        assert_eq!(out, CreateBucketOutput { location: "/other".to_owned() });
    }
}
