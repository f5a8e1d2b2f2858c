//! Top-level error taxonomy.
//!
//! `SdkError<E>` generalizes the teacher's `core::error::Ks3Error<E>` from
//! one service's error set to the full taxonomy every service built on
//! this core shares: local precondition failures raised during request
//! construction, transport/dispatch failures, credential failures, and the
//! response-pipeline's typed-vs-generic split.

use std::error::Error as StdError;
use std::fmt;

use crate::credential::CredentialsError;
use crate::transport::{BufferedHttpResponse, HttpDispatchError};

/// Generic error type returned by every operation built on this core.
#[derive(Debug)]
pub enum SdkError<E> {
    /// Input-shape constraints violated (min/max/pattern/length). Raised
    /// locally during request construction; never recovered by the core.
    Validation(String),
    /// The endpoint or a path template produced an unparseable URL.
    InvalidUrl(String),
    /// The operation's shape does not declare `allowStreaming` but the
    /// caller supplied a streaming body.
    StreamingNotAllowed,
    /// The operation's shape does not declare `allowChunkedStreaming` but
    /// the caller supplied a streaming body of unknown length.
    ChunkedStreamingNotAllowed,
    /// Credential acquisition or refresh failed.
    Credentials(CredentialsError),
    /// The HTTP transport failed to dispatch the request.
    HttpDispatch(HttpDispatchError),
    /// A service-defined error, mapped via the service's error taxonomy.
    Service(E),
    /// The response carried a recognized error envelope with a code this
    /// core doesn't know how to map to `E`.
    Generic(GenericResponseError),
    /// The response body could not be decoded into the expected shape.
    ParseError(String),
    /// An unrecognized 2xx/4xx/5xx response with no parseable error
    /// envelope at all; the raw response is attached for inspection.
    Unknown(BufferedHttpResponse),
}

/// The closed client/server error-code set (§6), used to classify a
/// `GenericResponseError`'s `code` for retry purposes before a service
/// taxonomy has a chance to claim it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwsErrorKind {
    // Common client errors.
    AccessDenied,
    IncompleteSignature,
    InvalidAction,
    InvalidClientTokenId,
    InvalidParameterValue,
    MissingAuthenticationToken,
    RequestExpired,
    Throttling,
    ValidationError,
    SignatureDoesNotMatch,
    // Common server errors.
    InternalFailure,
    ServiceUnavailable,
    /// A code outside the closed set above; the raw code is kept on
    /// `GenericResponseError::code`.
    Unrecognized,
}

impl AwsErrorKind {
    pub fn from_code(code: &str) -> AwsErrorKind {
        match code {
            "AccessDenied" => AwsErrorKind::AccessDenied,
            "IncompleteSignature" => AwsErrorKind::IncompleteSignature,
            "InvalidAction" => AwsErrorKind::InvalidAction,
            "InvalidClientTokenId" => AwsErrorKind::InvalidClientTokenId,
            "InvalidParameterValue" => AwsErrorKind::InvalidParameterValue,
            "MissingAuthenticationToken" => AwsErrorKind::MissingAuthenticationToken,
            "RequestExpired" => AwsErrorKind::RequestExpired,
            "Throttling" | "ThrottlingException" | "TooManyRequestsException" => AwsErrorKind::Throttling,
            "ValidationError" | "ValidationException" => AwsErrorKind::ValidationError,
            "SignatureDoesNotMatch" => AwsErrorKind::SignatureDoesNotMatch,
            "InternalFailure" | "InternalError" => AwsErrorKind::InternalFailure,
            "ServiceUnavailable" | "ServiceUnavailableException" => AwsErrorKind::ServiceUnavailable,
            _ => AwsErrorKind::Unrecognized,
        }
    }

    /// Whether this kind is eligible for the orchestrator's retry surface
    /// (§7's **Retryable** bucket, restricted to the common-error subset —
    /// 5xx/429 status is checked separately by the orchestrator).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            AwsErrorKind::Throttling | AwsErrorKind::InternalFailure | AwsErrorKind::ServiceUnavailable
        )
    }
}

/// A response carrying a recognized error envelope whose `code` matched
/// neither the service's own taxonomy nor the common client/server set.
#[derive(Debug, Clone)]
pub struct GenericResponseError {
    pub code: String,
    pub kind: AwsErrorKind,
    pub message: String,
    pub status: u16,
    pub additional_fields: std::collections::BTreeMap<String, String>,
}

impl fmt::Display for GenericResponseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.status, self.message)
    }
}

impl StdError for GenericResponseError {}

impl<E> From<CredentialsError> for SdkError<E> {
    fn from(err: CredentialsError) -> Self {
        SdkError::Credentials(err)
    }
}

impl<E> From<HttpDispatchError> for SdkError<E> {
    fn from(err: HttpDispatchError) -> Self {
        SdkError::HttpDispatch(err)
    }
}

impl<E> From<GenericResponseError> for SdkError<E> {
    fn from(err: GenericResponseError) -> Self {
        SdkError::Generic(err)
    }
}

impl<E> From<serde_json::Error> for SdkError<E> {
    fn from(err: serde_json::Error) -> Self {
        SdkError::ParseError(err.to_string())
    }
}

impl<E> From<crate::proto::xml::XmlParseError> for SdkError<E> {
    fn from(err: crate::proto::xml::XmlParseError) -> Self {
        SdkError::ParseError(err.0)
    }
}

impl<E> From<std::io::Error> for SdkError<E> {
    fn from(err: std::io::Error) -> Self {
        SdkError::HttpDispatch(HttpDispatchError::from(err))
    }
}

impl<E: StdError + 'static> fmt::Display for SdkError<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SdkError::Validation(msg) => write!(f, "validation error: {}", msg),
            SdkError::InvalidUrl(msg) => write!(f, "invalid url: {}", msg),
            SdkError::StreamingNotAllowed => write!(f, "operation does not allow a streaming body"),
            SdkError::ChunkedStreamingNotAllowed => {
                write!(f, "operation does not allow a streaming body of unknown length")
            }
            SdkError::Credentials(err) => write!(f, "{}", err),
            SdkError::HttpDispatch(err) => write!(f, "{}", err),
            SdkError::Service(err) => write!(f, "{}", err),
            SdkError::Generic(err) => write!(f, "{}", err),
            SdkError::ParseError(msg) => write!(f, "failed to parse response: {}", msg),
            SdkError::Unknown(res) => write!(f, "unrecognized response, status {}", res.status),
        }
    }
}

impl<E: StdError + 'static> StdError for SdkError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SdkError::Service(err) => Some(err),
            SdkError::Credentials(err) => Some(err),
            SdkError::HttpDispatch(err) => Some(err),
            SdkError::Generic(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_classify_into_the_closed_set() {
        assert_eq!(AwsErrorKind::from_code("Throttling"), AwsErrorKind::Throttling);
        assert_eq!(AwsErrorKind::from_code("ServiceUnavailable"), AwsErrorKind::ServiceUnavailable);
        assert!(AwsErrorKind::from_code("ServiceUnavailable").is_retryable());
        assert!(!AwsErrorKind::from_code("AccessDenied").is_retryable());
    }

    #[test]
    fn unknown_code_falls_back_to_unrecognized() {
        assert_eq!(AwsErrorKind::from_code("SomeFutureCode"), AwsErrorKind::Unrecognized);
    }
}
