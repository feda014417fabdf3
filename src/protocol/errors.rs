//! Errors which occur when talking to an ACME service

use http::HeaderValue;
use thiserror::Error;

pub use self::acme::{AcmeErrorCode, AcmeErrorDocument};

/// Unified error type for failures of the ACME protocol.
///
/// Any of these, surfaced from a renewal cycle, is a protocol error: the
/// cycle is abandoned and retried later.
#[derive(Debug, Error)]
pub enum AcmeError {
    /// The ACME provider returned an error, see [`AcmeErrorDocument`].
    #[error("the ACME service reported an error: {0}")]
    Acme(#[source] AcmeErrorDocument),

    /// The ACME provider returned an HTTP error without a problem document.
    #[error("the ACME service responded with HTTP {status}")]
    HttpStatus {
        /// HTTP status of the response
        status: http::StatusCode,
        /// Raw body, if there was one
        body: Option<String>,
    },

    /// `reqwest` failed while fulfilling the HTTP request.
    #[error("network request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// The JSON payload of a response could not be deserialized.
    #[error("deserializing JSON: {0}")]
    JsonDeserialize(#[source] serde_json::Error),

    /// The JSON payload of a request could not be serialized.
    #[error("serializing JSON: {0}")]
    JsonSerialize(#[source] serde_json::Error),

    /// A PEM document in a response could not be decoded.
    #[error("decoding a PEM document: {0}")]
    PemDecode(#[from] pem_rfc7468::Error),

    /// A DER structure could not be encoded or decoded.
    #[error("DER encoding: {0}")]
    Der(#[from] der::Error),

    /// The response contained data that was not UTF-8.
    #[error("response was not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The `Replay-Nonce` header was not a valid header string.
    #[error("the nonce header returned was not valid: {0:?}")]
    InvalidNonce(Option<HeaderValue>),

    /// The ACME provider did not provide a nonce.
    #[error("no nonce header was returned with the request")]
    MissingNonce,

    /// Fetching a fresh nonce from the `newNonce` endpoint failed.
    #[error("fetching a new nonce: {0}")]
    NonceRequest(#[source] reqwest::Error),

    /// Signing the JWS envelope failed.
    #[error("signing the JWS token: {0}")]
    Signing(#[source] signature::Error),

    /// Some data the protocol requires was missing from a response.
    #[error("required data is missing: {0}")]
    MissingData(&'static str),

    /// An authorization did not offer an HTTP-01 challenge.
    #[error("authorization for {0} does not offer an http-01 challenge")]
    MissingChallenge(String),

    /// The resource is not in a state where the requested operation is possible.
    #[error("{0} is not ready")]
    NotReady(&'static str),
}

impl AcmeError {
    /// Constructor for a deserialization error.
    pub fn de(error: serde_json::Error) -> Self {
        AcmeError::JsonDeserialize(error)
    }

    /// Constructor for a serialization error.
    pub fn ser(error: serde_json::Error) -> Self {
        AcmeError::JsonSerialize(error)
    }

    /// Constructor for a nonce request error.
    pub fn nonce(error: reqwest::Error) -> Self {
        AcmeError::NonceRequest(error)
    }

    /// The ACME error code, when the provider sent a problem document.
    pub fn code(&self) -> Option<&AcmeErrorCode> {
        match self {
            AcmeError::Acme(document) => Some(document.kind()),
            _ => None,
        }
    }
}

impl From<AcmeErrorDocument> for AcmeError {
    fn from(value: AcmeErrorDocument) -> Self {
        AcmeError::Acme(value)
    }
}

mod acme {
    use std::fmt;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    /// Error document returned by ACME servers when a request has failed.
    ///
    /// ACME error documents follow RFC 7807 "Problem Details for HTTP APIs".
    #[derive(Debug, Clone, Error, Serialize, Deserialize)]
    #[serde(from = "RawErrorInfo")]
    #[error("{code}: {detail}")]
    pub struct AcmeErrorDocument {
        code: AcmeErrorCode,
        detail: String,
    }

    impl AcmeErrorDocument {
        /// Build a document from a `urn:ietf:params:acme:error:*` type and detail.
        pub fn new(kind: impl Into<String>, detail: impl Into<String>) -> Self {
            AcmeErrorDocument {
                code: kind.into().into(),
                detail: detail.into(),
            }
        }

        /// The error code provided in the ACME error document.
        pub fn kind(&self) -> &AcmeErrorCode {
            &self.code
        }

        /// The human readable message in the ACME error document.
        pub fn message(&self) -> &str {
            &self.detail
        }
    }

    /// Specific code indicating the kind of error that an ACME server
    /// encountered, from the RFC 8555 error registry.
    ///
    /// Only the codes this crate reacts to are broken out.
    #[derive(Debug, Serialize, Clone, PartialEq, Eq)]
    #[non_exhaustive]
    pub enum AcmeErrorCode {
        /// A bad nonce was sent with the request. Try again with a new nonce.
        BadNonce,

        /// `onlyReturnExisting` was set and no account matches the key.
        AccountDoesNotExist,

        /// The operator must visit a URL (usually new terms of service).
        UserActionRequired,

        /// The request exceeded a rate limit.
        RateLimited,

        /// Some other error occured.
        Other(String),
    }

    impl fmt::Display for AcmeErrorCode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                AcmeErrorCode::BadNonce => f.write_str("an invalid nonce was sent"),
                AcmeErrorCode::AccountDoesNotExist => f.write_str("account does not exist"),
                AcmeErrorCode::UserActionRequired => f.write_str("user action required"),
                AcmeErrorCode::RateLimited => f.write_str("rate limited"),
                AcmeErrorCode::Other(message) => f.write_str(message),
            }
        }
    }

    impl From<String> for AcmeErrorCode {
        fn from(value: String) -> Self {
            const URN: &[&str; 5] = &["urn", "ietf", "params", "acme", "error"];

            let urn = value.split(':').collect::<Vec<_>>();
            if !urn
                .iter()
                .take(5)
                .zip(URN)
                .all(|(&part, &expected)| part == expected)
            {
                tracing::warn!("Unexpected error URN: {value}");
            }

            match urn.get(5).copied() {
                Some("badNonce") => AcmeErrorCode::BadNonce,
                Some("accountDoesNotExist") => AcmeErrorCode::AccountDoesNotExist,
                Some("userActionRequired") => AcmeErrorCode::UserActionRequired,
                Some("rateLimited") => AcmeErrorCode::RateLimited,
                _ => AcmeErrorCode::Other(value),
            }
        }
    }

    /// Deserializable format for an ACME error document.
    #[derive(Debug, Clone, Deserialize)]
    struct RawErrorInfo {
        r#type: String,
        #[serde(default)]
        detail: String,
    }

    impl From<RawErrorInfo> for AcmeErrorDocument {
        fn from(value: RawErrorInfo) -> Self {
            AcmeErrorDocument {
                code: value.r#type.into(),
                detail: value.detail,
            }
        }
    }
}
