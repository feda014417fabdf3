//! # Certificate orders
//!
//! Each order corresponds to a single request for a certificate chain. The
//! order is created by the client, and then validated using the
//! authorizations and challenges.

use base64ct::Encoding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifier::Identifier;
use crate::cert::SignedCertificateRequest;
use crate::protocol::errors::AcmeErrorDocument;
use crate::protocol::Url;

/// An ACME order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    status: OrderStatus,
    #[serde(default)]
    expires: Option<DateTime<Utc>>,
    identifiers: Vec<Identifier>,
    #[serde(default)]
    error: Option<AcmeErrorDocument>,
    authorizations: Vec<Url>,
    finalize: Url,
    #[serde(default)]
    certificate: Option<Url>,
}

impl Order {
    /// The status of the order.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// The time at which the order expires, and the provider will
    /// no longer consider it valid.
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    /// The identifiers which apply to this order.
    pub fn identifiers(&self) -> &[Identifier] {
        self.identifiers.as_ref()
    }

    /// The error, if any, which occurred while processing the order.
    pub fn error(&self) -> Option<&AcmeErrorDocument> {
        self.error.as_ref()
    }

    /// The urls pointing to the Authorization objects for this order.
    pub fn authorizations(&self) -> &[Url] {
        self.authorizations.as_ref()
    }

    /// The URL used to finalize this order with a CSR.
    pub fn finalize(&self) -> &Url {
        &self.finalize
    }

    /// The URL used to fetch this order's certificate chain.
    pub fn certificate(&self) -> Option<&Url> {
        self.certificate.as_ref()
    }
}

/// State of the order during processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order is waiting for authorizations to be completed.
    Pending,

    /// Order is ready for a certificate signing request.
    Ready,

    /// ACME provider is processing the certificate signing request.
    Processing,

    /// ACME provider has issued the certificate.
    Valid,

    /// ACME provider has encountered an error while processing the order, and the entire
    /// order is now considered invalid.
    Invalid,
}

/// A request to create a new order associated with an ACME account.
///
/// The associated account is specified by the key used to sign the JWS request.
#[derive(Debug, Serialize)]
pub struct NewOrderRequest {
    /// A list of identifiers to include in the order.
    pub identifiers: Vec<Identifier>,
}

impl NewOrderRequest {
    /// An order for a single DNS name.
    pub fn for_domain(domain: &str) -> Self {
        NewOrderRequest {
            identifiers: vec![Identifier::dns(domain)],
        }
    }
}

/// The request sent to finalize an order, carrying the DER CSR as
/// unpadded base64url.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeOrder {
    csr: String,
}

impl From<&SignedCertificateRequest> for FinalizeOrder {
    fn from(value: &SignedCertificateRequest) -> Self {
        FinalizeOrder {
            csr: base64ct::Base64UrlUnpadded::encode_string(value.as_ref()),
        }
    }
}
