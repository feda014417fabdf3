//! # ACME wire protocol
//!
//! ACME requests are authenticated as flattened JWS documents, signed by the
//! account key. This module provides the signing envelope ([`jose`]), the
//! request and response types, and a [`Client`] which tracks the anti-replay
//! nonce through a series of requests.
//!
//! The orchestration layer never talks to this module directly; it goes
//! through [`crate::session::Session`], which [`crate::service::Provider`]
//! implements on top of this client.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod client;
pub mod errors;
pub mod jose;
pub mod request;
pub mod response;

pub use client::Client;
pub use errors::AcmeError;

#[doc(no_inline)]
pub use request::Request;
#[doc(no_inline)]
pub use response::Response;

/// An ACME resource URL.
///
/// Accounts, orders, authorizations and challenges are all identified by
/// their URL, so this shows up in logs often; `Debug` prints it whole.
/// Everything else comes from [`url::Url`] through `Deref`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Url(url::Url);

impl Url {
    /// Resolve a reference from a header (`Location`, `Link`) against this
    /// URL, which is the URL the response came from.
    pub fn join(&self, reference: &str) -> Result<Url, url::ParseError> {
        self.0.join(reference).map(Url)
    }
}

impl Deref for Url {
    type Target = url::Url;

    fn deref(&self) -> &url::Url {
        &self.0
    }
}

impl From<url::Url> for Url {
    fn from(value: url::Url) -> Self {
        Url(value)
    }
}

impl FromStr for Url {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        url::Url::parse(s).map(Url)
    }
}

impl fmt::Debug for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Url({:?})", self.0.as_str())
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
