//! The ACME directory, fetched once per session.

use serde::{Deserialize, Serialize};

use crate::protocol::Url;

/// Directories are the single source required to configure an ACME client
/// for use with a specific provider. They can be fetched as JSON from an
/// advertised directory URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    /// URL used to fetch a new Nonce via a HEAD request
    pub new_nonce: Url,

    /// URL to create a new account
    pub new_account: Url,

    /// URL to create a new certificate order
    pub new_order: Url,

    /// Additional metadata
    #[serde(default)]
    pub meta: Option<Metadata>,
}

impl Directory {
    /// The current terms of service, if the provider publishes any.
    pub fn terms_of_service(&self) -> Option<&Url> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.terms_of_service.as_ref())
    }
}

/// Optional provider metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// A URL to find and display terms of service for the ACME server
    #[serde(default)]
    pub terms_of_service: Option<Url>,

    /// A URL for the default website of the ACME server
    #[serde(default)]
    pub website: Option<Url>,

    /// Whether an external account registration is required to register
    /// with this provider.
    #[serde(default)]
    pub external_account_required: Option<bool>,
}
