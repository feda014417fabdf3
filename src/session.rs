//! The seam between renewal and the certificate authority
//!
//! The renewal pipeline never speaks ACME itself. It drives a [`Session`]
//! (obtained from a [`Connector`]) and the order and authorization handles
//! the session hands out. [`crate::service::Provider`] implements these
//! traits over the wire; tests implement them in memory.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cert::{CertificateChain, SignedCertificateRequest};
use crate::key::AccountKey;
use crate::protocol::{AcmeError, Url};

/// Lifecycle states shared by orders and authorizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Waiting on the client.
    Pending,
    /// Order only: every authorization is valid, the order can be finalized.
    Ready,
    /// The provider is working on it.
    Processing,
    /// Terminal success.
    Valid,
    /// Terminal failure.
    Invalid,
    /// Authorization only: deactivated by the client.
    Deactivated,
    /// Authorization only: expired before it was used.
    Expired,
    /// Authorization only: revoked by the provider.
    Revoked,
}

impl Status {
    /// Whether no further update will change this status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Pending | Status::Ready | Status::Processing)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Pending => "pending",
            Status::Ready => "ready",
            Status::Processing => "processing",
            Status::Valid => "valid",
            Status::Invalid => "invalid",
            Status::Deactivated => "deactivated",
            Status::Expired => "expired",
            Status::Revoked => "revoked",
        };
        f.write_str(name)
    }
}

/// An authenticated account: the key and the account URL it is bound to.
#[derive(Debug, Clone)]
pub struct Login {
    key: Arc<AccountKey>,
    account: Url,
}

impl Login {
    /// Bind `key` to the account at `account`.
    pub fn new(key: Arc<AccountKey>, account: Url) -> Self {
        Login { key, account }
    }

    /// The account key.
    pub fn key(&self) -> &Arc<AccountKey> {
        &self.key
    }

    /// The account URL, sent as `kid` on every request.
    pub fn account(&self) -> &Url {
        &self.account
    }
}

/// An HTTP-01 challenge, ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http01Challenge {
    /// The token, last segment of `/.well-known/acme-challenge/{token}`.
    pub token: String,
    /// The body to serve for the token.
    pub key_authorization: String,
    /// The challenge URL at the provider.
    pub url: Url,
}

/// A CA resource whose status can be refreshed.
#[async_trait]
pub trait Resource: Send {
    /// Fetch the current state of the resource.
    ///
    /// Returns `Some(instant)` when the provider asked not to be polled
    /// again before that instant; the status is then not meaningful yet.
    async fn update(&mut self) -> Result<Option<DateTime<Utc>>, AcmeError>;

    /// The status as of the last update.
    fn status(&self) -> Status;
}

/// An authorization of a single identifier within an order.
#[async_trait]
pub trait AuthorizationHandle: Resource + Sync {
    /// The identifier being authorized.
    fn domain(&self) -> &str;

    /// The HTTP-01 challenge offered for this authorization.
    fn http01(&self) -> Option<Http01Challenge>;

    /// Tell the provider the challenge content is being served.
    async fn trigger(&self, challenge: &Http01Challenge) -> Result<(), AcmeError>;
}

/// A certificate order.
#[async_trait]
pub trait OrderHandle: Resource + Sync {
    /// Fetch the authorizations for this order.
    async fn authorizations(&self) -> Result<Vec<Box<dyn AuthorizationHandle>>, AcmeError>;

    /// Submit the certificate request. Only valid once every authorization is
    /// valid.
    async fn finalize(&mut self, csr: &SignedCertificateRequest) -> Result<(), AcmeError>;

    /// Download the issued chain. Only valid once the order is valid.
    async fn certificate(&self) -> Result<CertificateChain, AcmeError>;
}

/// A connection to a certificate authority.
#[async_trait]
pub trait Session: Send + Sync {
    /// Look up the account registered for `key`, without creating one.
    async fn find_account(&self, key: &Arc<AccountKey>) -> Result<Option<Login>, AcmeError>;

    /// The terms of service currently in force, if the provider has any.
    async fn terms_of_service(&self) -> Result<Option<Url>, AcmeError>;

    /// Register a new account for `key`.
    async fn create_account(
        &self,
        key: &Arc<AccountKey>,
        contact: &[Url],
        terms_agreed: bool,
    ) -> Result<Login, AcmeError>;

    /// Create an order for a certificate covering `domain`.
    async fn new_order(
        &self,
        login: &Login,
        domain: &str,
    ) -> Result<Box<dyn OrderHandle>, AcmeError>;
}

/// Opens sessions against a provider's directory URL.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the provider at `directory`.
    async fn connect(&self, directory: &Url) -> Result<Arc<dyn Session>, AcmeError>;
}
