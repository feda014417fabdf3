//! A [`Session`] backed by a real ACME service
//!
//! The usual flow through this module is driven by
//! [`crate::orchestrator::Orchestrator`]:
//!
//! 1. Connect to a [`Provider`] through a [`ProviderConnector`].
//! 2. Look up or register the account for the account key.
//! 3. Create an [`Order`] for the domain.
//! 4. Complete the HTTP-01 challenge attached to each [`Authorization`].
//! 5. Finalize the order with a certificate signing request.
//! 6. Download the certificate chain.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::key::AccountKey;
use crate::protocol::{AcmeError, Request, Response, Url};
use crate::schema::directory::Directory;
use crate::schema::orders::{NewOrderRequest, Order as OrderSchema};
use crate::session::{Connector, Login, OrderHandle, Session};

pub mod account;
pub mod authorization;
mod client;
pub mod order;

pub use self::authorization::Authorization;
pub use self::order::Order;

use self::client::Client;

/// An ACME Service Provider
///
/// Providers are identified by a directory URL, and keep the directory
/// fetched from it.
#[derive(Debug, Clone)]
pub struct Provider {
    url: Url,
    directory: Directory,
    client: Client,
}

impl Provider {
    /// The directory URL of this provider.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The configuration directory for this ACME service provider
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    #[inline]
    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Get a builder for a new provider.
    ///
    /// See [`ProviderBuilder`] for more information.
    pub fn build() -> ProviderBuilder {
        ProviderBuilder::new()
    }

    /// Create an order for a certificate covering `domain`.
    #[tracing::instrument(level = "debug", skip(self, login))]
    pub async fn order(&self, login: &Login, domain: &str) -> Result<Order, AcmeError> {
        let request = Request::post(
            NewOrderRequest::for_domain(domain),
            self.directory.new_order.clone(),
            login.clone(),
        );
        let response: Response<OrderSchema> = self.client.execute(&request).await?;
        let url = response
            .location()
            .ok_or(AcmeError::MissingData("order location"))?;

        tracing::info!(order = %url, "Created order");
        Ok(Order::new(
            self.client.clone(),
            login.clone(),
            url,
            response.into_inner(),
        ))
    }
}

#[async_trait]
impl Session for Provider {
    async fn find_account(&self, key: &Arc<AccountKey>) -> Result<Option<Login>, AcmeError> {
        self.lookup_account(key).await
    }

    async fn terms_of_service(&self) -> Result<Option<Url>, AcmeError> {
        Ok(self.directory.terms_of_service().cloned())
    }

    async fn create_account(
        &self,
        key: &Arc<AccountKey>,
        contact: &[Url],
        terms_agreed: bool,
    ) -> Result<Login, AcmeError> {
        self.register_account(key, contact, terms_agreed).await
    }

    async fn new_order(
        &self,
        login: &Login,
        domain: &str,
    ) -> Result<Box<dyn OrderHandle>, AcmeError> {
        Ok(Box::new(self.order(login, domain).await?))
    }
}

/// Error occured when building a provider,
/// or building the HTTP client used to power the provider.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// An error occured while building the underlying HTTP client.
    #[error("Building HTTPS client: {0}")]
    Client(#[source] reqwest::Error),

    /// No directory URL was specified, and the directory was not specified.
    #[error("Missing provider URL")]
    Url,

    /// An error occured while fetching the provider directory.
    #[error("Fetching provider directory: {0}")]
    Directory(#[source] AcmeError),
}

impl From<BuilderError> for AcmeError {
    fn from(value: BuilderError) -> Self {
        match value {
            BuilderError::Client(error) => AcmeError::HttpRequest(error),
            BuilderError::Url => AcmeError::MissingData("directory URL"),
            BuilderError::Directory(error) => error,
        }
    }
}

/// Build a provider from a directory or the URL of a directory.
#[derive(Debug)]
pub struct ProviderBuilder {
    client: crate::protocol::client::ClientBuilder,
    url: Option<Url>,
    directory: Option<Directory>,
}

impl ProviderBuilder {
    fn new() -> Self {
        ProviderBuilder {
            client: crate::protocol::Client::builder(),
            url: None,
            directory: None,
        }
    }

    /// Explicitly add an additional root certificate to the underlying HTTP client.
    pub fn add_root_certificate(mut self, cert: reqwest::Certificate) -> Self {
        self.client = self.client.add_root_certificate(cert);
        self
    }

    /// Set a timeout for requests to complete.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.client = self.client.timeout(timeout);
        self
    }

    /// Set a timeout for requests to connect.
    pub fn connect_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.client = self.client.connect_timeout(timeout);
        self
    }

    /// Set the directory URL, which will be used to fetch the directory if it isn't provided.
    pub fn directory_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Set the full directory structure. This will be used instead of fetching the directory from
    /// the provided URL.
    pub fn directory(mut self, directory: Directory) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Build the provider.
    pub async fn build(self) -> ::std::result::Result<Provider, BuilderError> {
        let mut client = self.client.build().map_err(BuilderError::Client)?;

        let url = self.url.ok_or(BuilderError::Url)?;

        let directory = if let Some(directory) = self.directory {
            directory
        } else {
            client
                .get(url.clone())
                .await
                .map_err(BuilderError::Directory)?
                .into_inner()
        };

        client.set_new_nonce_url(directory.new_nonce.clone());
        tracing::debug!(provider = %url, "Fetched ACME directory");

        Ok(Provider {
            url,
            directory,
            client: Client::new(client),
        })
    }
}

/// Opens a [`Provider`] for each renewal cycle.
///
/// A fresh provider per cycle means a fresh directory and nonce, so a
/// long-lived process picks up directory changes (new terms of service).
#[derive(Debug, Clone, Default)]
pub struct ProviderConnector {
    root_certificates: Vec<reqwest::Certificate>,
    timeout: Option<std::time::Duration>,
    connect_timeout: Option<std::time::Duration>,
}

impl ProviderConnector {
    /// A connector using the system's trust roots and no request timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust an additional root certificate, e.g. that of a test CA.
    pub fn add_root_certificate(mut self, cert: reqwest::Certificate) -> Self {
        self.root_certificates.push(cert);
        self
    }

    /// Set a timeout for each request.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a timeout for connecting.
    pub fn connect_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for ProviderConnector {
    async fn connect(&self, directory: &Url) -> Result<Arc<dyn Session>, AcmeError> {
        let mut builder = Provider::build().directory_url(directory.clone());
        for cert in &self.root_certificates {
            builder = builder.add_root_certificate(cert.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Arc::new(builder.build().await?))
    }
}

/// Included ACME provider information.
pub mod provider {
    /// The ACME directory URL for Let's Encrypt.
    pub const LETSENCRYPT: &str = "https://acme-v02.api.letsencrypt.org/directory";

    /// The ACME directory URL for the Let's Encrypt staging environment.
    pub const LETSENCRYPT_STAGING: &str =
        "https://acme-staging-v02.api.letsencrypt.org/directory";
}
