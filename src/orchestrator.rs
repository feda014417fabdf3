//! # One create-or-renew cycle
//!
//! [`Orchestrator::create_or_renew`] checks the certificate in the keystore,
//! and orders a new one when it is missing or close to expiry. Whatever goes
//! wrong inside a cycle is logged and turned into
//! [`RenewalOutcome::Error`], carrying the instant to retry at. Only a
//! certificate authority URL which can not be parsed is returned as an error,
//! since no amount of retrying will fix it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tokio::sync::Mutex;

use crate::account::AccountManager;
use crate::cert::{self, CertificateChain, CertificateSigningRequest};
use crate::challenge::ChallengeCoordinator;
use crate::config::{resolve_directory_url, ConfigurationError, Settings};
use crate::errors::RenewError;
use crate::key::DomainKey;
use crate::keystore::{self, KeystoreBuilder};
use crate::poll::poll_until_terminal;
use crate::protocol::{AcmeError, Url};
use crate::session::{AuthorizationHandle, Connector, Login, OrderHandle, Resource, Session, Status};
use crate::storage;

/// The result of a cycle, and when the next one should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// The current certificate is good until this renewal threshold.
    AlreadyValid(DateTime<Utc>),
    /// A new certificate was written; renew it at this instant.
    Success(DateTime<Utc>),
    /// The cycle failed; retry at this instant.
    Error(DateTime<Utc>),
}

impl RenewalOutcome {
    /// When the next cycle should run.
    pub fn next_check(&self) -> DateTime<Utc> {
        match self {
            RenewalOutcome::AlreadyValid(at)
            | RenewalOutcome::Success(at)
            | RenewalOutcome::Error(at) => *at,
        }
    }

    /// Whether the cycle failed.
    pub fn is_error(&self) -> bool {
        matches!(self, RenewalOutcome::Error(_))
    }
}

/// Error type returned by a [`ReloadSignal`].
pub type ReloadError = Box<dyn std::error::Error + Send + Sync>;

/// Tells the TLS server that the keystore file changed.
#[async_trait]
pub trait ReloadSignal: Send + Sync {
    /// Load the new keystore.
    async fn reload(&self) -> Result<(), ReloadError>;
}

/// A [`ReloadSignal`] for servers which read the keystore on their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReload;

#[async_trait]
impl ReloadSignal for NoReload {
    async fn reload(&self) -> Result<(), ReloadError> {
        Ok(())
    }
}

/// Runs create-or-renew cycles for the configured domain.
pub struct Orchestrator {
    settings: Settings,
    connector: Arc<dyn Connector>,
    accounts: AccountManager,
    challenges: ChallengeCoordinator,
    reload: Arc<dyn ReloadSignal>,
    cycle: Mutex<()>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("domain", &self.settings.domain)
            .field("directory", &self.settings.directory_url)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator from validated `settings`.
    ///
    /// `challenges` must be the coordinator the HTTP server answers
    /// challenge requests from.
    pub fn new(
        settings: Settings,
        connector: Arc<dyn Connector>,
        challenges: ChallengeCoordinator,
        reload: Arc<dyn ReloadSignal>,
    ) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        let accounts = AccountManager::from_settings(&settings)?;
        Ok(Orchestrator {
            settings,
            connector,
            accounts,
            challenges,
            reload,
            cycle: Mutex::new(()),
        })
    }

    /// The settings this orchestrator runs with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The account manager, for the terms of service workflow.
    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    /// The challenge coordinator shared with the HTTP server.
    pub fn challenges(&self) -> &ChallengeCoordinator {
        &self.challenges
    }

    /// Run one cycle: make sure the keystore holds a certificate which is
    /// not due for renewal.
    ///
    /// Cycles never overlap; a call made while another cycle runs waits for
    /// it to finish first.
    #[tracing::instrument(skip(self), fields(domain = %self.settings.domain))]
    pub async fn create_or_renew(&self) -> Result<RenewalOutcome, ConfigurationError> {
        let directory = resolve_directory_url(&self.settings.directory_url)?;

        let _cycle = self.cycle.lock().await;
        match self.run(&directory).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                let retry_at = Utc::now() + self.settings.error_retry_delay();
                tracing::error!(%error, %directory, %retry_at, "Certificate renewal failed");
                Ok(RenewalOutcome::Error(retry_at))
            }
        }
    }

    async fn run(&self, directory: &Url) -> Result<RenewalOutcome, RenewError> {
        let session = self.connector.connect(directory).await?;
        let login = self.accounts.get_or_create_login(&*session).await?;

        let margin = self.settings.safety_margin();
        let current = storage::read_optional(&self.settings.keystore.path).await?;
        let alias = &self.settings.keystore.alias;

        let mut key = None;
        if let Some(data) = current.as_deref() {
            match keystore::read_certificate(data, alias) {
                Ok(Some(certificate)) => {
                    if let Some(threshold) = cert::not_after(&certificate).map(|at| at - margin) {
                        if threshold > Utc::now() {
                            tracing::info!(renew_at = %threshold, "Certificate is still valid");
                            return Ok(RenewalOutcome::AlreadyValid(threshold));
                        }
                        tracing::info!(renew_at = %threshold, "Certificate is due for renewal");
                    }
                }
                Ok(None) => tracing::debug!(%alias, "Keystore has no certificate"),
                Err(error) => tracing::warn!(%error, "Existing keystore is unreadable, replacing it"),
            }

            key = keystore::extract_key_pair(data, alias).ok().flatten();
        }

        let key = match key {
            Some(key) => {
                tracing::debug!("Reusing the domain key from the keystore");
                key
            }
            None => {
                tracing::debug!("Generating a new domain key");
                DomainKey::generate()
            }
        };

        let chain = tokio::time::timeout(
            self.settings.order_timeout(),
            self.order(&*session, &login, &key),
        )
        .await
        .map_err(|_| RenewError::Timeout("order"))??;

        if let Err(error) = self.reload.reload().await {
            tracing::error!(%error, "Reloading the TLS configuration failed");
        }

        let expires = chain
            .leaf()
            .and_then(cert::not_after)
            .ok_or(AcmeError::MissingData("certificate expiry"))?;
        let next = expires - margin;
        tracing::info!(%expires, renew_at = %next, "Certificate issued");
        Ok(RenewalOutcome::Success(next))
    }

    /// Order a certificate for `key`, and store it in the keystore.
    async fn order(
        &self,
        session: &dyn Session,
        login: &Login,
        key: &DomainKey,
    ) -> Result<CertificateChain, RenewError> {
        let domain = &self.settings.domain;
        let mut order = session.new_order(login, domain).await?;

        let mut challenges = Vec::new();
        for authorization in order.authorizations().await? {
            if authorization.status() == Status::Valid {
                tracing::debug!(domain = authorization.domain(), "Authorization is already valid");
                continue;
            }

            let challenge = authorization
                .http01()
                .ok_or_else(|| AcmeError::MissingChallenge(authorization.domain().to_owned()))?;
            let waiting = self.challenges.watch(challenge, authorization);
            let timeout = self.settings.challenge_timeout();
            challenges.push(async move {
                match tokio::time::timeout(timeout, waiting).await {
                    Ok(result) => result,
                    Err(_) => Err(RenewError::Timeout("challenge")),
                }
            });
        }
        try_join_all(challenges).await?;

        let csr = CertificateSigningRequest::new(domain.as_str()).sign(key)?;
        order.finalize(&csr).await?;

        tokio::time::timeout(
            self.settings.poll_timeout(),
            poll_until_terminal(&mut *order, "order"),
        )
        .await
        .map_err(|_| RenewError::Timeout("order polling"))??;

        let chain = order.certificate().await?;
        let keystore = KeystoreBuilder::new(self.settings.keystore.alias.as_str()).build(&chain, key)?;
        storage::write_atomic(&self.settings.keystore.path, &keystore).await?;
        tracing::debug!(path = %self.settings.keystore.path.display(), "Wrote keystore");

        Ok(chain)
    }
}
