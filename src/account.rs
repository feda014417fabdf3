//! # Account binding
//!
//! The renewal workflow needs a [`Login`]: the local account key, bound to an
//! account at the certificate authority. [`AccountManager`] finds the account
//! for the key, or registers one. Registration may require agreeing to the
//! provider's terms of service, which is an operator's decision: the
//! [`TermsStore`] records every terms document seen, and whether an operator
//! accepted it through [`AccountManager::accept_terms`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{ConfigurationError, Settings};
use crate::errors::RenewError;
use crate::key::{AccountKey, KeyError};
use crate::protocol::Url;
use crate::session::{Login, Session};
use crate::storage;

/// Failures recording terms of service acceptance.
#[derive(Debug, Error)]
pub enum TermsError {
    /// The link to accept is not a URL.
    #[error("invalid terms of service link: {0}")]
    InvalidLink(#[from] url::ParseError),

    /// The terms record could not be read or written.
    #[error("terms record: {0}")]
    Io(#[from] std::io::Error),

    /// The terms record is not valid JSON.
    #[error("terms record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A terms of service document, and whether it was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsRecord {
    /// Link to the terms document.
    pub link: String,
    /// Whether an operator accepted these terms.
    pub accepted: bool,
}

/// A JSON list of [`TermsRecord`]s, unique by link.
#[derive(Debug)]
pub struct TermsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TermsStore {
    /// A store persisted at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TermsStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Where the record is stored.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every recorded terms document. A missing file is an empty record.
    pub async fn load(&self) -> Result<Vec<TermsRecord>, TermsError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Whether the terms at `link` were accepted.
    pub async fn is_accepted(&self, link: &Url) -> Result<bool, TermsError> {
        let records = self.load().await?;
        Ok(records
            .iter()
            .any(|record| record.accepted && record.link == link.as_str()))
    }

    /// Record the terms at `link` as not yet accepted.
    ///
    /// An existing record for the link is kept as it is.
    pub async fn record(&self, link: &Url) -> Result<(), TermsError> {
        self.update(link, |_| {}).await
    }

    /// Record the terms at `link` as accepted.
    pub async fn accept(&self, link: &Url) -> Result<(), TermsError> {
        self.update(link, |record| record.accepted = true).await
    }

    async fn update<F>(&self, link: &Url, change: F) -> Result<(), TermsError>
    where
        F: FnOnce(&mut TermsRecord),
    {
        let _guard = self.lock.lock().await;
        let mut records = self.read().await?;

        let index = match records.iter().position(|r| r.link == link.as_str()) {
            Some(index) => index,
            None => {
                records.push(TermsRecord {
                    link: link.as_str().to_owned(),
                    accepted: false,
                });
                records.len() - 1
            }
        };
        change(&mut records[index]);

        let data = serde_json::to_vec_pretty(&records)?;
        storage::write_atomic(&self.path, &data).await?;
        Ok(())
    }

    async fn read(&self) -> Result<Vec<TermsRecord>, TermsError> {
        match storage::read_optional(&self.path).await? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(Vec::new()),
        }
    }
}

/// Finds or creates the ACME account for the local account key.
#[derive(Debug)]
pub struct AccountManager {
    key_path: PathBuf,
    contact: Vec<Url>,
    terms: TermsStore,
}

impl AccountManager {
    /// An account manager using the key at `key_path`, registering new
    /// accounts with `contact`.
    pub fn new(key_path: impl Into<PathBuf>, contact: Vec<Url>, terms: TermsStore) -> Self {
        AccountManager {
            key_path: key_path.into(),
            contact,
            terms,
        }
    }

    /// An account manager configured from [`Settings`].
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigurationError> {
        Ok(AccountManager::new(
            settings.account_key_path.clone(),
            settings.contact_urls()?,
            TermsStore::new(settings.terms_path.clone()),
        ))
    }

    /// The terms of service record.
    pub fn terms(&self) -> &TermsStore {
        &self.terms
    }

    /// Load the account key, generating and storing one if there is none.
    pub async fn account_key(&self) -> Result<Arc<AccountKey>, KeyError> {
        AccountKey::load_or_generate(&self.key_path)
            .await
            .map(Arc::new)
    }

    /// Log in to the account for the local key, creating it if needed.
    ///
    /// A new account is only created once the provider's current terms of
    /// service have been accepted. Until then the terms are recorded as
    /// pending and this fails with [`RenewError::TermsNotAccepted`].
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn get_or_create_login(&self, session: &dyn Session) -> Result<Login, RenewError> {
        let key = self.account_key().await?;

        if let Some(login) = session.find_account(&key).await? {
            tracing::debug!(account = %login.account(), "Found existing account");
            return Ok(login);
        }

        let terms_agreed = match session.terms_of_service().await? {
            None => false,
            Some(link) => {
                if !self.terms.is_accepted(&link).await? {
                    self.terms.record(&link).await?;
                    tracing::warn!(%link, "Terms of service must be accepted before an account is created");
                    return Err(RenewError::TermsNotAccepted { link });
                }
                true
            }
        };

        let login = session
            .create_account(&key, &self.contact, terms_agreed)
            .await?;
        tracing::info!(account = %login.account(), "Registered account");
        Ok(login)
    }

    /// Accept the terms of service at `link`.
    pub async fn accept_terms(&self, link: &str) -> Result<(), TermsError> {
        let link: Url = link.trim().parse()?;
        self.terms.accept(&link).await?;
        tracing::info!(%link, "Terms of service accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::protocol::AcmeError;
    use crate::session::OrderHandle;

    const TERMS: &str = "https://example.com/acme/terms/2017-5-30";

    #[derive(Default)]
    struct Registry {
        existing: bool,
        terms: Option<&'static str>,
        created: AtomicUsize,
        agreed: parking_lot::Mutex<Option<bool>>,
    }

    #[async_trait]
    impl Session for Registry {
        async fn find_account(&self, key: &Arc<AccountKey>) -> Result<Option<Login>, AcmeError> {
            Ok(self.existing.then(|| {
                Login::new(
                    key.clone(),
                    "https://example.com/acme/acct/existing".parse().unwrap(),
                )
            }))
        }

        async fn terms_of_service(&self) -> Result<Option<Url>, AcmeError> {
            Ok(self.terms.map(|link| link.parse().unwrap()))
        }

        async fn create_account(
            &self,
            key: &Arc<AccountKey>,
            _contact: &[Url],
            terms_agreed: bool,
        ) -> Result<Login, AcmeError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            *self.agreed.lock() = Some(terms_agreed);
            Ok(Login::new(
                key.clone(),
                "https://example.com/acme/acct/new".parse().unwrap(),
            ))
        }

        async fn new_order(
            &self,
            _login: &Login,
            _domain: &str,
        ) -> Result<Box<dyn OrderHandle>, AcmeError> {
            unimplemented!("accounts never order")
        }
    }

    fn manager(dir: &tempfile::TempDir) -> AccountManager {
        AccountManager::new(
            dir.path().join("account.pem"),
            vec!["mailto:admin@example.com".parse().unwrap()],
            TermsStore::new(dir.path().join("terms.json")),
        )
    }

    #[tokio::test]
    async fn existing_account() {
        let dir = tempfile::tempdir().unwrap();
        let session = Registry {
            existing: true,
            terms: Some(TERMS),
            ..Default::default()
        };

        let login = manager(&dir).get_or_create_login(&session).await.unwrap();
        assert_eq!(login.account().path(), "/acme/acct/existing");
        assert_eq!(session.created.load(Ordering::SeqCst), 0);
        assert!(dir.path().join("account.pem").exists());
    }

    #[tokio::test]
    async fn unaccepted_terms_block_registration() {
        let dir = tempfile::tempdir().unwrap();
        let session = Registry {
            terms: Some(TERMS),
            ..Default::default()
        };
        let manager = manager(&dir);

        let error = manager.get_or_create_login(&session).await.unwrap_err();
        assert!(
            matches!(&error, RenewError::TermsNotAccepted { link } if link.as_str() == TERMS),
            "{error}"
        );
        assert_eq!(session.created.load(Ordering::SeqCst), 0);
        assert_eq!(
            manager.terms().load().await.unwrap(),
            vec![TermsRecord {
                link: TERMS.into(),
                accepted: false
            }]
        );

        manager.accept_terms(TERMS).await.unwrap();
        let login = manager.get_or_create_login(&session).await.unwrap();
        assert_eq!(login.account().path(), "/acme/acct/new");
        assert_eq!(*session.agreed.lock(), Some(true));
    }

    #[tokio::test]
    async fn no_terms_registers_without_agreement() {
        let dir = tempfile::tempdir().unwrap();
        let session = Registry::default();

        manager(&dir).get_or_create_login(&session).await.unwrap();
        assert_eq!(session.created.load(Ordering::SeqCst), 1);
        assert_eq!(*session.agreed.lock(), Some(false));
    }

    #[tokio::test]
    async fn same_key_across_logins() {
        let dir = tempfile::tempdir().unwrap();
        let session = Registry {
            existing: true,
            ..Default::default()
        };
        let manager = manager(&dir);

        let first = manager.get_or_create_login(&session).await.unwrap();
        let second = manager.get_or_create_login(&session).await.unwrap();
        assert_eq!(first.key(), second.key());
    }

    #[tokio::test]
    async fn terms_store_keeps_links_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = TermsStore::new(dir.path().join("terms.json"));
        let link: Url = TERMS.parse().unwrap();
        let other: Url = "https://example.com/acme/terms/2023-1-1".parse().unwrap();

        assert!(store.load().await.unwrap().is_empty());
        assert!(!store.is_accepted(&link).await.unwrap());

        store.record(&link).await.unwrap();
        store.accept(&link).await.unwrap();
        store.record(&link).await.unwrap();
        store.record(&other).await.unwrap();

        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(store.is_accepted(&link).await.unwrap());
        assert!(!store.is_accepted(&other).await.unwrap());

        let reopened = TermsStore::new(store.path());
        assert_eq!(reopened.load().await.unwrap(), records);
    }

    #[tokio::test]
    async fn malformed_link_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        assert!(matches!(
            manager.accept_terms("not a link").await,
            Err(TermsError::InvalidLink(_))
        ));
        assert!(!dir.path().join("terms.json").exists());
    }

    #[tokio::test]
    async fn corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.json");
        std::fs::write(&path, "[{").unwrap();

        let store = TermsStore::new(&path);
        assert!(matches!(store.load().await, Err(TermsError::Corrupt(_))));
    }
}
