//! # Account lookup and registration
//!
//! ACME accounts are identified by their key. With `onlyReturnExisting`, the
//! provider answers with the account URL in `Location` when the key is
//! known, and with an `accountDoesNotExist` error otherwise.

use std::sync::Arc;

use crate::key::AccountKey;
use crate::protocol::errors::AcmeErrorCode;
use crate::protocol::{AcmeError, Request, Response, Url};
use crate::schema::account::{Account, CreateAccount};
use crate::session::Login;

use super::Provider;

impl Provider {
    /// Look up the account for `key`, without creating one.
    #[tracing::instrument(level = "debug", skip_all, fields(provider = %self.url()))]
    pub async fn lookup_account(&self, key: &Arc<AccountKey>) -> Result<Option<Login>, AcmeError> {
        let request = Request::post(
            CreateAccount::lookup(),
            self.directory().new_account.clone(),
            key.clone(),
        );

        match self.client().execute::<_, Account>(&request).await {
            Ok(response) => Ok(Some(login(key, &response)?)),
            Err(error) if matches!(error.code(), Some(AcmeErrorCode::AccountDoesNotExist)) => {
                tracing::debug!("No account exists for this key");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Register a new account for `key`.
    #[tracing::instrument(level = "debug", skip_all, fields(provider = %self.url()))]
    pub async fn register_account(
        &self,
        key: &Arc<AccountKey>,
        contact: &[Url],
        terms_agreed: bool,
    ) -> Result<Login, AcmeError> {
        let payload = CreateAccount {
            contact: contact.to_vec(),
            terms_of_service_agreed: terms_agreed.then_some(true),
            only_return_existing: None,
        };
        let request = Request::post(payload, self.directory().new_account.clone(), key.clone());

        let response: Response<Account> = self.client().execute(&request).await?;
        let login = login(key, &response)?;
        tracing::info!(account = %login.account(), "Created ACME account");
        Ok(login)
    }
}

fn login(key: &Arc<AccountKey>, response: &Response<Account>) -> Result<Login, AcmeError> {
    let account = response
        .location()
        .ok_or(AcmeError::MissingData("account location"))?;
    Ok(Login::new(key.clone(), account))
}
