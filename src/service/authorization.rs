//! # Authorizations and their HTTP-01 challenge

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::protocol::{AcmeError, Request, Response, Url};
use crate::schema::authorizations::{Authorization as AuthorizationSchema, AuthorizationStatus};
use crate::schema::challenges::ChallengeReadiness;
use crate::session::{AuthorizationHandle, Http01Challenge, Login, Resource, Status};

use super::client::Client;

/// An authorization of one identifier, tied to the account which owns the
/// order.
#[derive(Debug)]
pub struct Authorization {
    client: Client,
    login: Login,
    url: Url,
    data: AuthorizationSchema,
}

impl Authorization {
    pub(crate) fn new(client: Client, login: Login, url: Url, data: AuthorizationSchema) -> Self {
        Authorization {
            client,
            login,
            url,
            data,
        }
    }

    /// The URL of this authorization.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The authorization data as last fetched.
    pub fn data(&self) -> &AuthorizationSchema {
        &self.data
    }
}

impl From<AuthorizationStatus> for Status {
    fn from(value: AuthorizationStatus) -> Self {
        match value {
            AuthorizationStatus::Pending => Status::Pending,
            AuthorizationStatus::Valid => Status::Valid,
            AuthorizationStatus::Invalid => Status::Invalid,
            AuthorizationStatus::Deactivated => Status::Deactivated,
            AuthorizationStatus::Expired => Status::Expired,
            AuthorizationStatus::Revoked => Status::Revoked,
        }
    }
}

#[async_trait]
impl Resource for Authorization {
    async fn update(&mut self) -> Result<Option<DateTime<Utc>>, AcmeError> {
        let request = Request::get(self.url.clone(), self.login.clone());
        let response: Response<AuthorizationSchema> = self.client.execute(&request).await?;

        let retry_after = response.retry_after();
        self.data = response.into_inner();
        tracing::trace!(status = ?self.data.status, "Refreshed authorization");

        Ok(retry_after.filter(|_| !self.status().is_terminal()))
    }

    fn status(&self) -> Status {
        self.data.status.into()
    }
}

#[async_trait]
impl AuthorizationHandle for Authorization {
    fn domain(&self) -> &str {
        self.data.identifier.value()
    }

    fn http01(&self) -> Option<Http01Challenge> {
        let challenge = self.data.http01()?;
        Some(Http01Challenge {
            token: challenge.token.clone(),
            key_authorization: self.login.key().key_authorization(&challenge.token),
            url: challenge.url.clone(),
        })
    }

    async fn trigger(&self, challenge: &Http01Challenge) -> Result<(), AcmeError> {
        let request = Request::post(ChallengeReadiness {}, challenge.url.clone(), self.login.clone());
        let _: Response<serde_json::Value> = self.client.execute(&request).await?;
        tracing::debug!(domain = self.domain(), "Asked provider to validate challenge");
        Ok(())
    }
}
