//! # Certificate Orders
//!
//! Each order is for a single certificate chain, covering the one domain
//! this crate manages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::{HeaderValue, ACCEPT};

use crate::cert::{CertificateChain, SignedCertificateRequest};
use crate::protocol::{AcmeError, Request, Response, Url};
use crate::schema::authorizations::Authorization as AuthorizationSchema;
use crate::schema::orders::{FinalizeOrder, Order as OrderSchema, OrderStatus};
use crate::session::{AuthorizationHandle, Login, OrderHandle, Resource, Status};

use super::authorization::Authorization;
use super::client::Client;

const CONTENT_PEM_CHAIN: &str = "application/pem-certificate-chain";

/// Order for a certificate.
#[derive(Debug)]
pub struct Order {
    client: Client,
    login: Login,
    url: Url,
    data: OrderSchema,
}

impl Order {
    pub(crate) fn new(client: Client, login: Login, url: Url, data: OrderSchema) -> Self {
        Order {
            client,
            login,
            url,
            data,
        }
    }

    /// The get URL for this order, for fetching and uniquely identifying
    /// this order.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The order data as last fetched.
    pub fn data(&self) -> &OrderSchema {
        &self.data
    }
}

impl From<OrderStatus> for Status {
    fn from(value: OrderStatus) -> Self {
        match value {
            OrderStatus::Pending => Status::Pending,
            OrderStatus::Ready => Status::Ready,
            OrderStatus::Processing => Status::Processing,
            OrderStatus::Valid => Status::Valid,
            OrderStatus::Invalid => Status::Invalid,
        }
    }
}

#[async_trait]
impl Resource for Order {
    async fn update(&mut self) -> Result<Option<DateTime<Utc>>, AcmeError> {
        let request = Request::get(self.url.clone(), self.login.clone());
        let response: Response<OrderSchema> = self.client.execute(&request).await?;

        let retry_after = response.retry_after();
        self.data = response.into_inner();
        if let Some(error) = self.data.error() {
            tracing::warn!(url = %self.url, "Order reports an error: {error}");
        }
        tracing::trace!(status = ?self.data.status(), "Refreshed order");

        Ok(retry_after.filter(|_| !self.status().is_terminal()))
    }

    fn status(&self) -> Status {
        self.data.status().into()
    }
}

#[async_trait]
impl OrderHandle for Order {
    async fn authorizations(&self) -> Result<Vec<Box<dyn AuthorizationHandle>>, AcmeError> {
        let mut authorizations: Vec<Box<dyn AuthorizationHandle>> = Vec::new();
        for url in self.data.authorizations() {
            let request = Request::get(url.clone(), self.login.clone());
            let response: Response<AuthorizationSchema> = self.client.execute(&request).await?;

            authorizations.push(Box::new(Authorization::new(
                self.client.clone(),
                self.login.clone(),
                url.clone(),
                response.into_inner(),
            )));
        }
        Ok(authorizations)
    }

    async fn finalize(&mut self, csr: &SignedCertificateRequest) -> Result<(), AcmeError> {
        if self.data.status() != OrderStatus::Ready {
            // Authorizations were just validated; the order may not show it yet.
            self.update().await?;
        }
        if self.data.status() != OrderStatus::Ready {
            return Err(AcmeError::NotReady("order"));
        }

        let request = Request::post(
            FinalizeOrder::from(csr),
            self.data.finalize().clone(),
            self.login.clone(),
        );
        let response: Response<OrderSchema> = self.client.execute(&request).await?;
        self.data = response.into_inner();
        tracing::debug!(url = %self.url, status = ?self.data.status(), "Finalized order");
        Ok(())
    }

    async fn certificate(&self) -> Result<CertificateChain, AcmeError> {
        let url = self
            .data
            .certificate()
            .ok_or(AcmeError::NotReady("certificate"))?;

        let mut request = Request::get(url.clone(), self.login.clone());
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static(CONTENT_PEM_CHAIN));

        let response: Response<CertificateChain> = self.client.execute(&request).await?;
        Ok(response.into_inner())
    }
}
