//! Client for sending HTTP requests to an ACME server

use reqwest::header::HeaderMap;
use reqwest::Certificate;
use serde::Serialize;

use super::errors::{AcmeError, AcmeErrorCode, AcmeErrorDocument};
use super::jose::Nonce;
use super::request::CONTENT_JOSE;
use super::response::{Decode, Response};
use super::Request;
use super::Url;

const NONCE_HEADER: &str = "Replay-Nonce";

/// How many times a request is re-signed after a `badNonce` rejection.
const BAD_NONCE_RETRIES: usize = 1;

/// Builder struct for an ACME HTTP client.
#[derive(Debug)]
pub struct ClientBuilder {
    inner: reqwest::ClientBuilder,
    new_nonce: Option<Url>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub(crate) fn new() -> Self {
        let builder = reqwest::Client::builder()
            .user_agent(concat!("certkeeper/", env!("CARGO_PKG_VERSION")));

        ClientBuilder {
            inner: builder,
            new_nonce: None,
        }
    }

    /// Set the URL used to fetch a new nonce.
    ///
    /// Used to bootstrap the first request, and whenever the previous nonce
    /// was consumed by a failed request.
    pub fn with_nonce_url(mut self, url: Url) -> Self {
        self.new_nonce = Some(url);
        self
    }

    /// Trust an additional root certificate, e.g. a test CA's self-signed
    /// certificate.
    pub fn add_root_certificate(mut self, cert: Certificate) -> Self {
        self.inner = self.inner.add_root_certificate(cert);
        self
    }

    /// Set a timeout for each request on the underlying [`reqwest::Client`].
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.inner = self.inner.timeout(timeout);
        self
    }

    /// Set a connect timeout on the underlying [`reqwest::Client`].
    pub fn connect_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.inner = self.inner.connect_timeout(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client, reqwest::Error> {
        Ok(Client {
            inner: self.inner.build()?,
            nonce: None,
            new_nonce: self.new_nonce,
        })
    }
}

/// ACME HTTP Client
///
/// Sends signed [`Request`]s and decodes [`Response`]s, keeping the most
/// recent `Replay-Nonce` for the next request. The client is stateful and
/// requires `&mut self`; share it behind a lock.
#[derive(Debug, Default)]
pub struct Client {
    inner: reqwest::Client,
    nonce: Option<Nonce>,
    new_nonce: Option<Url>,
}

impl Client {
    /// Create a new client builder to configure a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Set the URL used for fetching a new nonce from the ACME provider.
    pub fn set_new_nonce_url(&mut self, url: Url) {
        self.new_nonce = Some(url);
    }

    /// Run a plain, unauthenticated HTTP `GET` (only the directory is
    /// fetched this way).
    pub async fn get<R>(&mut self, url: Url) -> Result<Response<R>, AcmeError>
    where
        R: Decode,
    {
        let response = self.inner.get(url.as_str()).send().await?;
        if !response.status().is_success() {
            return Err(process_error_response(response).await);
        }
        Response::from_decoded_response(response).await
    }

    /// Execute a signed ACME request.
    ///
    /// A `badNonce` rejection is retried with a fresh nonce; every other
    /// error response is returned as [`AcmeError`].
    pub async fn execute<P, R>(&mut self, request: &Request<P>) -> Result<Response<R>, AcmeError>
    where
        P: Serialize,
        R: Decode,
    {
        let mut attempts = 0;
        loop {
            let nonce = self.get_nonce().await?;
            let token = request.sign(&nonce)?;

            #[cfg(feature = "trace-requests")]
            tracing::trace!(url = %request.url(), "REQ: {}", serde_json::to_string_pretty(&token).unwrap_or_default());

            let response = self
                .inner
                .post(request.url().as_str())
                .headers(request.headers().clone())
                .header(http::header::CONTENT_TYPE, CONTENT_JOSE)
                .json(&token)
                .send()
                .await?;

            self.record_nonce(response.headers());
            if response.status().is_success() {
                return Response::from_decoded_response(response).await;
            }

            match process_error_response(response).await {
                AcmeError::Acme(document)
                    if matches!(document.kind(), AcmeErrorCode::BadNonce)
                        && attempts < BAD_NONCE_RETRIES =>
                {
                    tracing::trace!("Retrying request with next nonce");
                    attempts += 1;
                }
                error => return Err(error),
            }
        }
    }

    fn record_nonce(&mut self, headers: &HeaderMap) {
        match extract_nonce(headers) {
            Ok(nonce) => self.nonce = Some(nonce),
            Err(error) => tracing::debug!("Response carried no usable nonce: {error}"),
        }
    }

    async fn get_nonce(&mut self) -> Result<Nonce, AcmeError> {
        if let Some(value) = self.nonce.take() {
            return Ok(value);
        }

        let Some(url) = &self.new_nonce else {
            tracing::warn!("No nonce URL provided, unable to fetch new nonce");
            return Err(AcmeError::MissingNonce);
        };

        tracing::debug!("Requesting a new nonce");
        let response = self
            .inner
            .head(url.as_str())
            .send()
            .await
            .map_err(AcmeError::nonce)?;

        response.error_for_status_ref().map_err(AcmeError::nonce)?;
        extract_nonce(response.headers())
    }
}

async fn process_error_response(response: reqwest::Response) -> AcmeError {
    let status = response.status();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(error) => return AcmeError::HttpRequest(error),
    };

    if body.is_empty() {
        return AcmeError::HttpStatus { status, body: None };
    }

    match serde_json::from_slice::<AcmeErrorDocument>(&body) {
        Ok(document) => {
            tracing::trace!(%status, %document, "ACME error response");
            AcmeError::Acme(document)
        }
        Err(error) => {
            let text = String::from_utf8_lossy(&body).into_owned();
            tracing::debug!(%status, "Failed to parse error document {error}: {text}");
            AcmeError::HttpStatus {
                status,
                body: Some(text),
            }
        }
    }
}

pub(crate) fn extract_nonce(headers: &HeaderMap) -> Result<Nonce, AcmeError> {
    let value = headers.get(NONCE_HEADER).ok_or(AcmeError::MissingNonce)?;
    Ok(Nonce::from(
        value
            .to_str()
            .map_err(|_| AcmeError::InvalidNonce(Some(value.clone())))?
            .to_owned(),
    ))
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn extract_nonce_from_header() {
        let response = crate::fixtures::response("new-nonce.http");
        let nonce = extract_nonce(response.headers()).unwrap();
        assert_eq!(nonce.as_ref(), "oFvnlFP1wIhRlYS2jTaXbA");
    }

    #[test]
    fn missing_nonce_is_an_error() {
        let response = crate::fixtures::response("order-processing.http");
        assert!(matches!(
            extract_nonce(response.headers()),
            Err(AcmeError::MissingNonce)
        ));
    }
}
