//! HTTP requests which adhere to RFC 8555
//!
//! Apart from the directory and `newNonce` endpoints, every ACME request is a
//! `POST` with a JWS body. Requests with GET semantics ("POST-as-GET") carry
//! the empty string as payload. A [`Request`] holds everything except the
//! nonce, so that the [`super::Client`] can re-sign it with a fresh nonce
//! when the server rejects the previous one.

use std::sync::Arc;

use http::HeaderMap;
use serde::Serialize;

use super::jose::{KeyIdentity, Nonce, ProtectedHeader, SignedToken};
use super::AcmeError;
use super::Url;
use crate::key::AccountKey;
use crate::session::Login;

/// Content type for JWS request bodies.
pub(crate) const CONTENT_JOSE: &str = "application/jose+json";

/// The HTTP request method in use with this ACME request.
#[derive(Debug, Clone, Copy)]
pub enum Method<T> {
    /// POST-as-GET request with an empty string payload
    Get,
    /// POST request with a JSON payload.
    Post(T),
}

/// The signing key and how it is identified to the server.
#[derive(Debug, Clone)]
pub enum Key {
    /// The public key is embedded as a JWK; used before the account URL is known.
    Jwk(Arc<AccountKey>),

    /// The request is attributed to a registered account URL.
    Kid(Arc<AccountKey>, Url),
}

impl Key {
    /// The signing key.
    pub fn key(&self) -> &Arc<AccountKey> {
        match self {
            Key::Jwk(key) => key,
            Key::Kid(key, _) => key,
        }
    }

    fn identity(&self) -> KeyIdentity<'_> {
        match self {
            Key::Jwk(_) => KeyIdentity::Jwk,
            Key::Kid(_, account) => KeyIdentity::Kid(account),
        }
    }
}

impl From<Arc<AccountKey>> for Key {
    fn from(value: Arc<AccountKey>) -> Self {
        Key::Jwk(value)
    }
}

impl From<(Arc<AccountKey>, Url)> for Key {
    fn from((key, account): (Arc<AccountKey>, Url)) -> Self {
        Key::Kid(key, account)
    }
}

impl From<Login> for Key {
    fn from(login: Login) -> Self {
        Key::Kid(login.key().clone(), login.account().clone())
    }
}

/// An unsigned ACME request.
#[derive(Debug, Clone)]
pub struct Request<T> {
    method: Method<T>,
    url: Url,
    key: Key,
    headers: HeaderMap,
}

impl<T> Request<T> {
    fn new(method: Method<T>, url: Url, key: impl Into<Key>) -> Self {
        Self {
            method,
            url,
            key: key.into(),
            headers: Default::default(),
        }
    }

    /// Create a `POST` request with a JSON payload.
    pub fn post(payload: T, url: Url, key: impl Into<Key>) -> Self {
        Self::new(Method::Post(payload), url, key)
    }

    /// The target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Mutable reference to additional headers sent with this request.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Additional headers sent with this request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl Request<()> {
    /// Create a POST-as-GET request.
    pub fn get(url: Url, key: impl Into<Key>) -> Self {
        Self::new(Method::Get, url, key)
    }
}

impl<T> Request<T>
where
    T: Serialize,
{
    /// Sign this request with the given nonce.
    pub fn sign(&self, nonce: &Nonce) -> Result<SignedToken, AcmeError> {
        let key = self.key.key();
        let header = ProtectedHeader::new(key, self.key.identity(), &self.url, nonce);

        match &self.method {
            Method::Get => SignedToken::sign::<()>(&header, None, key),
            Method::Post(payload) => SignedToken::sign(&header, Some(payload), key),
        }
    }
}
