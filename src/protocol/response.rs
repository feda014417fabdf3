//! HTTP responses from an ACME service
//!
//! Besides the decoded payload, ACME responses carry protocol state in their
//! headers: the next nonce, the `Location` of a newly created resource,
//! `Retry-After` while the server is busy, and `Link` relations such as the
//! terms of service.

use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::de::DeserializeOwned;

use super::jose::Nonce;
use super::AcmeError;
use super::Url;

/// Helper trait for any type which can be decoded from a response body.
///
/// Blanket-implemented for [`serde::de::DeserializeOwned`]; types with a
/// non-JSON body (certificate chains) implement it directly.
pub trait Decode: Sized {
    /// Decode an ACME response from a byte slice.
    fn decode(data: &[u8]) -> Result<Self, AcmeError>;
}

impl<T> Decode for T
where
    T: DeserializeOwned,
{
    fn decode(data: &[u8]) -> Result<Self, AcmeError> {
        serde_json::from_slice(data).map_err(AcmeError::de)
    }
}

/// A HTTP response from an ACME service
#[derive(Debug, Clone)]
pub struct Response<T> {
    url: Url,
    status: http::StatusCode,
    headers: http::HeaderMap,
    payload: T,
}

impl<T> Response<T>
where
    T: Decode,
{
    pub(crate) async fn from_decoded_response(
        response: reqwest::Response,
    ) -> Result<Self, AcmeError> {
        let url = response.url().clone().into();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        let payload: T = T::decode(&body)?;

        Ok(Response {
            url,
            status,
            headers,
            payload,
        })
    }
}

impl<T> Response<T> {
    /// Response [`http::StatusCode`]
    pub fn status(&self) -> http::StatusCode {
        self.status
    }

    /// Destination URL from the original request.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The headers returned with this response
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The instant after which the server asked to be polled again.
    pub fn retry_after(&self) -> Option<DateTime<Utc>> {
        retry_after(&self.headers, Utc::now())
    }

    /// Get the [`Nonce`] from this response.
    pub fn nonce(&self) -> Option<Nonce> {
        super::client::extract_nonce(&self.headers).ok()
    }

    /// The URL from the `Location` HTTP header.
    pub fn location(&self) -> Option<Url> {
        self.headers
            .get(http::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| self.url.join(value).ok())
    }

    /// All `Link` header targets with the given relation.
    pub fn links(&self, relation: &str) -> Vec<Url> {
        links(&self.headers, relation)
            .filter_map(|target| self.url.join(target).ok())
            .collect()
    }

    /// The decoded payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consume the response, returning the decoded payload.
    pub fn into_inner(self) -> T {
        self.payload
    }
}

/// Longest delay honored from a `Retry-After` header; larger values are capped.
const MAX_RETRY_AFTER_SECS: i64 = 7 * 24 * 60 * 60;

/// Parse `Retry-After` either as delta-seconds or as an HTTP date.
pub(crate) fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = headers
        .get(http::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim();

    if let Ok(seconds) = value.parse::<i64>() {
        let seconds = seconds.clamp(0, MAX_RETRY_AFTER_SECS);
        return now.checked_add_signed(chrono::Duration::seconds(seconds));
    }

    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn links<'h>(headers: &'h HeaderMap, relation: &'h str) -> impl Iterator<Item = &'h str> + 'h {
    headers
        .get_all(http::header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(move |link| {
            let mut parts = link.split(';').map(str::trim);
            let target = parts.next()?.strip_prefix('<')?.strip_suffix('>')?;
            parts
                .filter_map(|param| param.split_once('='))
                .any(|(key, value)| {
                    key.trim() == "rel" && value.trim().trim_matches('"') == relation
                })
                .then_some(target)
        })
}
