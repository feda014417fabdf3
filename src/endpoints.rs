//! HTTP responses for the endpoints a server exposes alongside renewal
//!
//! These adapters know nothing about a particular web framework. Route
//! `GET /.well-known/acme-challenge/{token}` to [`challenge_response`], and
//! map the operator endpoints onto [`manual_order`] and [`accept_terms`].
//! Error responses never carry internal error details; those are logged.

use std::fmt;

use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};

use crate::account::{AccountManager, TermsError};
use crate::challenge::ChallengeCoordinator;
use crate::orchestrator::RenewalOutcome;

/// Path prefix the provider requests HTTP-01 tokens under.
pub const CHALLENGE_PATH_PREFIX: &str = "/.well-known/acme-challenge/";

fn text(status: StatusCode, body: impl Into<String>) -> Response<String> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

/// The token in a challenge request path, if `path` is one.
pub fn challenge_token(path: &str) -> Option<&str> {
    let token = path.strip_prefix(CHALLENGE_PATH_PREFIX)?;
    if token.is_empty() || token.contains('/') {
        return None;
    }
    Some(token)
}

/// Answer a challenge request for `token`.
///
/// Always `200 OK`, with the key authorization for a registered token and an
/// empty body otherwise. The request is reported to the coordinator first.
pub fn challenge_response(coordinator: &ChallengeCoordinator, token: &str) -> Response<String> {
    let content = coordinator.respond(token);
    if content.is_empty() {
        tracing::debug!(%token, "Challenge requested for an unknown token");
    }
    text(StatusCode::OK, content)
}

/// Report the result of a manually triggered cycle.
///
/// `200 OK` when a valid certificate is in place, `500` otherwise.
pub fn manual_order<E>(result: &Result<RenewalOutcome, E>) -> Response<String>
where
    E: fmt::Display,
{
    match result {
        Ok(RenewalOutcome::AlreadyValid(_)) | Ok(RenewalOutcome::Success(_)) => {
            text(StatusCode::OK, "")
        }
        Ok(RenewalOutcome::Error(retry_at)) => {
            tracing::debug!(%retry_at, "Manual renewal failed");
            text(StatusCode::INTERNAL_SERVER_ERROR, "")
        }
        Err(error) => {
            tracing::error!(%error, "Manual renewal could not run");
            text(StatusCode::INTERNAL_SERVER_ERROR, "")
        }
    }
}

/// Accept the terms of service at `link` on the operator's behalf.
///
/// `400` for a malformed link, `500` if the acceptance could not be stored.
pub async fn accept_terms(manager: &AccountManager, link: &str) -> Response<String> {
    match manager.accept_terms(link).await {
        Ok(()) => text(StatusCode::OK, ""),
        Err(TermsError::InvalidLink(error)) => {
            tracing::debug!(%error, "Rejected malformed terms of service link");
            text(StatusCode::BAD_REQUEST, "")
        }
        Err(error) => {
            tracing::error!(%error, "Storing terms of service acceptance failed");
            text(StatusCode::INTERNAL_SERVER_ERROR, "")
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::account::TermsStore;
    use crate::config::ConfigurationError;

    #[test]
    fn token_from_path() {
        assert_eq!(
            challenge_token("/.well-known/acme-challenge/abc123"),
            Some("abc123")
        );
        assert_eq!(challenge_token("/.well-known/acme-challenge/"), None);
        assert_eq!(challenge_token("/.well-known/acme-challenge"), None);
        assert_eq!(challenge_token("/.well-known/acme-challenge/a/b"), None);
        assert_eq!(challenge_token("/other/path"), None);
    }

    #[test]
    fn unknown_token_is_empty() {
        let coordinator = ChallengeCoordinator::new();
        let response = challenge_response(&coordinator, "unknown");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.body(), "");
    }

    #[test]
    fn manual_order_statuses() {
        let now = Utc::now();
        let ok: Result<_, ConfigurationError> = Ok(RenewalOutcome::Success(now));
        assert_eq!(manual_order(&ok).status(), StatusCode::OK);

        let ok: Result<_, ConfigurationError> = Ok(RenewalOutcome::AlreadyValid(now));
        assert_eq!(manual_order(&ok).status(), StatusCode::OK);

        let failed: Result<_, ConfigurationError> = Ok(RenewalOutcome::Error(now));
        assert_eq!(
            manual_order(&failed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let misconfigured: Result<RenewalOutcome, _> =
            Err(ConfigurationError::UnknownProvider("acme://example.org".into()));
        let response = manual_order(&misconfigured);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), "");
    }

    #[tokio::test]
    async fn terms_acceptance_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let manager = AccountManager::new(
            dir.path().join("account.pem"),
            Vec::new(),
            TermsStore::new(dir.path().join("terms.json")),
        );

        let response = accept_terms(&manager, "https://example.com/terms").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = accept_terms(&manager, "not a link").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let blocked = AccountManager::new(
            dir.path().join("account.pem"),
            Vec::new(),
            // A directory where the record file should be.
            TermsStore::new(dir.path()),
        );
        let response = accept_terms(&blocked, "https://example.com/terms").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
