//! # HTTP-01 challenge coordination
//!
//! Two independent parties meet here. The renewal workflow registers a
//! challenge token and waits; the HTTP server answers
//! `GET /.well-known/acme-challenge/{token}` from the provider's validation
//! agent. The [`ChallengeCoordinator`] is shared by both (it is a cheap
//! [`Clone`] handle).
//!
//! Token content and the waiting listener live in two maps behind a single
//! lock, so a registration can never race its own completion.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::errors::RenewError;
use crate::poll::poll_until_terminal;
use crate::session::{AuthorizationHandle, Http01Challenge};

#[derive(Debug, Default)]
struct Tokens {
    listeners: HashMap<String, (u64, oneshot::Sender<()>)>,
    contents: HashMap<String, (u64, String)>,
    next_registration: u64,
}

/// Bridges "token was requested" from the HTTP layer to the workflow
/// waiting for it.
#[derive(Debug, Clone, Default)]
pub struct ChallengeCoordinator {
    tokens: Arc<Mutex<Tokens>>,
}

impl ChallengeCoordinator {
    /// Create a coordinator with no registered tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `challenge` and wait for it to be satisfied.
    ///
    /// The token is registered before this returns, so its content is
    /// served from that moment on. The returned future then asks the
    /// provider to validate the challenge, waits until the token has been
    /// requested at least once, and polls `authorization` until it is
    /// valid.
    ///
    /// The content stays available until the future completes or is
    /// dropped. Registering the same token again supersedes this wait, which
    /// then fails with [`RenewError::ChallengeAbandoned`]. No timeout is
    /// applied here.
    pub fn watch(
        &self,
        challenge: Http01Challenge,
        mut authorization: Box<dyn AuthorizationHandle>,
    ) -> impl Future<Output = Result<(), RenewError>> + Send + 'static {
        let (sender, served) = oneshot::channel();

        let registration = {
            let mut tokens = self.tokens.lock();
            tokens.next_registration += 1;
            let id = tokens.next_registration;

            let token = challenge.token.clone();
            if tokens
                .listeners
                .insert(token.clone(), (id, sender))
                .is_some()
            {
                tracing::warn!(%token, "Challenge token registered again, abandoning earlier wait");
            }
            tokens
                .contents
                .insert(token, (id, challenge.key_authorization.clone()));
            id
        };

        let guard = Registration {
            tokens: self.tokens.clone(),
            token: challenge.token.clone(),
            id: registration,
        };
        tracing::debug!(
            token = %challenge.token,
            domain = authorization.domain(),
            "Registered challenge"
        );

        async move {
            let _guard = guard;

            authorization.trigger(&challenge).await?;

            if served.await.is_err() {
                return Err(RenewError::ChallengeAbandoned {
                    token: challenge.token,
                });
            }
            tracing::debug!(token = %challenge.token, "Challenge token was served");

            poll_until_terminal(&mut *authorization, "authorization").await
        }
    }

    /// Record that `token` was requested by the HTTP layer.
    ///
    /// Completes the waiting registration, if there is one. Unknown tokens
    /// and tokens whose registration was already completed are ignored.
    pub fn on_token_requested(&self, token: &str) {
        let listener = self.tokens.lock().listeners.remove(token);
        match listener {
            Some((_, sender)) => {
                tracing::trace!(%token, "Notifying challenge listener");
                let _ = sender.send(());
            }
            None => tracing::trace!(%token, "No listener for challenge token"),
        }
    }

    /// The key authorization served for `token`.
    pub fn content(&self, token: &str) -> Option<String> {
        self.tokens
            .lock()
            .contents
            .get(token)
            .map(|(_, content)| content.clone())
    }

    /// Notify, then return the content for `token` (empty if unknown).
    ///
    /// This is everything an HTTP handler for the challenge path has to do.
    pub fn respond(&self, token: &str) -> String {
        self.on_token_requested(token);
        self.content(token).unwrap_or_default()
    }

    /// Number of tokens currently served.
    pub fn len(&self) -> usize {
        self.tokens.lock().contents.len()
    }

    /// Whether no token is currently served.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes a registration's entries, unless a newer registration for the
/// same token replaced them.
struct Registration {
    tokens: Arc<Mutex<Tokens>>,
    token: String,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut tokens = self.tokens.lock();
        if matches!(tokens.contents.get(&self.token), Some((id, _)) if *id == self.id) {
            tokens.contents.remove(&self.token);
        }
        if matches!(tokens.listeners.get(&self.token), Some((id, _)) if *id == self.id) {
            tokens.listeners.remove(&self.token);
        }
    }
}
