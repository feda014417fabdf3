//! Internal, Send and Sync client wrapper.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::protocol::{response::Decode, AcmeError, Request, Response, Url};

/// Shares one nonce-tracking [`crate::protocol::Client`] between the
/// provider and the orders and authorizations it hands out.
#[derive(Debug, Clone, Default)]
pub(crate) struct Client {
    inner: Arc<Mutex<crate::protocol::Client>>,
}

impl Client {
    pub(crate) fn new(client: crate::protocol::Client) -> Self {
        Client {
            inner: Arc::new(Mutex::new(client)),
        }
    }

    pub(crate) async fn execute<T, R>(&self, request: &Request<T>) -> Result<Response<R>, AcmeError>
    where
        T: Serialize,
        R: Decode,
    {
        let mut client = self.inner.lock().await;
        client.execute(request).await
    }

    pub(crate) async fn get<R>(&self, url: Url) -> Result<Response<R>, AcmeError>
    where
        R: Decode,
    {
        let mut client = self.inner.lock().await;
        client.get(url).await
    }
}
