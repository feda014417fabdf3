//! Refresh a resource until the provider settles its status.

use std::time::Duration;

use chrono::Utc;

use crate::errors::RenewError;
use crate::session::{Resource, Status};

/// Update `resource` until it is [`Status::Valid`].
///
/// A `Retry-After` from the provider is honored before the next update;
/// otherwise a non-terminal status is re-checked right away. Any terminal
/// status other than valid fails with [`RenewError::UpdateFailed`].
///
/// There is no timeout here. The caller bounds the wait, and dropping the
/// returned future abandons the poll.
#[tracing::instrument(level = "debug", skip(resource))]
pub async fn poll_until_terminal<R>(resource: &mut R, name: &'static str) -> Result<(), RenewError>
where
    R: Resource + ?Sized,
{
    loop {
        if let Some(retry_at) = resource.update().await? {
            let delay = (retry_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tracing::trace!(?delay, "Provider asked to retry later");
            tokio::time::sleep(delay).await;
            continue;
        }

        match resource.status() {
            Status::Valid => {
                tracing::debug!("{name} is valid");
                return Ok(());
            }
            status if status.is_terminal() => {
                tracing::warn!(%status, "{name} failed");
                return Err(RenewError::UpdateFailed {
                    resource: name,
                    status,
                });
            }
            status => {
                tracing::trace!(%status, "{name} is not settled yet");
                tokio::task::yield_now().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use chrono::DateTime;
    use tokio::time::Instant;

    use super::*;
    use crate::protocol::AcmeError;

    /// Each step is the offset of the `Retry-After` instant from now, which
    /// may lie in the past, and the status the update reports.
    struct Scripted {
        steps: VecDeque<(Option<chrono::Duration>, Status)>,
        status: Status,
        calls: Vec<Instant>,
    }

    impl Scripted {
        fn new(steps: impl IntoIterator<Item = (Option<chrono::Duration>, Status)>) -> Self {
            Scripted {
                steps: steps.into_iter().collect(),
                status: Status::Pending,
                calls: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Resource for Scripted {
        async fn update(&mut self) -> Result<Option<DateTime<Utc>>, AcmeError> {
            self.calls.push(Instant::now());
            let (retry, status) = self
                .steps
                .pop_front()
                .ok_or(AcmeError::MissingData("scripted step"))?;
            self.status = status;
            Ok(retry.map(|offset| Utc::now() + offset))
        }

        fn status(&self) -> Status {
            self.status
        }
    }

    #[tokio::test(start_paused = true)]
    async fn honors_retry_after() {
        let mut resource = Scripted::new([
            (Some(chrono::Duration::seconds(30)), Status::Processing),
            (None, Status::Valid),
        ]);

        poll_until_terminal(&mut resource, "order").await.unwrap();

        assert_eq!(resource.calls.len(), 2);
        let gap = resource.calls[1] - resource.calls[0];
        assert!(gap >= Duration::from_secs(29), "polled again after {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn rechecks_immediately_without_retry_after() {
        let mut resource = Scripted::new([
            (None, Status::Pending),
            (None, Status::Processing),
            (None, Status::Valid),
        ]);

        poll_until_terminal(&mut resource, "order").await.unwrap();

        assert_eq!(resource.calls.len(), 3);
        assert_eq!(resource.calls[2] - resource.calls[0], Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn past_retry_after_rechecks_immediately() {
        let mut resource = Scripted::new([
            (Some(chrono::Duration::seconds(-90)), Status::Processing),
            (Some(chrono::Duration::zero()), Status::Processing),
            (None, Status::Valid),
        ]);

        poll_until_terminal(&mut resource, "order").await.unwrap();

        assert_eq!(resource.calls.len(), 3);
        assert_eq!(resource.calls[2] - resource.calls[0], Duration::ZERO);
    }

    #[tokio::test]
    async fn invalid_fails() {
        let mut resource = Scripted::new([(None, Status::Processing), (None, Status::Invalid)]);

        let error = poll_until_terminal(&mut resource, "authorization")
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            RenewError::UpdateFailed {
                resource: "authorization",
                status: Status::Invalid
            }
        ));
    }

    #[tokio::test]
    async fn update_errors_propagate() {
        let mut resource = Scripted::new([]);
        let error = poll_until_terminal(&mut resource, "order").await.unwrap_err();
        assert!(matches!(error, RenewError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_by_caller_timeout() {
        let mut resource = Scripted::new(
            std::iter::repeat((Some(chrono::Duration::seconds(10)), Status::Processing)).take(100),
        );

        let result = tokio::time::timeout(
            Duration::from_secs(25),
            poll_until_terminal(&mut resource, "order"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(resource.calls.len(), 3);
    }
}
