//! # Automatic renewal
//!
//! The [`RenewalScheduler`] runs on its own task, alternating between
//! sleeping until the next wake instant and running a cycle. Every
//! [`RenewalOutcome`] names the instant of the next cycle: the renewal
//! threshold of a good certificate, or a retry after an error.
//!
//! Manual triggers from the [`SchedulerHandle`] run on the same task, so a
//! manual cycle and a scheduled one never overlap.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ConfigurationError;
use crate::orchestrator::{Orchestrator, RenewalOutcome};

/// Pending commands beyond this make [`SchedulerHandle::renew_now`] wait.
const COMMAND_BUFFER: usize = 8;

/// What the scheduler task is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for `wake_at`, or for a manual trigger when there is none.
    Idle {
        /// When the next automatic cycle runs.
        wake_at: Option<DateTime<Utc>>,
    },
    /// A cycle is in progress.
    Running,
    /// The scheduler was shut down.
    Stopped,
}

/// A manual trigger could not produce an outcome.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The settings can not be used for renewal.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The scheduler task is no longer running.
    #[error("the renewal scheduler has stopped")]
    Stopped,
}

enum Command {
    RenewNow(oneshot::Sender<Result<RenewalOutcome, ConfigurationError>>),
    Shutdown(oneshot::Sender<()>),
}

/// Spawns the renewal task.
#[derive(Debug)]
pub struct RenewalScheduler {
    orchestrator: Arc<Orchestrator>,
    auto_renew: bool,
    state: watch::Sender<SchedulerState>,
    wake_at: Option<DateTime<Utc>>,
}

impl RenewalScheduler {
    /// Start renewing with `orchestrator`.
    ///
    /// With `auto_renew`, the first cycle runs right away and each outcome
    /// schedules the next one. Without it, cycles only run through
    /// [`SchedulerHandle::renew_now`].
    pub fn spawn(orchestrator: Arc<Orchestrator>, auto_renew: bool) -> SchedulerHandle {
        let wake_at = auto_renew.then(Utc::now);
        let (state, watcher) = watch::channel(SchedulerState::Idle { wake_at });
        let (sender, commands) = mpsc::channel(COMMAND_BUFFER);

        let scheduler = RenewalScheduler {
            orchestrator,
            auto_renew,
            state,
            wake_at,
        };
        tokio::spawn(scheduler.run(commands));

        SchedulerHandle {
            commands: sender,
            state: watcher,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            self.state
                .send_replace(SchedulerState::Idle { wake_at: self.wake_at });

            let command = match self.wake_at {
                Some(wake_at) => {
                    let delay = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tracing::debug!(%wake_at, "Next renewal scheduled");
                    tokio::select! {
                        command = commands.recv() => command,
                        _ = tokio::time::sleep(delay) => {
                            let _ = self.cycle().await;
                            continue;
                        }
                    }
                }
                None => commands.recv().await,
            };

            match command {
                Some(Command::RenewNow(reply)) => {
                    tracing::debug!("Manual renewal requested");
                    let result = self.cycle().await;
                    let _ = reply.send(result);
                }
                Some(Command::Shutdown(done)) => {
                    self.state.send_replace(SchedulerState::Stopped);
                    let _ = done.send(());
                    break;
                }
                None => break,
            }
        }

        self.state.send_replace(SchedulerState::Stopped);
        tracing::debug!("Renewal scheduler stopped");
    }

    async fn cycle(&mut self) -> Result<RenewalOutcome, ConfigurationError> {
        self.state.send_replace(SchedulerState::Running);

        let result = self.orchestrator.create_or_renew().await;
        self.wake_at = match &result {
            Ok(outcome) => self.auto_renew.then(|| outcome.next_check()),
            Err(error) => {
                tracing::error!(%error, "Renewal is misconfigured, automatic renewal stopped");
                None
            }
        };

        self.state
            .send_replace(SchedulerState::Idle { wake_at: self.wake_at });
        result
    }
}

/// Controls a running [`RenewalScheduler`].
///
/// Dropping every handle stops the scheduler once it is idle.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SchedulerState>,
}

impl SchedulerHandle {
    /// Run a cycle now, after any cycle already in progress.
    pub async fn renew_now(&self) -> Result<RenewalOutcome, SchedulerError> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::RenewNow(reply))
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        Ok(outcome.await.map_err(|_| SchedulerError::Stopped)??)
    }

    /// When the next automatic cycle runs, if one is scheduled.
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        match self.state() {
            SchedulerState::Idle { wake_at } => wake_at,
            _ => None,
        }
    }

    /// What the scheduler is doing right now.
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Stop the scheduler, waiting for a cycle in progress to finish.
    pub async fn shutdown(self) {
        let (done, stopped) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done)).await.is_ok() {
            let _ = stopped.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::challenge::ChallengeCoordinator;
    use crate::config::Settings;
    use crate::orchestrator::NoReload;
    use crate::protocol::{AcmeError, Url};
    use crate::session::{Connector, Session};

    /// A certificate authority which is never reachable.
    #[derive(Default)]
    struct Unreachable {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(&self, _: &Url) -> Result<Arc<dyn Session>, AcmeError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Err(AcmeError::MissingData("connection"))
        }
    }

    fn orchestrator(
        dir: &Path,
        directory_url: &str,
        connector: Arc<Unreachable>,
    ) -> Arc<Orchestrator> {
        let settings = Settings {
            directory_url: directory_url.into(),
            domain: "example.com".into(),
            account_key_path: dir.join("account.pem"),
            terms_path: dir.join("terms.json"),
            ..Default::default()
        };
        Arc::new(
            Orchestrator::new(
                settings,
                connector,
                ChallengeCoordinator::new(),
                Arc::new(NoReload),
            )
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn first_cycle_runs_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(Unreachable::default());
        let handle = RenewalScheduler::spawn(
            orchestrator(dir.path(), "https://example.com/dir", connector.clone()),
            true,
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        let wake_at = handle.next_wake().unwrap();
        assert!(wake_at > Utc::now() + chrono::Duration::minutes(59));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn outcome_instant_is_next_wake() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(Unreachable::default());
        let handle = RenewalScheduler::spawn(
            orchestrator(dir.path(), "https://example.com/dir", connector.clone()),
            true,
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        let outcome = handle.renew_now().await.unwrap();
        assert!(outcome.is_error());
        assert_eq!(handle.next_wake(), Some(outcome.next_check()));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);

        // The retry runs after the error delay, not before.
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(31 * 60)).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_only() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(Unreachable::default());
        let handle = RenewalScheduler::spawn(
            orchestrator(dir.path(), "https://example.com/dir", connector.clone()),
            false,
        );

        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert_eq!(handle.state(), SchedulerState::Idle { wake_at: None });

        handle.renew_now().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(handle.next_wake(), None);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_triggers_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(Unreachable::default());
        let handle = RenewalScheduler::spawn(
            orchestrator(dir.path(), "https://example.com/dir", connector.clone()),
            false,
        );

        let (first, second) = tokio::join!(handle.renew_now(), handle.renew_now());
        assert!(first.unwrap().is_error());
        assert!(second.unwrap().is_error());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_error_stops_the_timer() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(Unreachable::default());
        let handle = RenewalScheduler::spawn(
            orchestrator(dir.path(), "not a url", connector.clone()),
            true,
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.next_wake(), None);

        assert!(matches!(
            handle.renew_now().await,
            Err(SchedulerError::Configuration(_))
        ));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(Unreachable::default());
        let handle = RenewalScheduler::spawn(
            orchestrator(dir.path(), "https://example.com/dir", connector.clone()),
            true,
        );
        let observer = handle.clone();

        handle.shutdown().await;
        assert_eq!(observer.state(), SchedulerState::Stopped);
        assert!(matches!(
            observer.renew_now().await,
            Err(SchedulerError::Stopped)
        ));
    }
}
